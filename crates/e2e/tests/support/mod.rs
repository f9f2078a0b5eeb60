//! In-process stand-ins for a hub: a browser, the `session` command and the
//! contribution pipeline

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use hubcheck_common::{LicenseTerms, Testdata, ToolData, ToolState};
use hubcheck_e2e::browser::har::{select_entry, HarContent, HarRequest, HarResponse};
use hubcheck_e2e::browser::playwright::driver_error;
use hubcheck_e2e::browser::{Browser, FormField, FieldValue, HarEntry};
use hubcheck_e2e::catalog::{Locators, PageId};
use hubcheck_e2e::fixtures::{BrowserFactory, SharedScope, ToolAdmin};
use hubcheck_e2e::shell::transport::{CommandOutput, LocalTransport, ShellChannel, Target, Transport};
use hubcheck_e2e::{E2eError, E2eResult, Settings};

pub const TESTDATA: &str = r#"
urls:
  https: hub.example.org
  httpsport: 443
  http: hub.example.org
  httpport: 80
  webdav: hub.example.org
accounts:
  - username: manager
    password: mpass
    roles: [toolmanager]
  - username: submitter
    password: spass
    roles: [toolsubmitter]
  - username: alice
    password: apass
    roles: [registeredworkspace, submituser, purdueworkspace]
"#;

pub fn testdata() -> Testdata {
    Testdata::from_yaml(TESTDATA).unwrap()
}

/// Settings with short polls and screenshots under `dir`
pub fn settings(dir: &Path) -> Settings {
    let mut settings = Settings {
        screenshot_dir: dir.join("screenshots"),
        output_dir: dir.join("results"),
        command_timeout_secs: 5,
        ..Settings::default()
    };
    settings.retry.session_poll_interval_ms = 10;
    settings.retry.session_poll_deadline_secs = 2;
    settings
}

/// A scope over the fakes; the returned counter tracks browser builds
pub fn scope(
    dir: &Path,
    browser: Arc<FakeBrowser>,
    hub: Arc<FakeHub>,
) -> (SharedScope, Arc<AtomicUsize>) {
    scope_with(settings(dir), browser, hub)
}

/// Like [`scope`] over caller-made settings
pub fn scope_with(
    settings: Settings,
    browser: Arc<FakeBrowser>,
    hub: Arc<FakeHub>,
) -> (SharedScope, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let factory: BrowserFactory = Box::new(move |_settings: &Settings| {
        counter.fetch_add(1, Ordering::SeqCst);
        let browser: Arc<dyn Browser> = browser.clone();
        Ok(browser)
    });
    let scope = SharedScope::new(settings, testdata(), hub, factory);
    (scope, builds)
}

/// Value of `key` in the query of `url`
fn query(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn document(url: &str, status: i64) -> HarEntry {
    HarEntry {
        pageref: None,
        started_date_time: chrono::Utc::now().to_rfc3339(),
        time: 0.0,
        request: HarRequest {
            method: "GET".to_string(),
            url: url.to_string(),
        },
        response: HarResponse {
            status,
            status_text: String::new(),
            content: HarContent {
                mime_type: "text/html".to_string(),
            },
            redirect_url: String::new(),
        },
    }
}

struct Selectors {
    login: String,
    register: String,
    logout: String,
    body: String,
    errorbox: String,
    import_text: String,
    import_file: String,
    export_content: String,
    username: String,
    password: String,
    login_error: String,
}

impl Selectors {
    fn new() -> Self {
        let locators = Locators::default();
        let get = |page, element| locators.get(page, element).unwrap_or_default().to_string();
        Self {
            login: get(PageId::Generic, "login"),
            register: get(PageId::Generic, "register"),
            logout: get(PageId::Generic, "logout"),
            body: get(PageId::Generic, "body"),
            errorbox: get(PageId::Generic, "errorbox"),
            import_text: get(PageId::FilexferImportfile, "text"),
            import_file: get(PageId::FilexferImportfile, "file"),
            export_content: get(PageId::FilexferExportfile, "content"),
            username: get(PageId::Login, "username"),
            password: get(PageId::Login, "password"),
            login_error: get(PageId::Login, "error"),
        }
    }
}

#[derive(Default)]
struct Page {
    url: String,
    user: Option<String>,
    login_error: bool,
    errorbox: Vec<String>,
    har: Vec<HarEntry>,
    windows: Vec<String>,
    current: String,
    opened: usize,
    next_session: u64,
    launches: Vec<(u64, String)>,
    screenshots: Vec<PathBuf>,
    videos: Vec<PathBuf>,
    closed: bool,
}

/// A browser over a tiny hub website
///
/// Knows the login form, the logout link and tool launches through
/// `/tools/<tool>/invoke/<revision>?params=...`.
pub struct FakeBrowser {
    accounts: BTreeMap<String, String>,
    statuses: Mutex<Vec<(String, i64)>>,
    redirects: Mutex<Vec<(String, String)>>,
    texts: Mutex<Vec<(String, String)>>,
    rejected_params: Mutex<Vec<String>>,
    fail_screenshots: bool,
    recording: bool,
    selectors: Selectors,
    page: Mutex<Page>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        let accounts = testdata()
            .accounts
            .into_iter()
            .map(|a| (a.username, a.password))
            .collect();
        Self {
            accounts,
            statuses: Mutex::new(Vec::new()),
            redirects: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            rejected_params: Mutex::new(Vec::new()),
            fail_screenshots: false,
            recording: false,
            selectors: Selectors::new(),
            page: Mutex::new(Page {
                windows: vec!["window-0".to_string()],
                current: "window-0".to_string(),
                next_session: 4200,
                ..Page::default()
            }),
        }
    }

    pub fn failing_screenshots() -> Self {
        Self {
            fail_screenshots: true,
            ..Self::new()
        }
    }

    /// A browser whose windows are recorded
    pub fn recording() -> Self {
        Self {
            recording: true,
            ..Self::new()
        }
    }

    /// Answer loads of urls containing `fragment` with `status`
    pub fn respond_with(&self, fragment: &str, status: i64) {
        self.statuses.lock().push((fragment.to_string(), status));
    }

    /// Answer loads of urls starting with `from` with a 301 to the same
    /// path under `to`
    pub fn redirect(&self, from: &str, to: &str) {
        self.redirects.lock().push((from.to_string(), to.to_string()));
    }

    /// Page text shown at urls containing `fragment`
    pub fn page_text(&self, fragment: &str, text: &str) {
        self.texts.lock().push((fragment.to_string(), text.to_string()));
    }

    /// Show a "Bad Parameters" box for launches whose parameters mention `needle`
    pub fn reject_parameters(&self, needle: &str) {
        self.rejected_params.lock().push(needle.to_string());
    }

    pub fn logged_in_user(&self) -> Option<String> {
        self.page.lock().user.clone()
    }

    /// Session numbers handed out by launches, with their parameters
    pub fn launches(&self) -> Vec<(u64, String)> {
        self.page.lock().launches.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.page.lock().screenshots.clone()
    }

    pub fn videos(&self) -> Vec<PathBuf> {
        self.page.lock().videos.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.page.lock().closed
    }

    fn status_for(&self, url: &str) -> i64 {
        self.statuses
            .lock()
            .iter()
            .rev()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map_or(200, |(_, status)| *status)
    }

    fn redirected(&self, url: &str) -> Option<String> {
        self.redirects
            .lock()
            .iter()
            .find_map(|(from, to)| url.strip_prefix(from.as_str()).map(|rest| format!("{}{}", to, rest)))
    }

    fn launch(&self, url: &str, page: &mut Page) {
        let params = url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "params")
                    .map(|(_, v)| v.into_owned())
            })
            .unwrap_or_default();
        if self
            .rejected_params
            .lock()
            .iter()
            .any(|needle| params.contains(needle.as_str()))
        {
            page.errorbox = vec!["Bad Parameters: file not found in the user's home".to_string()];
            return;
        }
        let number = page.next_session;
        page.next_session += 1;
        page.launches.push((number, params));
        let base = url.split("/invoke/").next().unwrap_or(url);
        page.url = format!("{}/session/{}", base, number);
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn get(&self, url: &str) -> E2eResult<()> {
        let mut page = self.page.lock();
        let url = match self.redirected(url) {
            Some(target) => {
                let mut moved = document(url, 301);
                moved.response.redirect_url = target.clone();
                page.har.push(moved);
                target
            }
            None => url.to_string(),
        };
        let url = url.as_str();
        let status = self.status_for(url);
        page.har.push(document(url, status));
        page.url = url.to_string();
        page.errorbox.clear();
        page.login_error = false;
        if status < 400 && url.contains("/invoke/") {
            self.launch(url, &mut page);
        }
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.page.lock().url.clone())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        let mut page = self.page.lock();
        if selector == self.selectors.logout {
            page.user = None;
        } else if selector == self.selectors.login {
            page.url = "https://hub.example.org/login".to_string();
        } else if selector == self.selectors.register {
            page.url = "https://hub.example.org/register".to_string();
        }
        Ok(())
    }

    async fn submit_form(&self, fields: &[FormField], _submit: &str) -> E2eResult<()> {
        let text = |selector: &str| {
            fields.iter().find_map(|f| match &f.value {
                FieldValue::Text(t) if f.selector == selector => Some(t.clone()),
                _ => None,
            })
        };
        let username = text(&self.selectors.username);
        let password = text(&self.selectors.password);

        let mut page = self.page.lock();
        if let Some(dest) = query(&page.url, "dest") {
            let upload = fields.iter().find_map(|f| match &f.value {
                FieldValue::Text(t) if f.selector == self.selectors.import_text => {
                    Some(t.as_bytes().to_vec())
                }
                FieldValue::File(path) if f.selector == self.selectors.import_file => {
                    std::fs::read(path).ok()
                }
                _ => None,
            });
            if let Some(content) = upload {
                std::fs::write(&dest, content)?;
            }
            return Ok(());
        }
        match (username, password) {
            (Some(u), Some(p)) if self.accounts.get(&u) == Some(&p) => {
                page.user = Some(u);
                page.login_error = false;
            }
            (Some(_), Some(_)) => page.login_error = true,
            _ => {}
        }
        Ok(())
    }

    async fn is_displayed(&self, selector: &str) -> E2eResult<bool> {
        let page = self.page.lock();
        Ok(if selector == self.selectors.logout {
            page.user.is_some()
        } else if selector == self.selectors.login || selector == self.selectors.register {
            page.user.is_none()
        } else if selector == self.selectors.login_error {
            page.login_error
        } else if selector == self.selectors.errorbox {
            !page.errorbox.is_empty()
        } else {
            false
        })
    }

    async fn wait_for(&self, selector: &str) -> E2eResult<()> {
        if self.is_displayed(selector).await? {
            Ok(())
        } else {
            Err(E2eError::Timeout(selector.to_string()))
        }
    }

    async fn text_of(&self, selector: &str) -> E2eResult<String> {
        if selector == self.selectors.login_error && self.page.lock().login_error {
            return Ok("Username and password do not match".to_string());
        }
        if selector == self.selectors.export_content {
            let url = self.page.lock().url.clone();
            let src = query(&url, "src")
                .ok_or_else(|| E2eError::Browser(format!("no download at {}", url)))?;
            return Ok(std::fs::read_to_string(src)?);
        }
        if selector == self.selectors.body {
            let url = self.page.lock().url.clone();
            let texts = self.texts.lock();
            let text = texts.iter().rev().find(|(fragment, _)| url.contains(fragment.as_str()));
            return Ok(text.map(|(_, t)| t.clone()).unwrap_or_default());
        }
        Err(E2eError::Browser(format!("no text for {}", selector)))
    }

    async fn texts_of(&self, selector: &str) -> E2eResult<Vec<String>> {
        let page = self.page.lock();
        if selector == self.selectors.errorbox {
            return Ok(page.errorbox.clone());
        }
        Ok(Vec::new())
    }

    async fn value_of(&self, selector: &str) -> E2eResult<String> {
        Err(E2eError::Browser(format!("no value for {}", selector)))
    }

    async fn new_har(&self, _name: &str) -> E2eResult<()> {
        self.page.lock().har.clear();
        Ok(())
    }

    async fn page_load_details(&self, url: Option<&str>) -> E2eResult<Option<HarEntry>> {
        let page = self.page.lock();
        Ok(select_entry(&page.har, url).cloned())
    }

    fn window_handles(&self) -> Vec<String> {
        self.page.lock().windows.clone()
    }

    fn current_window(&self) -> E2eResult<String> {
        Ok(self.page.lock().current.clone())
    }

    fn switch_to_window(&self, handle: &str) -> E2eResult<()> {
        let mut page = self.page.lock();
        if !page.windows.iter().any(|w| w == handle) {
            return Err(E2eError::Browser(format!("no window {}", handle)));
        }
        page.current = handle.to_string();
        Ok(())
    }

    async fn click_opening_window(&self, _selector: &str) -> E2eResult<String> {
        let mut page = self.page.lock();
        page.opened += 1;
        let handle = format!("window-{}", page.opened);
        page.windows.push(handle.clone());
        Ok(handle)
    }

    async fn close_window(&self) -> E2eResult<()> {
        let mut page = self.page.lock();
        let current = page.current.clone();
        page.windows.retain(|w| *w != current);
        page.current = page.windows.first().cloned().unwrap_or_default();
        Ok(())
    }

    async fn take_screenshot(&self, path: &Path) -> E2eResult<()> {
        if self.fail_screenshots {
            return Err(E2eError::Browser("screenshot capture crashed".to_string()));
        }
        self.page.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn save_video(&self, path: &Path) -> E2eResult<()> {
        if !self.recording {
            return Err(E2eError::Browser("video recording is off".to_string()));
        }
        let mut page = self.page.lock();
        page.videos.push(path.to_path_buf());
        page.url = "about:blank".to_string();
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        self.page.lock().closed = true;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeSession {
    pub owner: String,
    pub title: String,
}

/// The hub's `session` command over an in-memory table
///
/// Shells into a session are local bash processes started in `home`;
/// every other one-shot command runs there too.
pub struct FakeHub {
    home: PathBuf,
    umask: Option<String>,
    local: LocalTransport,
    sessions: Mutex<BTreeMap<u64, FakeSession>>,
    next: Mutex<u64>,
    /// Stops that are acknowledged but leave the session running
    ignored_stops: Mutex<usize>,
    /// `session list` calls that lose the connection
    dropped_lists: Mutex<usize>,
    accessed: Mutex<Vec<Option<String>>>,
}

impl FakeHub {
    pub fn new(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            umask: None,
            local: LocalTransport::in_dir(home),
            sessions: Mutex::new(BTreeMap::new()),
            next: Mutex::new(1001),
            ignored_stops: Mutex::new(0),
            dropped_lists: Mutex::new(0),
            accessed: Mutex::new(Vec::new()),
        }
    }

    /// A session started outside the code under test
    pub fn start_session(&self, owner: &str, title: &str) -> u64 {
        let mut next = self.next.lock();
        let number = *next;
        *next += 1;
        self.sessions.lock().insert(
            number,
            FakeSession {
                owner: owner.to_string(),
                title: title.to_string(),
            },
        );
        number
    }

    pub fn open_sessions(&self, owner: &str) -> Vec<u64> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, s)| s.owner == owner)
            .map(|(n, _)| *n)
            .collect()
    }

    pub fn ignore_next_stops(&self, count: usize) {
        *self.ignored_stops.lock() = count;
    }

    /// Drop the connection on the next `count` session listings
    pub fn drop_next_lists(&self, count: usize) {
        *self.dropped_lists.lock() = count;
    }

    /// Shells start with this umask
    pub fn with_umask(self, umask: &str) -> Self {
        Self {
            umask: Some(umask.to_string()),
            ..self
        }
    }

    /// Put `exportfile` and `importfile` on the shells' PATH
    ///
    /// Both log the url a browser should open, as the hub's filexfer server
    /// does; the fake browser serves and fills the named files.
    pub fn install_filexfer(&self) {
        use std::os::unix::fs::PermissionsExt;

        let bin = self.home.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let scripts = [
            ("exportfile", "/filexfer/fx$$/download?src=$1"),
            ("importfile", "/filexfer/fx$$/upload?dest=$1"),
        ];
        for (name, url) in scripts {
            let path = bin.join(name);
            let body = format!(
                "#!/bin/bash\necho \"/usr/bin/clientaction url {}\" >> \"$SESSIONDIR/filexfer$$.log\"\n",
                url
            );
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    /// Remote commands the interactive shells were opened with
    pub fn accessed(&self) -> Vec<Option<String>> {
        self.accessed.lock().clone()
    }

    fn output(stdout: String, status: i32) -> CommandOutput {
        CommandOutput {
            stdout,
            stderr: String::new(),
            status,
        }
    }

    fn session_command(&self, owner: &str, args: &[&str]) -> CommandOutput {
        match args {
            [] | ["help"] => Self::output(
                "usage: session [list|create [title]|stop <number>|<number>]\n".to_string(),
                0,
            ),
            ["list"] => {
                let mut out = String::from("Session Owner Started Name\n");
                for (number, s) in self.sessions.lock().iter().filter(|(_, s)| s.owner == owner) {
                    out.push_str(&format!(" {} {} 2026-10-18 {}\n", number, s.owner, s.title));
                }
                Self::output(out, 0)
            }
            ["create", title @ ..] => {
                let title = if title.is_empty() {
                    "workspace".to_string()
                } else {
                    title.join(" ").trim_matches('\'').to_string()
                };
                let number = self.start_session(owner, &title);
                Self::output(format!("Session {} created\n", number), 0)
            }
            ["stop", number] => {
                let Ok(number) = number.parse::<u64>() else {
                    return Self::output(format!("bad session number {}\n", number), 1);
                };
                {
                    let mut ignored = self.ignored_stops.lock();
                    if *ignored > 0 {
                        *ignored -= 1;
                        return Self::output(String::new(), 0);
                    }
                }
                match self.sessions.lock().remove(&number) {
                    Some(_) => Self::output(String::new(), 0),
                    None => Self::output(format!("no session {}\n", number), 1),
                }
            }
            other => Self::output(format!("unknown session command {:?}\n", other), 2),
        }
    }
}

#[async_trait]
impl Transport for FakeHub {
    async fn open_shell(&self, target: &Target) -> E2eResult<Box<dyn ShellChannel>> {
        self.accessed.lock().push(target.command.clone());
        let mut channel = self.local.open_shell(target).await?;
        channel
            .send_line(&format!(
                "export SESSIONDIR={home} PATH={home}/bin:$PATH",
                home = self.home.display()
            ))
            .await?;
        if let Some(umask) = &self.umask {
            channel.send_line(&format!("umask {}", umask)).await?;
        }
        Ok(channel)
    }

    async fn run(&self, target: &Target, command: &str, timeout: Duration) -> E2eResult<CommandOutput> {
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.split_first() {
            Some((&"session", args)) => {
                if args.first() == Some(&"list") {
                    let mut dropped = self.dropped_lists.lock();
                    if *dropped > 0 {
                        *dropped -= 1;
                        return Err(E2eError::ConnectionClosed);
                    }
                }
                Ok(self.session_command(&target.username, args))
            }
            _ => self.local.run(target, command, timeout).await,
        }
    }
}

#[derive(Default)]
struct Pipeline {
    tools: BTreeMap<String, ToolState>,
    user: Option<String>,
    pending: Option<(String, ToolState)>,
    approval_timeouts: usize,
    approval_failures: usize,
    submits: Vec<(String, ToolState)>,
    registered_by: Vec<(String, String)>,
    versions: Vec<String>,
}

/// The contribution pipeline kept in memory
///
/// Approval waits for the three confirmation forms before it sticks.
#[derive(Default)]
pub struct FakePlatform {
    pipeline: Mutex<Pipeline>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(self, toolname: &str, state: ToolState) -> Self {
        self.pipeline.lock().tools.insert(toolname.to_string(), state);
        self
    }

    /// Time out the next `count` approval submissions the way Playwright
    /// reports a navigation that never finished
    pub fn time_out_approvals(&self, count: usize) {
        self.pipeline.lock().approval_timeouts = count;
    }

    /// Fail the next `count` approval submissions with a non-timeout error
    pub fn fail_approvals(&self, count: usize) {
        self.pipeline.lock().approval_failures = count;
    }

    pub fn state_of(&self, toolname: &str) -> Option<ToolState> {
        self.pipeline.lock().tools.get(toolname).copied()
    }

    pub fn submits(&self) -> Vec<(String, ToolState)> {
        self.pipeline.lock().submits.clone()
    }

    pub fn registered_by(&self) -> Vec<(String, String)> {
        self.pipeline.lock().registered_by.clone()
    }

    pub fn versions(&self) -> Vec<String> {
        self.pipeline.lock().versions.clone()
    }

    pub fn logged_in(&self) -> Option<String> {
        self.pipeline.lock().user.clone()
    }

    fn user(pipeline: &Pipeline) -> E2eResult<String> {
        pipeline
            .user
            .clone()
            .ok_or_else(|| E2eError::AssertionFailed("not logged in".to_string()))
    }
}

#[async_trait]
impl ToolAdmin for FakePlatform {
    async fn login(&self, username: &str, _password: &str) -> E2eResult<()> {
        self.pipeline.lock().user = Some(username.to_string());
        Ok(())
    }

    async fn logout(&self) -> E2eResult<()> {
        self.pipeline.lock().user = None;
        Ok(())
    }

    async fn tool_state(&self, toolname: &str) -> E2eResult<ToolState> {
        let pipeline = self.pipeline.lock();
        Self::user(&pipeline)?;
        pipeline
            .tools
            .get(toolname)
            .copied()
            .ok_or_else(|| E2eError::Navigation {
                url: format!("https://hub.example.org/tools/{}/status", toolname),
                status: 404,
                har: String::new(),
            })
    }

    async fn register(&self, toolname: &str, _data: &ToolData) -> E2eResult<()> {
        let mut pipeline = self.pipeline.lock();
        let user = Self::user(&pipeline)?;
        pipeline.registered_by.push((toolname.to_string(), user));
        pipeline
            .tools
            .insert(toolname.to_string(), ToolState::Registered);
        Ok(())
    }

    async fn submit_state(&self, toolname: &str, state: ToolState) -> E2eResult<()> {
        let mut pipeline = self.pipeline.lock();
        Self::user(&pipeline)?;
        pipeline.submits.push((toolname.to_string(), state));
        if state.requires_confirmation() {
            if pipeline.approval_timeouts > 0 {
                pipeline.approval_timeouts -= 1;
                return Err(driver_error(
                    "submit:#tool-status-approve",
                    Some("TimeoutError"),
                    "page.waitForNavigation: Timeout 30000ms exceeded.",
                ));
            }
            if pipeline.approval_failures > 0 {
                pipeline.approval_failures -= 1;
                return Err(driver_error(
                    "submit:#tool-status-approve",
                    Some("Error"),
                    "element is not attached to the DOM",
                ));
            }
            pipeline.pending = Some((toolname.to_string(), state));
        } else {
            pipeline.tools.insert(toolname.to_string(), state);
        }
        Ok(())
    }

    async fn approval_version(&self) -> E2eResult<String> {
        Ok("1.0".to_string())
    }

    async fn confirm_version(&self, version: &str) -> E2eResult<()> {
        self.pipeline.lock().versions.push(version.to_string());
        Ok(())
    }

    async fn confirm_license(&self, terms: &LicenseTerms) -> E2eResult<()> {
        E2eError::check(terms.authorize, || "license not authorized".to_string())
    }

    async fn confirm_tool_info(&self) -> E2eResult<()> {
        let mut pipeline = self.pipeline.lock();
        let (toolname, state) = pipeline
            .pending
            .take()
            .ok_or_else(|| E2eError::AssertionFailed("nothing waiting for approval".to_string()))?;
        pipeline.tools.insert(toolname, state);
        Ok(())
    }
}
