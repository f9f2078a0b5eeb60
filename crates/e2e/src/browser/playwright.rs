//! Playwright browser automation
//!
//! One Node process drives one browser context for the whole run. Each
//! operation is a JSON line written to the driver's stdin naming the window
//! it acts on; the driver answers with one JSON line carrying the outcome,
//! the page's url and any responses seen while a capture is active.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::browser::har::{self, Har, HarEntry};
use crate::browser::{Browser, FieldValue, FormField};
use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};

/// The driver script, written next to the HAR files when the driver starts
const DRIVER_JS: &str = include_str!("../../data/playwright_driver.js");

static PLAYWRIGHT_TIMEOUT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Timeout \d+ms exceeded").ok());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> E2eResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(E2eError::Setup(format!("unknown browser '{}'", other))),
        }
    }
}

/// A form control as the driver fills it
#[derive(Debug, Clone, Serialize)]
struct DriverField {
    selector: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl From<&FormField> for DriverField {
    fn from(field: &FormField) -> Self {
        let (kind, value) = match &field.value {
            FieldValue::Text(v) => ("text", Some(v.clone())),
            FieldValue::Check(true) => ("check", None),
            FieldValue::Check(false) => ("uncheck", None),
            FieldValue::Select(v) => ("select", Some(v.clone())),
            FieldValue::File(p) => ("file", Some(p.to_string_lossy().into_owned())),
        };
        Self {
            selector: field.selector.clone(),
            kind,
            value,
        }
    }
}

/// One operation sent to the driver
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Op {
    Goto { url: String },
    Click { selector: String },
    Submit { fields: Vec<DriverField>, submit: String },
    IsDisplayed { selector: String },
    WaitFor { selector: String },
    Text { selector: String },
    Texts { selector: String },
    Value { selector: String },
    ClickPopup { selector: String, handle: String },
    ClosePage,
    Screenshot { path: PathBuf },
    SaveVideo { path: PathBuf },
}

impl Op {
    fn name(&self) -> String {
        match self {
            Op::Goto { url } => format!("goto:{}", url),
            Op::Click { selector } => format!("click:{}", selector),
            Op::Submit { submit, .. } => format!("submit:{}", submit),
            Op::IsDisplayed { selector } => format!("displayed:{}", selector),
            Op::WaitFor { selector } => format!("wait:{}", selector),
            Op::Text { selector } => format!("text:{}", selector),
            Op::Texts { selector } => format!("texts:{}", selector),
            Op::Value { selector } => format!("value:{}", selector),
            Op::ClickPopup { selector, .. } => format!("popup:{}", selector),
            Op::ClosePage => "close_page".to_string(),
            Op::Screenshot { path } => format!("screenshot:{}", path.display()),
            Op::SaveVideo { path } => format!("video:{}", path.display()),
        }
    }
}

/// The JSON line for `op`, addressed to window `page`
fn request_line(id: u64, page: &str, capture: bool, op: &Op) -> E2eResult<String> {
    let mut value = serde_json::to_value(op)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("id".to_string(), id.into());
        map.insert("page".to_string(), page.into());
        map.insert("capture".to_string(), capture.into());
    }
    Ok(serde_json::to_string(&value)?)
}

/// Error for a failed driver operation
///
/// Playwright timeouts become [`E2eError::Timeout`] so callers that retry
/// on timeouts see them as such.
pub fn driver_error(op: &str, name: Option<&str>, message: &str) -> E2eError {
    let timed_out = name == Some("TimeoutError")
        || PLAYWRIGHT_TIMEOUT
            .as_ref()
            .map_or(false, |re| re.is_match(message));
    if timed_out {
        E2eError::Timeout(format!("{}: {}", op, message))
    } else {
        E2eError::Browser(format!("{} failed: {}", op, message))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    #[serde(default)]
    id: u64,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    har: Vec<HarEntry>,
}

impl Reply {
    fn into_error(self, op: &str) -> E2eError {
        driver_error(op, self.error_name.as_deref(), self.error.as_deref().unwrap_or_default())
    }
}

/// The running Node process
struct Driver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Driver {
    async fn call(&mut self, op: &Op, page: &str, capture: bool) -> E2eResult<Reply> {
        self.next_id += 1;
        let id = self.next_id;
        let mut line = request_line(id, page, capture, op)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let line = self.stdout.next_line().await?.ok_or(E2eError::ConnectionClosed)?;
            let line = line.trim();
            if !line.starts_with('{') {
                debug!("playwright: {}", line);
                continue;
            }
            let reply: Reply = serde_json::from_str(line)?;
            if reply.id == id {
                return Ok(reply);
            }
            if reply.id == 0 {
                return Err(reply.into_error("driver startup"));
            }
            debug!("Dropping stale driver reply {}", reply.id);
        }
    }

    async fn quit(mut self) {
        let quit = "{\"op\":\"quit\"}\n";
        if self.stdin.write_all(quit.as_bytes()).await.is_ok() {
            let _ = self.stdin.flush().await;
        }
        match tokio::time::timeout(Duration::from_secs(10), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright driver exited with {}", status),
            _ => {
                warn!("Playwright driver did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    handle: String,
    url: Option<String>,
}

impl Window {
    fn new(url: Option<String>) -> Self {
        Self {
            handle: uuid::Uuid::new_v4().simple().to_string(),
            url,
        }
    }
}

#[derive(Debug)]
struct Capture {
    name: String,
    entries: Vec<HarEntry>,
}

#[derive(Debug)]
struct State {
    windows: Vec<Window>,
    current: usize,
    capture: Option<Capture>,
}

impl State {
    fn fresh() -> Self {
        Self {
            windows: vec![Window::new(None)],
            current: 0,
            capture: None,
        }
    }

    fn current(&self) -> E2eResult<&Window> {
        self.windows
            .get(self.current)
            .ok_or_else(|| E2eError::Browser("no current window".to_string()))
    }
}

/// Playwright driven through one long-lived Node process
pub struct PlaywrightBrowser {
    kind: BrowserKind,
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
    navigation_timeout_ms: u64,
    video_dir: Option<PathBuf>,
    workdir: PathBuf,
    _scratch: Option<TempDir>,
    state: Mutex<State>,
    driver: tokio::sync::Mutex<Option<Driver>>,
}

impl PlaywrightBrowser {
    pub fn new(config: &BrowserConfig) -> E2eResult<Self> {
        let (workdir, scratch) = match &config.scripts_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let tmp = tempfile::Builder::new().prefix("hubcheck-browser").tempdir()?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        info!("Playwright {} working in {}", config.kind, workdir.display());
        Ok(Self {
            kind: BrowserKind::parse(&config.kind)?,
            headless: config.headless,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            navigation_timeout_ms: config.navigation_timeout_ms,
            video_dir: config.video_dir.clone(),
            workdir,
            _scratch: scratch,
            state: Mutex::new(State::fresh()),
            driver: tokio::sync::Mutex::new(None),
        })
    }

    /// Check if Playwright is installed
    pub fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Longest a single operation may take before the driver is given up on
    fn op_deadline(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms.saturating_mul(2)) + Duration::from_secs(30)
    }

    fn driver_config(&self, first_handle: &str) -> serde_json::Value {
        serde_json::json!({
            "browser": self.kind.as_str(),
            "headless": self.headless,
            "width": self.viewport_width,
            "height": self.viewport_height,
            "timeout": self.navigation_timeout_ms,
            "videoDir": self.video_dir.as_ref().map(|d| d.to_string_lossy().into_owned()),
            "firstHandle": first_handle,
        })
    }

    /// Start the driver
    ///
    /// A new driver has a single blank window; any windows the previous
    /// one had are forgotten except the first, which keeps its handle.
    fn spawn_driver(&self) -> E2eResult<Driver> {
        if let Some(dir) = &self.video_dir {
            std::fs::create_dir_all(dir)?;
        }
        let script = self.workdir.join("playwright_driver.js");
        std::fs::write(&script, DRIVER_JS)?;

        let first = {
            let mut state = self.state.lock();
            state.windows.truncate(1);
            if state.windows.is_empty() {
                state.windows.push(Window::new(None));
            }
            state.windows[0].url = None;
            state.current = 0;
            state.windows[0].handle.clone()
        };

        let mut child = TokioCommand::new("node")
            .arg(&script)
            .arg(self.driver_config(&first).to_string())
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Browser("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Browser("driver stdout unavailable".to_string()))?;

        info!("Started Playwright driver ({})", self.kind.as_str());
        Ok(Driver {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        })
    }

    /// Send `op` for window `page`, starting the driver on first use
    ///
    /// A driver that stops answering is killed; the next operation starts
    /// a new one.
    async fn call(&self, op: &Op, page: &str, capture: bool) -> E2eResult<Reply> {
        let mut guard = self.driver.lock().await;
        let driver = match guard.as_mut() {
            Some(driver) => driver,
            None => guard.insert(self.spawn_driver()?),
        };

        let deadline = self.op_deadline();
        let result = match tokio::time::timeout(deadline, driver.call(op, page, capture)).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Timeout(format!(
                "{}: no answer from the driver within {:?}",
                op.name(),
                deadline
            ))),
        };
        if matches!(
            result,
            Err(E2eError::ConnectionClosed | E2eError::Io(_) | E2eError::Timeout(_))
        ) {
            warn!("Dropping the Playwright driver after {}", op.name());
            *guard = None;
        }
        result
    }

    async fn perform(&self, op: Op) -> E2eResult<serde_json::Value> {
        let (page, capture) = {
            let state = self.state.lock();
            (state.current()?.handle.clone(), state.capture.is_some())
        };

        let reply = self.call(&op, &page, capture).await?;

        let mut state = self.state.lock();
        if let Some(capture) = state.capture.as_mut() {
            capture.entries.extend(reply.har.iter().cloned());
        }
        if !reply.ok {
            return Err(reply.into_error(&op.name()));
        }

        if let Some(window) = state.windows.iter_mut().find(|w| w.handle == page) {
            window.url = reply.url.clone();
        }
        if let Op::ClickPopup { handle, .. } = &op {
            state.windows.push(Window {
                handle: handle.clone(),
                url: reply.result.as_str().map(str::to_string),
            });
            return Ok(serde_json::Value::String(handle.clone()));
        }
        Ok(reply.result)
    }

    /// Everything captured since the last `new_har`
    pub fn har(&self) -> Har {
        let mut har = Har::default();
        if let Some(capture) = &self.state.lock().capture {
            har.log.entries = capture.entries.clone();
        }
        har
    }

    /// Write the current capture to `<workdir>/<name>.har`
    pub fn save_har(&self) -> E2eResult<Option<PathBuf>> {
        let name = match &self.state.lock().capture {
            Some(c) => c.name.clone(),
            None => return Ok(None),
        };
        let path = self.workdir.join(format!("{}.har", name));
        std::fs::write(&path, serde_json::to_string_pretty(&self.har())?)?;
        Ok(Some(path))
    }
}

fn as_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn get(&self, url: &str) -> E2eResult<()> {
        self.perform(Op::Goto { url: url.to_string() }).await?;
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        let state = self.state.lock();
        Ok(state
            .current()?
            .url
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.perform(Op::Click {
            selector: selector.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn submit_form(&self, fields: &[FormField], submit: &str) -> E2eResult<()> {
        self.perform(Op::Submit {
            fields: fields.iter().map(DriverField::from).collect(),
            submit: submit.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn is_displayed(&self, selector: &str) -> E2eResult<bool> {
        let value = self
            .perform(Op::IsDisplayed {
                selector: selector.to_string(),
            })
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn wait_for(&self, selector: &str) -> E2eResult<()> {
        self.perform(Op::WaitFor {
            selector: selector.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn text_of(&self, selector: &str) -> E2eResult<String> {
        let value = self
            .perform(Op::Text {
                selector: selector.to_string(),
            })
            .await?;
        Ok(as_string(value))
    }

    async fn texts_of(&self, selector: &str) -> E2eResult<Vec<String>> {
        let value = self
            .perform(Op::Texts {
                selector: selector.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn value_of(&self, selector: &str) -> E2eResult<String> {
        let value = self
            .perform(Op::Value {
                selector: selector.to_string(),
            })
            .await?;
        Ok(as_string(value))
    }

    async fn new_har(&self, name: &str) -> E2eResult<()> {
        self.state.lock().capture = Some(Capture {
            name: name.to_string(),
            entries: Vec::new(),
        });
        Ok(())
    }

    async fn page_load_details(&self, url: Option<&str>) -> E2eResult<Option<HarEntry>> {
        let state = self.state.lock();
        let capture = state
            .capture
            .as_ref()
            .ok_or_else(|| E2eError::Browser("no page-load capture is active".to_string()))?;
        Ok(har::select_entry(&capture.entries, url).cloned())
    }

    fn window_handles(&self) -> Vec<String> {
        self.state.lock().windows.iter().map(|w| w.handle.clone()).collect()
    }

    fn current_window(&self) -> E2eResult<String> {
        Ok(self.state.lock().current()?.handle.clone())
    }

    fn switch_to_window(&self, handle: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        let index = state
            .windows
            .iter()
            .position(|w| w.handle == handle)
            .ok_or_else(|| E2eError::Browser(format!("no window {}", handle)))?;
        state.current = index;
        Ok(())
    }

    async fn click_opening_window(&self, selector: &str) -> E2eResult<String> {
        let value = self
            .perform(Op::ClickPopup {
                selector: selector.to_string(),
                handle: Window::new(None).handle,
            })
            .await?;
        Ok(as_string(value))
    }

    async fn close_window(&self) -> E2eResult<()> {
        if self.state.lock().windows.len() <= 1 {
            return Err(E2eError::Browser("cannot close the last window".to_string()));
        }
        self.perform(Op::ClosePage).await?;

        let mut state = self.state.lock();
        let current = state.current;
        state.windows.remove(current);
        state.current = current.saturating_sub(1);
        Ok(())
    }

    async fn take_screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.perform(Op::Screenshot {
            path: path.to_path_buf(),
        })
        .await?;
        Ok(())
    }

    async fn save_video(&self, path: &Path) -> E2eResult<()> {
        if self.video_dir.is_none() {
            return Err(E2eError::Browser("video recording is off".to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.perform(Op::SaveVideo {
            path: path.to_path_buf(),
        })
        .await?;
        // the window now holds a fresh blank page
        let mut state = self.state.lock();
        let current = state.current;
        if let Some(window) = state.windows.get_mut(current) {
            window.url = None;
        }
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.save_har() {
            debug!("Could not save capture: {}", e);
        }
        if let Some(driver) = self.driver.lock().await.take() {
            driver.quit().await;
        }
        *self.state.lock() = State::fresh();
        Ok(())
    }
}
