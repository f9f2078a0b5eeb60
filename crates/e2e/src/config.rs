//! Runner settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::retry::{PollPolicy, RetryPolicy};

/// Settings for one acceptance run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Test data file, plain or sealed YAML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testdata: Option<PathBuf>,

    /// Environment variable holding the test data password
    pub testdata_password_env: String,

    /// Where failure screenshots go
    pub screenshot_dir: PathBuf,

    /// Helper scripts copied into containers (checknet.py, sim1.py, ...)
    pub data_dir: PathBuf,

    /// Tool whose sessions give the apps account a workspace
    pub apps_workspace_toolname: String,

    /// Default per-command timeout inside containers, in seconds
    pub command_timeout_secs: u64,

    /// Results directory for the runner's JSON report
    pub output_dir: PathBuf,

    pub ssh: SshConfig,

    pub browser: BrowserConfig,

    pub retry: RetryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let home = hubcheck_common::default_home();
        Self {
            testdata: None,
            testdata_password_env: "HUBCHECK_TESTDATA_PASSWORD".to_string(),
            screenshot_dir: home.join("screenshots"),
            data_dir: PathBuf::from("data"),
            apps_workspace_toolname: "workspace".to_string(),
            command_timeout_secs: 10,
            output_dir: PathBuf::from("test-results"),
            ssh: SshConfig::default(),
            browser: BrowserConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// ssh client options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// ssh binary
    pub binary: String,

    /// Extra `-o` options
    pub options: Vec<String>,

    /// Seconds to wait for a connection
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            options: vec![
                "StrictHostKeyChecking=no".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
                "LogLevel=ERROR".to_string(),
            ],
            connect_timeout_secs: 30,
        }
    }
}

/// Playwright options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// chromium, firefox or webkit
    pub kind: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Where the driver script and HAR files live; a temporary
    /// directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,

    /// Record video of every window into this directory; a failing test
    /// keeps its recording
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_dir: Option<PathBuf>,

    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: "chromium".to_string(),
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            scripts_dir: None,
            video_dir: None,
            navigation_timeout_ms: 30_000,
        }
    }
}

/// Bounded retries and polling deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts for the Approved transition, which can time out right
    /// after the version form is submitted
    pub approval_attempts: u32,
    pub approval_delay_secs: u64,

    /// How long to wait for `session list` to reflect a change
    pub session_poll_interval_ms: u64,
    pub session_poll_deadline_secs: u64,

    /// fail2ban cool-down after a burst of WebDAV logins
    pub fail2ban_cooldown_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            approval_attempts: 2,
            approval_delay_secs: 0,
            session_poll_interval_ms: 1000,
            session_poll_deadline_secs: 30,
            fail2ban_cooldown_secs: 600,
        }
    }
}

impl Settings {
    /// Load settings from file, defaults when the file is absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Self>(&content)?
        } else {
            Self::default()
        };
        settings.expand_paths();
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::E2eError::Setup(format!("cannot encode settings: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.testdata = self.testdata.as_deref().map(expand_path);
        self.screenshot_dir = expand_path(&self.screenshot_dir);
        self.data_dir = expand_path(&self.data_dir);
        self.output_dir = expand_path(&self.output_dir);
        self.browser.scripts_dir = self.browser.scripts_dir.as_deref().map(expand_path);
        self.browser.video_dir = self.browser.video_dir.as_deref().map(expand_path);
    }

    /// Test data password from the configured environment variable
    pub fn testdata_password(&self) -> Option<String> {
        std::env::var(&self.testdata_password_env).ok()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn approval_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.approval_attempts.max(1),
            delay: Duration::from_secs(self.retry.approval_delay_secs),
        }
    }

    pub fn session_poll(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.retry.session_poll_interval_ms),
            deadline: Duration::from_secs(self.retry.session_poll_deadline_secs),
        }
    }

    pub fn fail2ban_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry.fail2ban_cooldown_secs)
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references
///
/// Unknown variables are left as written.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let home = std::env::var("HOME").ok();

    let tilde_expanded = match (raw.strip_prefix('~'), home.as_deref()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{}", home, rest)
        }
        _ => raw.to_string(),
    };

    PathBuf::from(expand_vars(&tilde_expanded, |name| std::env::var(name).ok()))
}

fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &rest[pos + 1 + consumed..];
    }
    out.push_str(rest);
    out
}
