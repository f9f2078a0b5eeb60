//! The acceptance scenarios
//!
//! Each scenario is a small struct implementing [`Scenario`]; [`all`]
//! lists them in the order the runner executes them.

pub mod container;
pub mod contribtool;
pub mod filexfer;
pub mod invoke;
pub mod parampass;
pub mod rappture;
pub mod redirects;
pub mod sessions;
pub mod submit;
pub mod user;
pub mod webdav;
pub mod website;

use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::SharedResources;
use crate::runner::Scenario;
use crate::shell::{ImportSource, Workspace};

/// Role of the everyday account with a workspace
pub const REGISTERED_ROLE: &str = "registeredworkspace";

/// Role of the account that may `sudo su - apps`
pub const APPS_ROLE: &str = "appsworkspace";

/// Role of a plain member account with a workspace
pub const PURDUE_ROLE: &str = "purdueworkspace";

/// Scripts uploaded into containers, as shipped with the crate
const HELPERS: &[(&str, &str)] = &[
    ("checknet.py", include_str!("../../data/checknet.py")),
    ("sayhi.py", include_str!("../../data/sayhi.py")),
    ("sim1.py", include_str!("../../data/sim1.py")),
];

/// A helper script, preferring a copy in the configured data directory
pub fn helper(settings: &Settings, name: &str) -> E2eResult<ImportSource> {
    let local = settings.data_dir.join(name);
    if local.is_file() {
        debug!("Using helper {}", local.display());
        return Ok(ImportSource::LocalPath(local));
    }
    HELPERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, body)| ImportSource::from(*body))
        .ok_or_else(|| E2eError::Setup(format!("no helper script named {}", name)))
}

/// Every scenario, in run order
pub fn all() -> Vec<Box<dyn Scenario>> {
    let mut scenarios: Vec<Box<dyn Scenario>> = Vec::new();
    scenarios.extend(website::scenarios());
    scenarios.extend(redirects::scenarios());
    scenarios.extend(container::scenarios());
    scenarios.extend(rappture::scenarios());
    scenarios.extend(filexfer::scenarios());
    scenarios.extend(user::scenarios());
    scenarios.extend(invoke::scenarios());
    scenarios.extend(submit::scenarios());
    scenarios.extend(sessions::scenarios());
    scenarios.extend(parampass::scenarios());
    scenarios.extend(contribtool::scenarios());
    scenarios.extend(webdav::scenarios());
    scenarios
}

/// `sudo su - apps` into a nested shell
///
/// Accounts outside the apps group skip the calling test.
pub async fn become_apps(ws: &mut Workspace) -> E2eResult<()> {
    let groups = ws.output("groups").await?;
    if !groups.split_whitespace().any(|g| g == "apps") {
        return Err(E2eError::Skipped(format!(
            "user {} not in apps group: {}",
            ws.username(),
            groups.trim()
        )));
    }
    ws.send("sudo su - apps").await?;
    ws.start_bash_shell().await?;

    let who = ws.output("whoami").await?;
    if who.trim() != "apps" {
        leave_apps(ws).await?;
        return Err(E2eError::AssertionFailed(format!(
            "doesn't look like we were able to become the apps user, whoami says '{}'",
            who.trim()
        )));
    }
    Ok(())
}

/// Back out of the shell [`become_apps`] opened
pub async fn leave_apps(ws: &mut Workspace) -> E2eResult<()> {
    ws.stop_bash_shell().await?;
    ws.send("exit").await?;
    let who = ws.output("whoami").await?;
    debug!("Back to {} from apps", who.trim());
    Ok(())
}

/// A container shell sitting in `$SESSIONDIR`, removing the files it put
/// there when closed
pub struct SessionShell {
    pub ws: Workspace,
    pub sessiondir: String,
    uploaded: Vec<String>,
}

impl SessionShell {
    /// Shell for the first account holding `role`
    pub async fn open(hub: &SharedResources, role: &str, toolname: Option<&str>) -> E2eResult<Self> {
        let (username, password) = hub.account_for(role)?;
        let ws = hub
            .containers
            .access(hub.hub_host(), &username, &password, toolname)
            .await?;
        Self::in_session_dir(ws).await
    }

    pub async fn in_session_dir(mut ws: Workspace) -> E2eResult<Self> {
        ws.execute("cd $SESSIONDIR").await?;
        let sessiondir = ws.output("pwd").await?.trim().to_string();
        Ok(Self {
            ws,
            sessiondir,
            uploaded: Vec::new(),
        })
    }

    pub fn path(&self, name: &str) -> String {
        format!("{}/{}", self.sessiondir, name)
    }

    /// Upload into the session directory; the file is removed on close
    pub async fn put(
        &mut self,
        name: &str,
        source: impl Into<ImportSource>,
        mode: Option<u32>,
    ) -> E2eResult<String> {
        let path = self.path(name);
        self.put_at(path, source, mode).await
    }

    /// Upload to an absolute path; also removed on close
    pub async fn put_at(
        &mut self,
        path: String,
        source: impl Into<ImportSource>,
        mode: Option<u32>,
    ) -> E2eResult<String> {
        self.ws.importfile(source, &path, mode).await?;
        self.uploaded.push(path.clone());
        Ok(path)
    }

    /// Remove a file the test creates some other way when the shell closes
    pub fn remove_on_finish(&mut self, path: String) {
        self.uploaded.push(path);
    }

    /// Remove uploads and close the shell, then hand back `result`
    ///
    /// A cleanup failure is only reported when `result` is a success.
    pub async fn finish<T>(mut self, result: E2eResult<T>) -> E2eResult<T> {
        let mut cleanup = Ok(());
        if self.ws.is_open() {
            for path in std::mem::take(&mut self.uploaded) {
                if let Err(e) = self.ws.remove_file(&path).await {
                    warn!("Could not remove {}: {}", path, e);
                    cleanup = Err(e);
                    break;
                }
            }
        }
        let closed = self.ws.close().await;
        let value = result?;
        cleanup?;
        closed?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_prefers_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sayhi.py"), "print('hi there')\n").unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };

        assert!(matches!(helper(&settings, "sayhi.py").unwrap(), ImportSource::LocalPath(_)));
        match helper(&settings, "checknet.py").unwrap() {
            ImportSource::Data(body) => assert!(String::from_utf8_lossy(&body).contains("--protocol")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(helper(&settings, "nope.sh").is_err());
    }

    #[test]
    fn test_scenario_names_are_unique() {
        let scenarios = all();
        let mut names: Vec<&str> = scenarios.iter().map(|s| s.name()).collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
    }
}
