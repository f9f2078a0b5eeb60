//! Account setup inside a tool session container

use async_trait::async_trait;

use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::{become_apps, leave_apps, SessionShell, APPS_ROLE, PURDUE_ROLE};
use crate::shell::Workspace;

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(AppsUmask),
        Box::new(AppsHome),
        Box::new(RegisteredUmask),
    ]
}

/// Home directory the apps account should have, next to the user's own
pub fn apps_home(user_home: &str) -> String {
    match user_home.trim().trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) => format!("{}/apps", parent),
        None => "apps".to_string(),
    }
}

/// Run `command` as the apps account
async fn as_apps(ws: &mut Workspace, command: &str) -> E2eResult<String> {
    become_apps(ws).await?;
    let output = ws.output(command).await;
    leave_apps(ws).await?;
    Ok(output?.trim().to_string())
}

fn check_umask(umask: &str, expected: &str) -> E2eResult<()> {
    E2eError::check(umask == expected, || {
        format!("incorrect umask: {}, expected: {}", umask, expected)
    })
}

pub struct AppsUmask;

#[async_trait]
impl Scenario for AppsUmask {
    fn name(&self) -> &str {
        "test_apps_umask"
    }

    fn class(&self) -> &str {
        "TestAppsUser"
    }

    fn tags(&self) -> &[&str] {
        &["container", "user", "appsuser"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), APPS_ROLE, None).await?;
        let result = async {
            let umask = as_apps(&mut shell.ws, "umask").await?;
            check_umask(&umask, "0022")
        }
        .await;
        shell.finish(result).await
    }
}

/// The apps account lives at `/home/<hub>/apps`
pub struct AppsHome;

#[async_trait]
impl Scenario for AppsHome {
    fn name(&self) -> &str {
        "test_apps_home_directory"
    }

    fn class(&self) -> &str {
        "TestAppsUser"
    }

    fn tags(&self) -> &[&str] {
        &["container", "user", "appsuser"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), APPS_ROLE, None).await?;
        let result = async {
            let expected = apps_home(&shell.ws.output("echo $HOME").await?);
            let home = as_apps(&mut shell.ws, "echo $HOME").await?;
            E2eError::check(home == expected, || {
                format!("incorrect homedir: {}, expected: {}", home, expected)
            })
        }
        .await;
        shell.finish(result).await
    }
}

pub struct RegisteredUmask;

#[async_trait]
impl Scenario for RegisteredUmask {
    fn name(&self) -> &str {
        "test_registered_umask"
    }

    fn class(&self) -> &str {
        "TestRegisteredUser"
    }

    fn tags(&self) -> &[&str] {
        &["container", "user", "registereduser"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let mut shell = SessionShell::open(ctx.hub(), PURDUE_ROLE, None).await?;
        let result = async {
            let umask = shell.ws.output("umask").await?;
            check_umask(umask.trim(), "0027")
        }
        .await;
        shell.finish(result).await
    }
}
