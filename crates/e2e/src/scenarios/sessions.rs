//! Tool session lifecycle: the `session` command, pty recycling and the
//! session page in the browser

use async_trait::async_trait;
use hubcheck_common::parse::first_integer;
use tracing::{info, warn};

use crate::actions::account;
use crate::browser::WindowGuard;
use crate::catalog::ToolSessionPage;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{ReconcileSessions, SharedResources};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::REGISTERED_ROLE;
use crate::shell::SessionSnapshot;

/// Title given to sessions these scenarios create
pub const SESSION_TITLE: &str = "hubcheck";

/// Tool whose session page the browser scenarios open
const WORKSPACE_TOOL: &str = "workspace";

/// Containers get 15 ptys; twice that proves they are released
const PTY_ROUNDS: usize = 31;

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(SessionHelp),
        Box::new(CreateAccessStop),
        Box::new(PtyRecycle),
        Box::new(TerminateContainer),
        Box::new(PopoutContainer),
    ]
}

/// Snapshot the role's sessions and stop whatever the test leaves behind
pub(crate) async fn reconcile_after(
    ctx: &mut TestContext,
    username: &str,
    password: &str,
    title: Option<&str>,
) -> E2eResult<()> {
    let hub = ctx.hub();
    let session = hub.containers.tool_session(hub.hub_host(), username, password);
    let mut snapshot = SessionSnapshot::take(session, hub.settings.session_poll()).await?;
    if let Some(title) = title {
        snapshot = snapshot.with_title(title);
    }
    ctx.add_finalizer(ReconcileSessions::new(snapshot));
    Ok(())
}

/// Open (or attach to) a session and return its number
async fn session_number(hub: &SharedResources, username: &str, password: &str) -> E2eResult<u64> {
    let mut ws = hub
        .containers
        .access(hub.hub_host(), username, password, None)
        .await?;
    let number = match ws.session_number() {
        Some(n) => Ok(n),
        None => {
            let out = ws.output("echo $SESSION").await;
            out.and_then(|o| {
                first_integer(&o)
                    .ok_or_else(|| E2eError::AssertionFailed(format!("$SESSION is '{}'", o.trim())))
            })
        }
    };
    ws.close().await?;
    number
}

pub struct SessionHelp;

#[async_trait]
impl Scenario for SessionHelp {
    fn name(&self) -> &str {
        "test_session_help"
    }

    fn class(&self) -> &str {
        "TestSessionCommand"
    }

    fn tags(&self) -> &[&str] {
        &["container", "session"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let (username, password) = hub.account_for(REGISTERED_ROLE)?;
        let help = hub
            .containers
            .tool_session(hub.hub_host(), &username, &password)
            .help()
            .await?;
        E2eError::check(!help.stdout.trim().is_empty(), || {
            "output is empty, no help data printed".to_string()
        })
    }
}

/// `session create`, attach, run a command, `session stop`
pub struct CreateAccessStop;

#[async_trait]
impl Scenario for CreateAccessStop {
    fn name(&self) -> &str {
        "test_session_create_access_stop"
    }

    fn class(&self) -> &str {
        "TestSessionCommand"
    }

    fn tags(&self) -> &[&str] {
        &["container", "session"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let (username, password) = ctx.hub().account_for(REGISTERED_ROLE)?;
        reconcile_after(ctx, &username, &password, Some(SESSION_TITLE)).await?;
        let hub = ctx.hub();
        let host = hub.hub_host();

        let mut ws = hub
            .containers
            .create(host, &username, &password, Some(SESSION_TITLE))
            .await?;
        let number = ws
            .session_number()
            .ok_or_else(|| E2eError::Setup("created workspace has no session number".to_string()))?;
        let reported = ws.output("echo $SESSION").await;
        ws.close().await?;
        let reported = reported?;
        E2eError::check(first_integer(&reported) == Some(number), || {
            format!("$SESSION is '{}' in session {}", reported.trim(), number)
        })?;

        let session = hub.containers.tool_session(host, &username, &password);
        let titled = session.session_number_by_title(SESSION_TITLE).await?;
        E2eError::check(titled.is_some(), || {
            format!("no open session titled {}", SESSION_TITLE)
        })?;

        hub.containers.stop(host, &username, number).await?;
        let open = hub.containers.sync_open_sessions(host, &username).await?;
        E2eError::check(!open.contains(&number), || {
            format!("session {} still open after stop", number)
        })
    }
}

/// Closing a connection releases its pty
pub struct PtyRecycle;

#[async_trait]
impl Scenario for PtyRecycle {
    fn name(&self) -> &str {
        "test_tty_recycle"
    }

    fn class(&self) -> &str {
        "TestContainerUser"
    }

    fn tags(&self) -> &[&str] {
        &["container", "pty"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let (username, password) = hub.account_for(REGISTERED_ROLE)?;
        let host = hub.hub_host();
        let mut last_session = None;

        for round in 0..PTY_ROUNDS {
            let attempt = async {
                let mut ws = hub.containers.access(host, &username, &password, None).await?;
                last_session = ws.session_number().or(last_session);
                let result = async {
                    ws.execute("echo $SESSION").await?;
                    ws.send("/bin/bash").await
                }
                .await;
                ws.close().await?;
                result
            }
            .await;

            if let Err(e) = attempt {
                if e.is_resource_exhaustion() {
                    if let Some(number) = last_session {
                        // the container is unusable now
                        warn!("Stopping session {} after pty exhaustion", number);
                        if let Err(stop) = hub.containers.stop(host, &username, number).await {
                            warn!("Could not stop session {}: {}", number, stop);
                        }
                    }
                }
                return Err(E2eError::AssertionFailed(format!(
                    "After connecting {} time(s): {}",
                    round, e
                )));
            }
        }
        info!("Opened and closed {} connections", PTY_ROUNDS);
        Ok(())
    }
}

/// The terminate button on the session page ends the container
pub struct TerminateContainer;

#[async_trait]
impl Scenario for TerminateContainer {
    fn name(&self) -> &str {
        "test_terminate_container"
    }

    fn class(&self) -> &str {
        "TestToolSessionApp"
    }

    fn tags(&self) -> &[&str] {
        &["website", "tool_session"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let (username, password) = ctx.hub().account_for(REGISTERED_ROLE)?;
        reconcile_after(ctx, &username, &password, None).await?;
        let hub = ctx.hub();
        let host = hub.hub_host();
        let number = session_number(hub, &username, &password).await?;

        hub.browser.get(&hub.urls.https_authority).await?;
        account::login_as(&hub.catalog, &username, &password).await?;
        let page = hub
            .catalog
            .goto::<ToolSessionPage>((WORKSPACE_TOOL.to_string(), number))
            .await?;
        page.do_terminate().await?;

        let session = hub.containers.tool_session(host, &username, &password);
        let session = &session;
        let gone = hub
            .settings
            .session_poll()
            .poll_until("terminated session to close", || async move {
                let open = session.open_session_numbers().await?;
                Ok((!open.contains(&number)).then_some(()))
            })
            .await;
        hub.containers.sync_open_sessions(host, &username).await?;
        account::logout(&hub.catalog).await?;

        gone.map_err(|_| {
            E2eError::AssertionFailed(format!(
                "after terminating session {}, session still listed as open",
                number
            ))
        })
    }
}

/// Popping the app out and closing the popup leaves the session running
pub struct PopoutContainer;

#[async_trait]
impl Scenario for PopoutContainer {
    fn name(&self) -> &str {
        "test_popout_container_close"
    }

    fn class(&self) -> &str {
        "TestToolSessionApp"
    }

    fn tags(&self) -> &[&str] {
        &["website", "tool_session", "popout"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let (username, password) = ctx.hub().account_for(REGISTERED_ROLE)?;
        reconcile_after(ctx, &username, &password, None).await?;
        let hub = ctx.hub();
        let number = session_number(hub, &username, &password).await?;

        hub.browser.get(&hub.urls.https_authority).await?;
        account::login_as(&hub.catalog, &username, &password).await?;
        let page = hub
            .catalog
            .goto::<ToolSessionPage>((WORKSPACE_TOOL.to_string(), number))
            .await?;

        let popup = page.do_popout().await?;
        let windows = hub.browser.window_handles();
        E2eError::check(windows.len() > 1, || {
            "after pressing the popout button, no window popped out".to_string()
        })?;
        {
            let guard = WindowGuard::switch_to(hub.browser.as_ref(), &popup)?;
            let url = hub.browser.current_url().await?;
            info!("Popped out session {} to {}", number, url);
            guard.close_current().await?;
        }

        let open = hub
            .containers
            .sync_open_sessions(hub.hub_host(), &username)
            .await?;
        account::logout(&hub.catalog).await?;
        E2eError::check(open.contains(&number), || {
            format!("closing the popout window closed session {}", number)
        })
    }
}
