//! The hub's `session` command and pre-test session snapshots

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use hubcheck_common::parse::{self, SessionRow};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::retry::PollPolicy;
use crate::shell::transport::{CommandOutput, ShellChannel, Target, Transport};

/// `session` subcommands run over ssh as one account
#[derive(Clone)]
pub struct ToolSession {
    transport: Arc<dyn Transport>,
    target: Target,
    timeout: Duration,
}

impl ToolSession {
    pub fn new(transport: Arc<dyn Transport>, target: Target, timeout: Duration) -> Self {
        Self {
            transport,
            target,
            timeout,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    async fn session(&self, args: &str) -> E2eResult<CommandOutput> {
        let command = if args.is_empty() {
            "session".to_string()
        } else {
            format!("session {}", args)
        };
        self.transport.run(&self.target, &command, self.timeout).await
    }

    async fn session_ok(&self, args: &str) -> E2eResult<CommandOutput> {
        let out = self.session(args).await?;
        if !out.success() {
            return Err(E2eError::CommandFailed {
                command: format!("session {}", args),
                status: out.status,
                output: format!("{}{}", out.stdout, out.stderr),
            });
        }
        Ok(out)
    }

    pub async fn help(&self) -> E2eResult<CommandOutput> {
        self.session("help").await
    }

    /// Open sessions for this account
    pub async fn list(&self) -> E2eResult<Vec<SessionRow>> {
        let out = self.session_ok("list").await?;
        Ok(parse::session_rows(&out.stdout))
    }

    pub async fn open_session_numbers(&self) -> E2eResult<BTreeSet<u64>> {
        Ok(self.list().await?.into_iter().map(|r| r.number).collect())
    }

    /// Open sessions keyed by number
    pub async fn open_session_detail(&self) -> E2eResult<BTreeMap<u64, SessionRow>> {
        Ok(self.list().await?.into_iter().map(|r| (r.number, r)).collect())
    }

    pub async fn session_detail(&self, number: u64) -> E2eResult<Option<SessionRow>> {
        Ok(self.open_session_detail().await?.remove(&number))
    }

    pub async fn session_number_by_title(&self, title: &str) -> E2eResult<Option<u64>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|r| r.title() == title)
            .map(|r| r.number))
    }

    /// Start a new session and return its number
    pub async fn create(&self, title: Option<&str>) -> E2eResult<u64> {
        let args = match title {
            Some(t) => format!("create {}", shell_escape::escape(t.into())),
            None => "create".to_string(),
        };
        let out = self.session_ok(&args).await?;
        let number = parse::first_integer(&out.stdout).ok_or_else(|| {
            E2eError::Setup(format!("no session number in '{}'", out.stdout.trim()))
        })?;
        info!("Created session {} for {}", number, self.target.username);
        Ok(number)
    }

    pub async fn stop(&self, number: u64) -> E2eResult<()> {
        debug!("Stopping session {} for {}", number, self.target.username);
        self.session_ok(&format!("stop {}", number)).await?;
        Ok(())
    }

    /// Interactive shell inside a session, the newest one when `number` is None
    pub async fn access(&self, number: Option<u64>) -> E2eResult<Box<dyn ShellChannel>> {
        let command = match number {
            Some(n) => format!("session {}", n),
            None => "session".to_string(),
        };
        let target = self.target.clone().with_command(command);
        self.transport.open_shell(&target).await
    }

    /// Run one command through `session <command>`
    pub async fn access_command(&self, command: &str) -> E2eResult<CommandOutput> {
        self.session(command).await
    }
}

/// Sessions open before a test, for closing whatever the test leaked
pub struct SessionSnapshot {
    session: ToolSession,
    before: BTreeSet<u64>,
    recorded: BTreeSet<u64>,
    title: Option<String>,
    poll: PollPolicy,
}

impl SessionSnapshot {
    pub async fn take(session: ToolSession, poll: PollPolicy) -> E2eResult<Self> {
        let before = session.open_session_numbers().await?;
        debug!(
            "Session snapshot for {}: {:?}",
            session.target().username,
            before
        );
        Ok(Self {
            session,
            before,
            recorded: BTreeSet::new(),
            title: None,
            poll,
        })
    }

    /// Only close new sessions whose listing mentions `title`
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Close `number` on reconcile even if it was open at snapshot time
    pub fn record(&mut self, number: u64) {
        self.recorded.insert(number);
    }

    pub fn before(&self) -> &BTreeSet<u64> {
        &self.before
    }

    /// Stop leaked sessions and wait until the listing agrees
    ///
    /// Returns the session numbers that were stopped.
    pub async fn reconcile(&self) -> E2eResult<Vec<u64>> {
        let live = self.session.list().await?;
        let leaked: Vec<u64> = live
            .iter()
            .filter(|row| {
                let new = !self.before.contains(&row.number)
                    && self.title.as_deref().map_or(true, |t| row.detail.contains(t));
                new || self.recorded.contains(&row.number)
            })
            .map(|row| row.number)
            .collect();

        if leaked.is_empty() {
            return Ok(leaked);
        }

        for number in &leaked {
            if let Err(e) = self.session.stop(*number).await {
                warn!("Could not stop leaked session {}: {}", number, e);
            }
        }

        let session = &self.session;
        let stopped = &leaked;
        self.poll
            .poll_until("leaked sessions to close", || async move {
                let open = session.open_session_numbers().await?;
                Ok(stopped.iter().all(|n| !open.contains(n)).then_some(()))
            })
            .await?;

        info!("Closed {} leaked session(s): {:?}", leaked.len(), leaked);
        Ok(leaked)
    }
}
