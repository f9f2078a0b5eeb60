//! Per-user container access with session bookkeeping

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::retry::PollPolicy;
use crate::shell::session::ToolSession;
use crate::shell::transport::{Target, Transport};
use crate::shell::workspace::Workspace;

type AccountKey = (String, String);

fn key(host: &str, username: &str) -> AccountKey {
    (host.to_string(), username.to_string())
}

/// Sessions this run knows about and how many shells are open in each
#[derive(Debug, Default)]
pub struct SessionBook {
    sessions: BTreeMap<AccountKey, BTreeMap<u64, usize>>,
}

impl SessionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, host: &str, username: &str, number: u64) {
        self.sessions
            .entry(key(host, username))
            .or_default()
            .entry(number)
            .or_insert(0);
    }

    fn acquire(&mut self, host: &str, username: &str, number: u64) {
        *self
            .sessions
            .entry(key(host, username))
            .or_default()
            .entry(number)
            .or_insert(0) += 1;
    }

    fn release(&mut self, host: &str, username: &str, number: u64) {
        if let Some(count) = self
            .sessions
            .get_mut(&key(host, username))
            .and_then(|s| s.get_mut(&number))
        {
            *count = count.saturating_sub(1);
        }
    }

    pub fn forget(&mut self, host: &str, username: &str, number: u64) {
        if let Some(sessions) = self.sessions.get_mut(&key(host, username)) {
            sessions.remove(&number);
        }
    }

    /// Tracked session numbers, oldest first
    pub fn sessions(&self, host: &str, username: &str) -> Vec<u64> {
        self.sessions
            .get(&key(host, username))
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Shells currently open into a session
    pub fn open_handles(&self, host: &str, username: &str, number: u64) -> usize {
        self.sessions
            .get(&key(host, username))
            .and_then(|s| s.get(&number))
            .copied()
            .unwrap_or(0)
    }

    /// Drop sessions that are no longer live
    pub fn retain_live(&mut self, host: &str, username: &str, live: &BTreeSet<u64>) -> Vec<u64> {
        let Some(sessions) = self.sessions.get_mut(&key(host, username)) else {
            return Vec::new();
        };
        let gone: Vec<u64> = sessions
            .keys()
            .filter(|n| !live.contains(n))
            .copied()
            .collect();
        for number in &gone {
            sessions.remove(number);
        }
        gone
    }
}

/// One open shell counted in a [`SessionBook`]; released when dropped
pub struct SessionLease {
    book: Arc<Mutex<SessionBook>>,
    host: String,
    username: String,
    number: u64,
}

impl SessionLease {
    fn acquire(book: Arc<Mutex<SessionBook>>, host: &str, username: &str, number: u64) -> Self {
        book.lock().acquire(host, username, number);
        Self {
            book,
            host: host.to_string(),
            username: username.to_string(),
            number,
        }
    }

    pub fn release(self) {}
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.book
            .lock()
            .release(&self.host, &self.username, self.number);
    }
}

/// Opens workspaces in tool session containers
pub struct ContainerManager {
    transport: Arc<dyn Transport>,
    book: Arc<Mutex<SessionBook>>,
    passwords: Mutex<HashMap<AccountKey, String>>,
    timeout: Duration,
    poll: PollPolicy,
}

impl ContainerManager {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration, poll: PollPolicy) -> Self {
        Self {
            transport,
            book: Arc::new(Mutex::new(SessionBook::new())),
            passwords: Mutex::new(HashMap::new()),
            timeout,
            poll,
        }
    }

    /// Share a book with another manager
    pub fn with_book(mut self, book: Arc<Mutex<SessionBook>>) -> Self {
        self.book = book;
        self
    }

    pub fn book(&self) -> Arc<Mutex<SessionBook>> {
        self.book.clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn tool_session(&self, host: &str, username: &str, password: &str) -> ToolSession {
        self.passwords
            .lock()
            .insert(key(host, username), password.to_string());
        ToolSession::new(
            self.transport.clone(),
            Target::new(host, username, password),
            self.timeout,
        )
    }

    fn known_session(&self, host: &str, username: &str) -> E2eResult<ToolSession> {
        let password = self
            .passwords
            .lock()
            .get(&key(host, username))
            .cloned()
            .ok_or_else(|| {
                E2eError::Setup(format!("no credentials recorded for {}@{}", username, host))
            })?;
        Ok(self.tool_session(host, username, &password))
    }

    /// Attach to a tracked or live session, starting one when none is open
    ///
    /// A dropped connection or a timeout anywhere on the way, listing
    /// included, is reported as [`E2eError::ResourceExhausted`].
    pub async fn access(
        &self,
        host: &str,
        username: &str,
        password: &str,
        toolname: Option<&str>,
    ) -> E2eResult<Workspace> {
        self.find_or_start(host, username, password, toolname)
            .await
            .map_err(|e| exhausted(host, username, e))
    }

    async fn find_or_start(
        &self,
        host: &str,
        username: &str,
        password: &str,
        toolname: Option<&str>,
    ) -> E2eResult<Workspace> {
        let session = self.tool_session(host, username, password);
        let live = session.list().await?;
        let live_numbers: BTreeSet<u64> = live.iter().map(|r| r.number).collect();

        let tracked = {
            let mut book = self.book.lock();
            book.retain_live(host, username, &live_numbers);
            book.sessions(host, username)
        };

        let number = match tracked.first() {
            Some(n) => *n,
            None => {
                let existing = live
                    .iter()
                    .find(|r| toolname.map_or(true, |t| r.title() == t))
                    .map(|r| r.number);
                match existing {
                    Some(n) => n,
                    None => session.create(toolname).await?,
                }
            }
        };
        self.book.lock().record(host, username, number);
        self.attach(&session, number).await
    }

    /// Always start a fresh session
    pub async fn create(
        &self,
        host: &str,
        username: &str,
        password: &str,
        title: Option<&str>,
    ) -> E2eResult<Workspace> {
        let session = self.tool_session(host, username, password);
        let number = session.create(title).await?;
        self.book.lock().record(host, username, number);
        self.attach(&session, number).await
    }

    /// Attach to a session started elsewhere, e.g. from the website
    pub async fn access_session(
        &self,
        host: &str,
        username: &str,
        password: &str,
        number: u64,
    ) -> E2eResult<Workspace> {
        let session = self.tool_session(host, username, password);
        self.book.lock().record(host, username, number);
        self.attach(&session, number).await
    }

    async fn attach(&self, session: &ToolSession, number: u64) -> E2eResult<Workspace> {
        let target = session.target();
        let channel = session.access(Some(number)).await?;
        let lease = SessionLease::acquire(self.book.clone(), &target.host, &target.username, number);
        let ws = Workspace::attach(channel, &target.host, &target.username, self.timeout)
            .await?
            .with_lease(number, lease);
        debug!("Attached to session {} as {}", number, target.username);
        Ok(ws)
    }

    /// Stop a session and wait for it to leave the listing
    pub async fn stop(&self, host: &str, username: &str, number: u64) -> E2eResult<()> {
        let session = self.known_session(host, username)?;
        session.stop(number).await?;
        let session = &session;
        self.poll
            .poll_until("session to stop", || async move {
                let open = session.open_session_numbers().await?;
                Ok((!open.contains(&number)).then_some(()))
            })
            .await?;
        self.book.lock().forget(host, username, number);
        info!("Stopped session {} for {}@{}", number, username, host);
        Ok(())
    }

    /// Drop tracked sessions that were closed behind the manager's back
    pub async fn sync_open_sessions(&self, host: &str, username: &str) -> E2eResult<BTreeSet<u64>> {
        let session = self.known_session(host, username)?;
        let live = session.open_session_numbers().await?;
        let gone = self.book.lock().retain_live(host, username, &live);
        if !gone.is_empty() {
            debug!("Sessions closed out of band for {}: {:?}", username, gone);
        }
        Ok(live)
    }
}

/// Connection trouble while getting into a container means the hub ran out
/// of something; other errors pass through
fn exhausted(host: &str, username: &str, e: E2eError) -> E2eError {
    if matches!(e, E2eError::ConnectionClosed) || e.is_timeout() {
        warn!("Container access for {}@{} failed: {}", username, host, e);
        E2eError::ResourceExhausted {
            host: host.to_string(),
            username: username.to_string(),
            source: Box::new(e),
        }
    } else {
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_released_exactly_once() {
        let book = Arc::new(Mutex::new(SessionBook::new()));
        let a = SessionLease::acquire(book.clone(), "hub", "u", 7);
        let b = SessionLease::acquire(book.clone(), "hub", "u", 7);
        assert_eq!(book.lock().open_handles("hub", "u", 7), 2);

        a.release();
        assert_eq!(book.lock().open_handles("hub", "u", 7), 1);
        drop(b);
        assert_eq!(book.lock().open_handles("hub", "u", 7), 0);
        assert_eq!(book.lock().sessions("hub", "u"), vec![7]);
    }

    #[test]
    fn test_retain_live() {
        let mut book = SessionBook::new();
        book.record("hub", "u", 1);
        book.record("hub", "u", 2);
        book.record("hub", "v", 3);

        let live = BTreeSet::from([2]);
        assert_eq!(book.retain_live("hub", "u", &live), vec![1]);
        assert_eq!(book.sessions("hub", "u"), vec![2]);
        assert_eq!(book.sessions("hub", "v"), vec![3]);
        assert!(book.retain_live("other", "u", &live).is_empty());
    }

    #[test]
    fn test_release_after_forget_is_harmless() {
        let book = Arc::new(Mutex::new(SessionBook::new()));
        let lease = SessionLease::acquire(book.clone(), "hub", "u", 9);
        book.lock().forget("hub", "u", 9);
        drop(lease);
        assert!(book.lock().sessions("hub", "u").is_empty());
    }
}
