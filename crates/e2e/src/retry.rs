//! Bounded retries and condition polling

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};

/// Retry an operation a fixed number of times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op`, retrying while `is_retryable` accepts the error and
    /// attempts remain. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        is_retryable: impl Fn(&E2eError) -> bool,
        mut op: F,
    ) -> E2eResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = E2eResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!("{} failed on attempt {}/{}: {}", what, attempt, attempts, e);
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Poll a condition until it holds or a deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    /// Returns the first `Some` produced by `attempt`
    pub async fn poll_until<T, F, Fut>(&self, what: &str, mut attempt: F) -> E2eResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = E2eResult<Option<T>>>,
    {
        let give_up = Instant::now() + self.deadline;
        let mut polls = 0u32;
        loop {
            polls += 1;
            if let Some(value) = attempt().await? {
                debug!("{} settled after {} poll(s)", what, polls);
                return Ok(value);
            }
            if Instant::now() + self.interval > give_up {
                return Err(E2eError::Timeout(format!(
                    "{} after {:?}",
                    what, self.deadline
                )));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
