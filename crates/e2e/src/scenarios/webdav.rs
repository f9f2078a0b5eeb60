//! WebDAV logins against the hub's `/webdav` collection

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::fixtures::{Finalizer, Outcome, SharedResources};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::REGISTERED_ROLE;
use crate::webdav::WebdavClient;

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(WebdavLogin {
            name: "test_valid_user_valid_password_login",
            login: Login::Valid,
        }),
        Box::new(WebdavLogin {
            name: "test_invalid_user_login",
            login: Login::UnknownUser,
        }),
        Box::new(WebdavLogin {
            name: "test_valid_user_invalid_password_login",
            login: Login::BadPassword,
        }),
    ]
}

/// Waits out fail2ban after refused logins
///
/// A run of refused logins gets the test machine banned; the next
/// scenario has to wait for the ban to lift.
pub struct Fail2banCooldown {
    delay: Duration,
    always: bool,
}

impl Fail2banCooldown {
    /// Sleep after the test whatever its outcome
    pub fn always(delay: Duration) -> Self {
        Self { delay, always: true }
    }

    /// Sleep only when the test failed
    pub fn on_failure(delay: Duration) -> Self {
        Self {
            delay,
            always: false,
        }
    }

    fn needed(&self, outcome: &Outcome) -> bool {
        !self.delay.is_zero() && (self.always || outcome.failed())
    }
}

#[async_trait]
impl Finalizer for Fail2banCooldown {
    fn name(&self) -> String {
        "fail2ban_cooldown".to_string()
    }

    async fn finalize(&self, outcome: &Outcome) -> E2eResult<()> {
        if self.needed(outcome) {
            info!("Waiting {:?} for fail2ban to forget this host", self.delay);
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Login {
    Valid,
    UnknownUser,
    BadPassword,
}

pub struct WebdavLogin {
    name: &'static str,
    login: Login,
}

impl WebdavLogin {
    fn client(hub: &SharedResources) -> E2eResult<WebdavClient> {
        let host = hub.testdata.find_url_for("webdav")?;
        WebdavClient::for_host(&host.to_string())
    }
}

#[async_trait]
impl Scenario for WebdavLogin {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        "TestContainerWebdav"
    }

    fn tags(&self) -> &[&str] {
        &["container", "webdav"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let cooldown = ctx.hub().settings.fail2ban_cooldown();
        ctx.add_finalizer(match self.login {
            Login::Valid => Fail2banCooldown::on_failure(cooldown),
            _ => Fail2banCooldown::always(cooldown),
        });

        let hub = ctx.hub();
        let (username, password) = hub.account_for(REGISTERED_ROLE)?;
        let client = Self::client(hub)?;

        match self.login {
            Login::Valid => client.validate(&username, &password).await.map_err(|e| {
                E2eError::AssertionFailed(format!(
                    "webdav login to {} as {} failed: {}",
                    client.url(),
                    username,
                    e
                ))
            }),
            Login::UnknownUser => match client.validate("invaliduser", "invalidpass").await {
                Ok(()) => Err(E2eError::AssertionFailed(format!(
                    "{} accepted an unknown user",
                    client.url()
                ))),
                Err(E2eError::Unauthorized(_)) | Err(E2eError::Webdav { .. }) => Ok(()),
                Err(e) => Err(e),
            },
            Login::BadPassword => match client.validate(&username, "invalidpass").await {
                Ok(()) => Err(E2eError::AssertionFailed(format!(
                    "{} accepted {} with a wrong password",
                    client.url(),
                    username
                ))),
                Err(E2eError::Unauthorized(_)) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(true, Outcome::Passed, true ; "always after pass")]
    #[test_case(false, Outcome::Passed, false ; "on failure after pass")]
    #[test_case(false, Outcome::Failed("refused".into()), true ; "on failure after failure")]
    fn test_cooldown_needed(always: bool, outcome: Outcome, expected: bool) {
        let cooldown = Fail2banCooldown {
            delay: Duration::from_secs(600),
            always,
        };
        assert_eq!(cooldown.needed(&outcome), expected);
    }

    #[test]
    fn test_zero_cooldown_never_sleeps() {
        assert!(!Fail2banCooldown::always(Duration::ZERO).needed(&Outcome::Passed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_sleeps_for_the_delay() {
        let start = tokio::time::Instant::now();
        Fail2banCooldown::always(Duration::from_secs(900))
            .finalize(&Outcome::Passed)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(900));
    }
}
