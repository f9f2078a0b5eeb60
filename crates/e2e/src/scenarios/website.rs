//! Login, logout and header checks on the website

use async_trait::async_trait;
use tracing::info;

use crate::actions::account;
use crate::browser::get_checked;
use crate::catalog::{GenericPage, TagsBrowsePage};
use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};
use crate::scenarios::REGISTERED_ROLE;

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(LoginRoundTrip),
        Box::new(HttpsToHttpKeepsLogin),
        Box::new(EveryAccountLogsIn),
        Box::new(NeedHelpKeepsPage),
        Box::new(TagsPaginationCounts),
    ]
}

/// Log in, see the logout link, log out, see it gone
pub struct LoginRoundTrip;

#[async_trait]
impl Scenario for LoginRoundTrip {
    fn name(&self) -> &str {
        "test_hub_login_logout"
    }

    fn class(&self) -> &str {
        "TestHubLogin"
    }

    fn tags(&self) -> &[&str] {
        &["website", "login", "logout"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let (username, password) = hub.account_for(REGISTERED_ROLE)?;
        hub.browser.get(&hub.urls.https_authority).await?;

        account::login_as(&hub.catalog, &username, &password).await?;
        let header = hub.catalog.load::<GenericPage>(());
        E2eError::check(header.is_logged_in().await?, || "Login Failed".to_string())?;

        header.goto_logout().await?;
        E2eError::check(!header.is_logged_in().await?, || "Logout Failed".to_string())
    }
}

/// Visiting an http page after logging in over https keeps the login
pub struct HttpsToHttpKeepsLogin;

#[async_trait]
impl Scenario for HttpsToHttpKeepsLogin {
    fn name(&self) -> &str {
        "test_https_to_http_logout"
    }

    fn class(&self) -> &str {
        "TestHubLogin"
    }

    fn tags(&self) -> &[&str] {
        &["website", "login"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let (username, password) = hub.account_for(REGISTERED_ROLE)?;
        hub.browser.get(&hub.urls.https_authority).await?;

        account::login_as(&hub.catalog, &username, &password).await?;
        let header = hub.catalog.load::<GenericPage>(());
        E2eError::check(header.is_logged_in().await?, || "Login Failed".to_string())?;

        hub.browser.get(&hub.urls.http_authority).await?;
        let still_in = header.is_logged_in().await?;
        account::logout(&hub.catalog).await?;
        E2eError::check(still_in, || {
            format!("requesting {} logged the user out", hub.urls.http_authority)
        })
    }
}

/// Every account in the test data can log in
pub struct EveryAccountLogsIn;

#[async_trait]
impl Scenario for EveryAccountLogsIn {
    fn name(&self) -> &str {
        "test_accounts_can_login"
    }

    fn class(&self) -> &str {
        "TestAccountSetup"
    }

    fn tags(&self) -> &[&str] {
        &["website", "login", "accounts"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let mut failures = Vec::new();

        for username in hub.testdata.get_usernames() {
            let user = hub.testdata.get_userdata_for(username)?;
            hub.browser.get(&hub.urls.https_authority).await?;
            match account::login_as(&hub.catalog, &user.username, &user.password).await {
                Ok(()) => {
                    if account::is_logged_in(&hub.catalog).await? {
                        info!("{} logged in", username);
                    } else {
                        failures.push(format!("{}: no logout link after login", username));
                    }
                }
                Err(e) => failures.push(format!("{}: {}", username, e)),
            }
            account::logout(&hub.catalog).await?;
        }

        E2eError::check(failures.is_empty(), || failures.join("\n"))
    }
}

/// The "Need Help?" link opens a widget, not a new page
pub struct NeedHelpKeepsPage;

#[async_trait]
impl Scenario for NeedHelpKeepsPage {
    fn name(&self) -> &str {
        "test_link_changes_webpage"
    }

    fn class(&self) -> &str {
        "TestNeedHelp"
    }

    fn tags(&self) -> &[&str] {
        &["website", "need_help"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        get_checked(hub.browser.as_ref(), &hub.urls.https_authority).await?;

        let page = hub.catalog.load::<GenericPage>(());
        let start_url = hub.browser.current_url().await?;
        page.toggle_need_help().await?;
        let end_url = hub.browser.current_url().await?;
        page.toggle_need_help().await?;

        E2eError::check(start_url == end_url, || {
            format!(
                "clicking the 'Need Help?' link changed the web page from {} to {}",
                start_url, end_url
            )
        })
    }
}

/// The tag browser's pagination footer is self-consistent
pub struct TagsPaginationCounts;

#[async_trait]
impl Scenario for TagsPaginationCounts {
    fn name(&self) -> &str {
        "test_pagination_counts"
    }

    fn class(&self) -> &str {
        "TestTagsBrowse"
    }

    fn tags(&self) -> &[&str] {
        &["website", "tags"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let page = hub.catalog.goto::<TagsBrowsePage>(()).await?;
        let counts = page
            .counts()
            .await?
            .ok_or_else(|| E2eError::AssertionFailed("no pagination counts on /tags".to_string()))?;

        E2eError::check(counts.start <= counts.end, || {
            format!("start {} > end {}", counts.start, counts.end)
        })?;
        E2eError::check(counts.end <= counts.total, || {
            format!("end {} > total {}", counts.end, counts.total)
        })?;

        let shown = page.tags().await?.len() as u64;
        let expected = if counts.total == 0 { 0 } else { counts.end - counts.start + 1 };
        E2eError::check(shown == expected, || {
            format!("footer says {} tags are shown, page lists {}", expected, shown)
        })
    }
}
