//! The hub answers on http and https and sends logins over https

use async_trait::async_trait;

use crate::browser::{error_loading_page, Browser};
use crate::catalog::GenericPage;
use crate::error::{E2eError, E2eResult};
use crate::runner::{Scenario, TestContext};

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    let mut scenarios: Vec<Box<dyn Scenario>> = vec![Box::new(UriLoads::new(false))];
    for link in ["login", "register"] {
        scenarios.push(Box::new(HttpLinkGoesHttps::new(link)));
    }
    for page in ["login", "register", "administrator"] {
        scenarios.push(Box::new(HttpUrlGoesHttps::new(page)));
    }
    scenarios.push(Box::new(UriLoads::new(true)));
    scenarios.push(Box::new(WebdavTipsFilledIn));
    scenarios
}

const HTTP_CLASS: &str = "TestWebsiteRedirectsHttp";
const HTTPS_CLASS: &str = "TestWebsiteRedirectsHttps";

async fn is_https(browser: &dyn Browser) -> E2eResult<(bool, String)> {
    let current = browser.current_url().await?;
    let secure = url::Url::parse(&current).map_or(false, |u| u.scheme() == "https");
    Ok((secure, current))
}

/// The bare http or https authority loads a page
pub struct UriLoads {
    secure: bool,
    name: &'static str,
}

impl UriLoads {
    fn new(secure: bool) -> Self {
        let name = if secure {
            "test_connect_to_https_uri"
        } else {
            "test_connect_to_http_uri"
        };
        Self { secure, name }
    }
}

#[async_trait]
impl Scenario for UriLoads {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        if self.secure {
            HTTPS_CLASS
        } else {
            HTTP_CLASS
        }
    }

    fn tags(&self) -> &[&str] {
        &["website", "redirects"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let authority = if self.secure {
            &hub.urls.https_authority
        } else {
            &hub.urls.http_authority
        };

        hub.browser.new_har("page").await?;
        hub.browser.get(authority).await?;
        let entry = hub.browser.page_load_details(Some(authority)).await?.ok_or_else(|| {
            E2eError::AssertionFailed(format!(
                "failed to load the uri {}: no page-load record",
                authority
            ))
        })?;
        E2eError::check(!error_loading_page(&entry), || {
            format!(
                "failed to load uri {}, response follows:\n{}",
                authority,
                serde_json::to_string_pretty(&entry).unwrap_or_default()
            )
        })
    }
}

/// Clicking a header link on the http site lands on https
pub struct HttpLinkGoesHttps {
    link: &'static str,
    name: String,
}

impl HttpLinkGoesHttps {
    fn new(link: &'static str) -> Self {
        Self {
            link,
            name: format!("test_http_link_redirects_to_https[{}]", link),
        }
    }
}

#[async_trait]
impl Scenario for HttpLinkGoesHttps {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        HTTP_CLASS
    }

    fn tags(&self) -> &[&str] {
        &["website", "redirects"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        hub.browser.get(&hub.urls.http_authority).await?;

        let header = hub.catalog.load::<GenericPage>(());
        if !header.has_link(self.link).await? {
            return Err(E2eError::Skipped(format!("no {} link available", self.link)));
        }
        match self.link {
            "register" => header.goto_register().await?,
            _ => header.goto_login().await?,
        }

        let (secure, current) = is_https(hub.browser.as_ref()).await?;
        E2eError::check(secure, || {
            format!(
                "after loading {} and clicking the {} link, landed on {}",
                hub.urls.http_authority, self.link, current
            )
        })
    }
}

/// Requesting a page over http redirects to https
pub struct HttpUrlGoesHttps {
    page: &'static str,
    name: String,
}

impl HttpUrlGoesHttps {
    fn new(page: &'static str) -> Self {
        Self {
            page,
            name: format!("test_http_url_redirects_to_https[{}]", page),
        }
    }
}

#[async_trait]
impl Scenario for HttpUrlGoesHttps {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        HTTP_CLASS
    }

    fn tags(&self) -> &[&str] {
        &["website", "redirects"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let url = format!("{}/{}", hub.urls.http_authority, self.page);
        hub.browser.get(&url).await?;

        let (secure, current) = is_https(hub.browser.as_ref()).await?;
        E2eError::check(secure, || format!("after loading {}, landed on {}", url, current))
    }
}

/// The webdav tips page has the hub's address filled in
pub struct WebdavTipsFilledIn;

#[async_trait]
impl Scenario for WebdavTipsFilledIn {
    fn name(&self) -> &str {
        "test_kb_tips_webdav_has_text_HUBADDRESS"
    }

    fn class(&self) -> &str {
        HTTPS_CLASS
    }

    fn tags(&self) -> &[&str] {
        &["website", "redirects", "webdav"]
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let hub = ctx.hub();
        let url = format!("{}/kb/tips/webdav", hub.urls.https_authority);
        crate::browser::get_checked(hub.browser.as_ref(), &url).await?;

        let text = hub.catalog.load::<GenericPage>(()).text().await?;
        E2eError::check(!text.contains("HUBADDRESS"), || {
            format!("the page {} contains the word HUBADDRESS", url)
        })
    }
}
