//! Page objects keyed by a typed page identifier
//!
//! A page object is bound fresh for every use to the shared browser, the
//! locator table and the hub urls, plus whatever identifies the page (a
//! tool name, a session number). Selectors come from built-in defaults and
//! can be overridden per page and element from the test data `locators`.

pub mod pages;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hubcheck_common::testdata::LocatorTable;
use hubcheck_common::HubUrls;

use crate::browser::{self, Browser, HarEntry};
use crate::error::{E2eError, E2eResult};

pub use pages::*;

/// Every page the scenarios know how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageId {
    Generic,
    Login,
    MembersDashboard,
    ToolSession,
    ToolStatusAdmin,
    ApproveConfirmVersion,
    ApproveConfirmLicense,
    ApproveConfirmToolInfo,
    ToolRegister,
    TagsBrowse,
    FilexferImportfile,
    FilexferExportfile,
}

impl PageId {
    pub const ALL: [PageId; 12] = [
        PageId::Generic,
        PageId::Login,
        PageId::MembersDashboard,
        PageId::ToolSession,
        PageId::ToolStatusAdmin,
        PageId::ApproveConfirmVersion,
        PageId::ApproveConfirmLicense,
        PageId::ApproveConfirmToolInfo,
        PageId::ToolRegister,
        PageId::TagsBrowse,
        PageId::FilexferImportfile,
        PageId::FilexferExportfile,
    ];

    /// Key used in the test data locator table
    pub fn name(&self) -> &'static str {
        match self {
            PageId::Generic => "GenericPage",
            PageId::Login => "LoginPage",
            PageId::MembersDashboard => "MembersDashboardPage",
            PageId::ToolSession => "ToolSessionPage",
            PageId::ToolStatusAdmin => "ToolStatusAdminPage",
            PageId::ApproveConfirmVersion => "ApproveConfirmVersionPage",
            PageId::ApproveConfirmLicense => "ApproveConfirmLicensePage",
            PageId::ApproveConfirmToolInfo => "ApproveConfirmToolInfoPage",
            PageId::ToolRegister => "ToolRegisterPage",
            PageId::TagsBrowse => "TagsBrowsePage",
            PageId::FilexferImportfile => "FilexferImportfilePage",
            PageId::FilexferExportfile => "FilexferExportfilePage",
        }
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            PageId::Generic => &[
                ("login", "a[href$='/login']"),
                ("register", "a[href$='/register']"),
                ("logout", "a[href$='/logout']"),
                ("body", "body"),
                ("account", "#account-info"),
                ("needhelp", "a#tab"),
                ("errorbox", "#system-message .error, p.error"),
                ("invokeerror", "dd.error"),
            ],
            PageId::Login => &[
                ("username", "#username"),
                ("password", "#password"),
                ("submit", "#login-submit"),
                ("error", "#login-error, .error"),
            ],
            PageId::MembersDashboard => &[
                ("sessions", "#mysessions .session-title"),
                ("storage", "#mystorage .storage-used"),
            ],
            PageId::ToolSession => &[
                ("app", "#theapp"),
                ("terminate", "#app-btn-terminate"),
                ("popout", "#app-btn-popout"),
                ("confirm", ".confirm-yes"),
                ("title", "#session-title"),
            ],
            PageId::ToolStatusAdmin => &[
                ("state", "#tool-status .state"),
                ("status", "select#status"),
                ("submit", "#status-submit"),
                ("message", "#tool-status .message"),
            ],
            PageId::ApproveConfirmVersion => &[
                ("version", "#versionForm input[name='newversion']"),
                ("submit", "#versionForm input[type='submit']"),
            ],
            PageId::ApproveConfirmLicense => &[
                ("sourceaccess", "select[name='t_code']"),
                ("templates", "select#templates"),
                ("licensetext", "textarea#license"),
                ("authorize", "input#field-authorize"),
                ("submit", "#licenseForm input[type='submit']"),
            ],
            PageId::ApproveConfirmToolInfo => &[
                ("approve", "#approveForm input[type='submit']"),
                ("title", "#approveForm .tool-title"),
            ],
            PageId::ToolRegister => &[
                ("toolname", "#t_toolname"),
                ("title", "#t_title"),
                ("version", "#t_version"),
                ("description", "#t_description"),
                ("vncgeometry", "#vncGeometry"),
                ("team", "#t_team"),
                ("submit", "#toolform input[type='submit']"),
            ],
            PageId::TagsBrowse => &[
                ("search", "#actags"),
                ("searchbutton", "#tagsearch input[type='submit']"),
                ("tags", "#taglist .tag a"),
                ("counts", ".list-footer .counter"),
            ],
            PageId::FilexferImportfile => &[
                ("text", "textarea[name='text']"),
                ("file", "input[type='file']"),
                ("submit", "input[type='submit']"),
            ],
            PageId::FilexferExportfile => &[("content", "pre")],
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Page name -> element -> selector, with built-in defaults
#[derive(Debug, Clone)]
pub struct Locators {
    table: BTreeMap<PageId, BTreeMap<String, String>>,
}

impl Default for Locators {
    fn default() -> Self {
        let table = PageId::ALL
            .iter()
            .map(|page| {
                let elements = page
                    .defaults()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                (*page, elements)
            })
            .collect();
        Self { table }
    }
}

impl Locators {
    /// Defaults overlaid with the test data table; unknown pages are ignored
    pub fn from_table(overrides: &LocatorTable) -> Self {
        let mut locators = Self::default();
        for page in PageId::ALL {
            if let Some(elements) = overrides.get(page.name()) {
                let entry = locators.table.entry(page).or_default();
                for (element, selector) in elements {
                    entry.insert(element.clone(), selector.clone());
                }
            }
        }
        locators
    }

    pub fn get(&self, page: PageId, element: &str) -> E2eResult<&str> {
        self.table
            .get(&page)
            .and_then(|e| e.get(element))
            .map(String::as_str)
            .ok_or_else(|| E2eError::Setup(format!("no locator for {}.{}", page, element)))
    }
}

/// What every page object is bound to
#[derive(Clone)]
pub struct PageContext {
    pub browser: Arc<dyn Browser>,
    pub locators: Arc<Locators>,
    pub urls: Arc<HubUrls>,
}

impl PageContext {
    pub fn locator(&self, page: PageId, element: &str) -> E2eResult<&str> {
        self.locators.get(page, element)
    }

    pub fn https_url(&self, path: &str) -> String {
        format!("{}{}", self.urls.https_authority, path)
    }
}

/// A page the scenarios drive
pub trait PageObject: Sized {
    const ID: PageId;

    /// What identifies one instance of the page
    type Params;

    fn bind(ctx: PageContext, params: Self::Params) -> Self;

    fn context(&self) -> &PageContext;

    /// Path below the https authority, for pages that can be loaded directly
    fn path(&self) -> Option<String> {
        None
    }

    fn locator(&self, element: &str) -> E2eResult<&str> {
        self.context().locator(Self::ID, element)
    }

    fn browser(&self) -> &dyn Browser {
        self.context().browser.as_ref()
    }
}

/// Load the page's url, failing with a navigation error when it did not load
pub async fn goto_page<P: PageObject>(page: &P) -> E2eResult<HarEntry> {
    let path = page
        .path()
        .ok_or_else(|| E2eError::Setup(format!("{} has no url of its own", P::ID)))?;
    let url = page.context().https_url(&path);
    browser::get_checked(page.browser(), &url).await
}

/// Binds page objects
#[derive(Clone)]
pub struct Catalog {
    ctx: PageContext,
}

impl Catalog {
    pub fn new(browser: Arc<dyn Browser>, locators: Locators, urls: HubUrls) -> Self {
        Self {
            ctx: PageContext {
                browser,
                locators: Arc::new(locators),
                urls: Arc::new(urls),
            },
        }
    }

    pub fn context(&self) -> &PageContext {
        &self.ctx
    }

    pub fn browser(&self) -> &dyn Browser {
        self.ctx.browser.as_ref()
    }

    pub fn urls(&self) -> &HubUrls {
        &self.ctx.urls
    }

    pub fn load<P: PageObject>(&self, params: P::Params) -> P {
        P::bind(self.ctx.clone(), params)
    }

    /// Bind a page and load its url
    pub async fn goto<P: PageObject>(&self, params: P::Params) -> E2eResult<P> {
        let page = self.load::<P>(params);
        goto_page(&page).await?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_page_has_defaults() {
        let locators = Locators::default();
        for page in PageId::ALL {
            assert!(!page.defaults().is_empty(), "{} has no locators", page);
        }
        assert_eq!(locators.get(PageId::Login, "username").unwrap(), "#username");
    }

    #[test]
    fn test_overrides_replace_single_elements() {
        let mut table = LocatorTable::new();
        table.insert(
            "GenericPage".to_string(),
            BTreeMap::from([("logout".to_string(), "a#logout".to_string())]),
        );
        table.insert(
            "NotAPage".to_string(),
            BTreeMap::from([("x".to_string(), "y".to_string())]),
        );

        let locators = Locators::from_table(&table);
        assert_eq!(locators.get(PageId::Generic, "logout").unwrap(), "a#logout");
        assert_eq!(locators.get(PageId::Generic, "login").unwrap(), "a[href$='/login']");
        assert!(locators.get(PageId::Generic, "x").is_err());
    }
}
