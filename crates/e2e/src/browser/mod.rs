//! Browser automation with page-load capture

pub mod har;
pub mod playwright;
pub mod windows;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{E2eError, E2eResult};

pub use har::{error_loading_page, Har, HarEntry};
pub use playwright::PlaywrightBrowser;
pub use windows::WindowGuard;

/// Value entered into one form control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Check(bool),
    Select(String),
    /// A local file for an upload control
    File(PathBuf),
}

/// A form control and what to put in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub selector: String,
    pub value: FieldValue,
}

impl FormField {
    pub fn text(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            value: FieldValue::Text(value.into()),
        }
    }

    pub fn check(selector: impl Into<String>, checked: bool) -> Self {
        Self {
            selector: selector.into(),
            value: FieldValue::Check(checked),
        }
    }

    pub fn select(selector: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            value: FieldValue::Select(option.into()),
        }
    }

    pub fn file(selector: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            selector: selector.into(),
            value: FieldValue::File(path.into()),
        }
    }
}

/// A browser with cookies, windows and an optional page-load capture
///
/// Window bookkeeping is local state and so is synchronous; everything that
/// touches a page is async.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn get(&self, url: &str) -> E2eResult<()>;

    async fn current_url(&self) -> E2eResult<String>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    /// Fill the fields and press `submit` in one go
    async fn submit_form(&self, fields: &[FormField], submit: &str) -> E2eResult<()>;

    async fn is_displayed(&self, selector: &str) -> E2eResult<bool>;

    async fn wait_for(&self, selector: &str) -> E2eResult<()>;

    async fn text_of(&self, selector: &str) -> E2eResult<String>;

    async fn texts_of(&self, selector: &str) -> E2eResult<Vec<String>>;

    async fn value_of(&self, selector: &str) -> E2eResult<String>;

    /// Start a fresh page-load capture named `name`
    async fn new_har(&self, name: &str) -> E2eResult<()>;

    /// Page-load entry for `url`, or for the first document captured
    async fn page_load_details(&self, url: Option<&str>) -> E2eResult<Option<HarEntry>>;

    fn window_handles(&self) -> Vec<String>;

    fn current_window(&self) -> E2eResult<String>;

    fn switch_to_window(&self, handle: &str) -> E2eResult<()>;

    /// Click something that opens a popup; returns the popup's handle
    /// without switching to it
    async fn click_opening_window(&self, selector: &str) -> E2eResult<String>;

    async fn close_window(&self) -> E2eResult<()>;

    async fn take_screenshot(&self, path: &Path) -> E2eResult<()>;

    /// Keep the current window's recording at `path`
    ///
    /// The window is left on a blank page with a new recording.
    async fn save_video(&self, path: &Path) -> E2eResult<()>;

    async fn close(&self) -> E2eResult<()>;
}

/// Load `url` under a fresh capture and fail when the load failed
pub async fn get_checked(browser: &dyn Browser, url: &str) -> E2eResult<HarEntry> {
    browser.new_har("page").await?;
    browser.get(url).await?;
    let entry = browser.page_load_details(None).await?.ok_or_else(|| {
        E2eError::Browser(format!("no page load captured for {}", url))
    })?;
    if error_loading_page(&entry) {
        return Err(navigation_error(url, &entry));
    }
    Ok(entry)
}

pub fn navigation_error(url: &str, entry: &HarEntry) -> E2eError {
    E2eError::Navigation {
        url: url.to_string(),
        status: entry.status(),
        har: serde_json::to_string_pretty(entry).unwrap_or_default(),
    }
}
