//! Scoped window switching

use tracing::{debug, warn};

use crate::browser::Browser;
use crate::error::E2eResult;

/// Switches back to the window that was current when the guard was made
///
/// Any check done in a popup can fail; the browser still ends up on the
/// original window.
pub struct WindowGuard<'a> {
    browser: &'a dyn Browser,
    original: String,
}

impl<'a> WindowGuard<'a> {
    pub fn new(browser: &'a dyn Browser) -> E2eResult<Self> {
        let original = browser.current_window()?;
        Ok(Self { browser, original })
    }

    /// Switch to `handle`, coming back when the guard drops
    pub fn switch_to(browser: &'a dyn Browser, handle: &str) -> E2eResult<Self> {
        let guard = Self::new(browser)?;
        browser.switch_to_window(handle)?;
        Ok(guard)
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Close the current window, which must not be the original, and go back
    pub async fn close_current(self) -> E2eResult<()> {
        if self.browser.current_window()? != self.original {
            self.browser.close_window().await?;
        }
        Ok(())
    }
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        debug!("Returning to window {}", self.original);
        if let Err(e) = self.browser.switch_to_window(&self.original) {
            warn!("Could not return to window {}: {}", self.original, e);
        }
    }
}
