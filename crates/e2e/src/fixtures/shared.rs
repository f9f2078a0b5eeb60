//! Run-wide and class-wide resources

use std::path::PathBuf;
use std::sync::Arc;

use hubcheck_common::rappture;
use hubcheck_common::{HubUrls, Testdata};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::browser::{Browser, PlaywrightBrowser};
use crate::catalog::{Catalog, Locators};
use crate::config::Settings;
use crate::error::{E2eError, E2eResult};
use crate::shell::{ContainerManager, SshTransport, Transport};

/// Builds the run's browser; called at most once per [`SharedScope`]
pub type BrowserFactory = Box<dyn Fn(&Settings) -> E2eResult<Arc<dyn Browser>> + Send + Sync>;

/// Everything a scenario shares with the rest of the run
pub struct SharedResources {
    pub settings: Settings,
    pub testdata: Arc<Testdata>,
    pub locators: Locators,
    pub urls: HubUrls,
    pub browser: Arc<dyn Browser>,
    pub catalog: Catalog,
    pub containers: ContainerManager,
}

impl SharedResources {
    /// Host that serves both the website and container shells
    pub fn hub_host(&self) -> &str {
        &self.urls.https_uri
    }

    /// Account for a role; a missing role is a setup failure
    pub fn account_for(&self, role: &str) -> E2eResult<(String, String)> {
        let (username, password) = self.testdata.find_account_for(role)?;
        Ok((username.to_string(), password.to_string()))
    }
}

/// Owner of the run-wide resources
///
/// The browser, the test data and the container book are built on the
/// first call to [`SharedScope::provision_shared_resources`]; later calls
/// hand out the same instance.
pub struct SharedScope {
    settings: Settings,
    testdata: Arc<Testdata>,
    transport: Arc<dyn Transport>,
    browser_factory: BrowserFactory,
    resources: OnceCell<Arc<SharedResources>>,
}

impl SharedScope {
    pub fn new(
        settings: Settings,
        testdata: Testdata,
        transport: Arc<dyn Transport>,
        browser_factory: BrowserFactory,
    ) -> Self {
        Self {
            settings,
            testdata: Arc::new(testdata),
            transport,
            browser_factory,
            resources: OnceCell::new(),
        }
    }

    /// Live scope: test data from the settings, ssh shells, Playwright
    pub fn from_settings(settings: Settings) -> E2eResult<Self> {
        let path = settings
            .testdata
            .clone()
            .ok_or_else(|| E2eError::Setup("no test data file configured".to_string()))?;
        let password = settings.testdata_password();
        let testdata = Testdata::load(&path, password.as_deref())?;
        info!("Loaded test data from {}", path.display());

        let transport: Arc<dyn Transport> = Arc::new(SshTransport::new(settings.ssh.clone()));
        let factory: BrowserFactory = Box::new(|settings: &Settings| {
            PlaywrightBrowser::check_playwright_installed()?;
            let browser: Arc<dyn Browser> = Arc::new(PlaywrightBrowser::new(&settings.browser)?);
            Ok(browser)
        });
        Ok(Self::new(settings, testdata, transport, factory))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn testdata(&self) -> &Arc<Testdata> {
        &self.testdata
    }

    /// The run's shared resources, built on first use
    pub async fn provision_shared_resources(&self) -> E2eResult<Arc<SharedResources>> {
        let resources = self
            .resources
            .get_or_try_init(|| async { self.build().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(resources))
    }

    /// Whether the resources have been built yet
    pub fn is_provisioned(&self) -> bool {
        self.resources.initialized()
    }

    async fn build(&self) -> E2eResult<SharedResources> {
        debug!("Provisioning shared resources");
        let urls = HubUrls::from_testdata(&self.testdata)?;
        let locators = Locators::from_table(self.testdata.get_locators());
        let browser = (self.browser_factory)(&self.settings)?;
        let catalog = Catalog::new(Arc::clone(&browser), locators.clone(), urls.clone());
        let containers = ContainerManager::new(
            Arc::clone(&self.transport),
            self.settings.command_timeout(),
            self.settings.session_poll(),
        );
        info!("Shared resources ready for {}", urls.https_authority);

        Ok(SharedResources {
            settings: self.settings.clone(),
            testdata: Arc::clone(&self.testdata),
            locators,
            urls,
            browser,
            catalog,
            containers,
        })
    }

    /// Close the browser if it was ever started
    pub async fn close(&self) -> E2eResult<()> {
        if let Some(resources) = self.resources.get() {
            resources.browser.close().await?;
        }
        Ok(())
    }
}

/// Per-class settings shared by the scenarios of one class
#[derive(Debug, Clone)]
pub struct ClassScope {
    class: String,
    screenshot_dir: PathBuf,
    video_dir: Option<PathBuf>,
    rappture_env: String,
}

impl ClassScope {
    pub fn new(class: impl Into<String>, settings: &Settings, rappture_version: Option<&str>) -> Self {
        let rappture_env = rappture_version
            .map(rappture::rappture_environment)
            .unwrap_or_else(|| rappture::DEFAULT_RAPPTURE.to_string());
        Self {
            class: class.into(),
            screenshot_dir: settings.screenshot_dir.clone(),
            video_dir: settings.browser.video_dir.clone(),
            rappture_env,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Failure screenshots are keyed by class name
    pub fn screenshot_path(&self) -> PathBuf {
        self.screenshot_dir.join(format!("{}.png", self.class))
    }

    /// Where a failing test's recording goes; `None` when video is off
    pub fn video_path(&self) -> Option<PathBuf> {
        self.video_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.webm", self.class)))
    }

    /// Environment name passed to `use` inside containers
    pub fn rappture_env(&self) -> &str {
        &self.rappture_env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_path_uses_class_name() {
        let settings = Settings {
            screenshot_dir: PathBuf::from("/tmp/shots"),
            ..Settings::default()
        };
        let scope = ClassScope::new("TestContainerEnv", &settings, None);
        assert_eq!(scope.screenshot_path(), PathBuf::from("/tmp/shots/TestContainerEnv.png"));
        assert_eq!(scope.rappture_env(), "rappture");
        assert_eq!(scope.video_path(), None);
    }

    #[test]
    fn test_video_path_uses_class_name() {
        let mut settings = Settings::default();
        settings.browser.video_dir = Some(PathBuf::from("/tmp/videos"));
        let scope = ClassScope::new("TestLogin", &settings, None);
        assert_eq!(scope.video_path(), Some(PathBuf::from("/tmp/videos/TestLogin.webm")));
    }

    #[test]
    fn test_rappture_option_selects_environment() {
        let settings = Settings::default();
        assert_eq!(ClassScope::new("c", &settings, Some("dev")).rappture_env(), "rappture-dev");
        assert_eq!(ClassScope::new("c", &settings, Some("bogus")).rappture_env(), "rappture");
    }
}
