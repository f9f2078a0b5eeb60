//! Driving a tool through the contribution pipeline
//!
//! Tests that need a tool in a given state ask [`ToolStateManager`] for it
//! before they run, and register a [`FinalizeToolState`] to put the tool
//! back afterwards. Tool state is hub-wide, so two runs against the same
//! tool name race; nothing here serializes them.

use std::sync::Arc;

use async_trait::async_trait;
use hubcheck_common::tool::next_approval_version;
use hubcheck_common::{LicenseTerms, Testdata, ToolData, ToolState};
use tracing::{info, warn};

use crate::actions::{account, contribtool};
use crate::catalog::{
    ApproveConfirmLicensePage, ApproveConfirmToolInfoPage, ApproveConfirmVersionPage, Catalog,
};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::finalizer::{Finalizer, Outcome};
use crate::retry::RetryPolicy;

/// The administrative operations the pipeline needs
#[async_trait]
pub trait ToolAdmin: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> E2eResult<()>;

    async fn logout(&self) -> E2eResult<()>;

    /// Current state of the tool; `E2eError::Navigation` when the hub does
    /// not know it
    async fn tool_state(&self, toolname: &str) -> E2eResult<ToolState>;

    async fn register(&self, toolname: &str, data: &ToolData) -> E2eResult<()>;

    /// Submit the status form naming `state`
    async fn submit_state(&self, toolname: &str, state: ToolState) -> E2eResult<()>;

    /// Version shown on the approval version form
    async fn approval_version(&self) -> E2eResult<String>;

    async fn confirm_version(&self, version: &str) -> E2eResult<()>;

    async fn confirm_license(&self, terms: &LicenseTerms) -> E2eResult<()>;

    async fn confirm_tool_info(&self) -> E2eResult<()>;
}

/// Follow-up forms a transition needs after the status form
#[async_trait]
pub trait StateConfirmation: Send + Sync {
    async fn confirm(&self, admin: &dyn ToolAdmin, toolname: &str) -> E2eResult<()>;
}

/// Version, license and tool-info confirmations of the Approved edge
#[derive(Debug, Clone, Default)]
pub struct ApprovalConfirmation {
    pub license: LicenseTerms,
}

#[async_trait]
impl StateConfirmation for ApprovalConfirmation {
    async fn confirm(&self, admin: &dyn ToolAdmin, toolname: &str) -> E2eResult<()> {
        let current = admin.approval_version().await?;
        let version = next_approval_version(&current, chrono::Utc::now().timestamp().max(0) as u64);
        info!("Approving {} as version {}", toolname, version);

        admin.confirm_version(&version).await?;
        admin.confirm_license(&self.license).await?;
        admin.confirm_tool_info().await
    }
}

/// [`ToolAdmin`] through the hub's web pages
pub struct WebToolAdmin {
    catalog: Catalog,
}

impl WebToolAdmin {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolAdmin for WebToolAdmin {
    async fn login(&self, username: &str, password: &str) -> E2eResult<()> {
        account::login_as(&self.catalog, username, password).await
    }

    async fn logout(&self) -> E2eResult<()> {
        account::logout(&self.catalog).await
    }

    async fn tool_state(&self, toolname: &str) -> E2eResult<ToolState> {
        let page =
            contribtool::goto_tool_status_page(&self.catalog, toolname, ToolState::Registered)
                .await?;
        page.get_tool_state().await
    }

    async fn register(&self, toolname: &str, data: &ToolData) -> E2eResult<()> {
        contribtool::register(&self.catalog, toolname, data).await
    }

    async fn submit_state(&self, toolname: &str, state: ToolState) -> E2eResult<()> {
        let page = contribtool::goto_tool_status_page(&self.catalog, toolname, state).await?;
        page.submit_state().await
    }

    async fn approval_version(&self) -> E2eResult<String> {
        self.catalog
            .load::<ApproveConfirmVersionPage>(())
            .version()
            .await
    }

    async fn confirm_version(&self, version: &str) -> E2eResult<()> {
        self.catalog
            .load::<ApproveConfirmVersionPage>(())
            .submit_version(version)
            .await
    }

    async fn confirm_license(&self, terms: &LicenseTerms) -> E2eResult<()> {
        self.catalog
            .load::<ApproveConfirmLicensePage>(())
            .submit_license(terms)
            .await
    }

    async fn confirm_tool_info(&self) -> E2eResult<()> {
        self.catalog
            .load::<ApproveConfirmToolInfoPage>(())
            .approve_tool()
            .await
    }
}

/// Puts tools into pipeline states
pub struct ToolStateManager {
    admin: Arc<dyn ToolAdmin>,
    testdata: Arc<Testdata>,
    approval_retry: RetryPolicy,
    allow_backward: bool,
}

impl ToolStateManager {
    pub const MANAGER_ROLE: &'static str = "toolmanager";
    pub const SUBMITTER_ROLE: &'static str = "toolsubmitter";

    pub fn new(admin: Arc<dyn ToolAdmin>, testdata: Arc<Testdata>, approval_retry: RetryPolicy) -> Self {
        Self {
            admin,
            testdata,
            approval_retry,
            allow_backward: false,
        }
    }

    /// A manager that may also move tools back down the pipeline
    ///
    /// Without this a target behind the tool's current state is an error
    /// and nothing is submitted.
    pub fn allowing_backward(mut self) -> Self {
        self.allow_backward = true;
        self
    }

    /// Make sure `toolname` is in `desired` when this returns
    ///
    /// Unknown tools are registered first by the submitter account. The
    /// status form is only submitted when the state differs, followed by
    /// `confirm` (the approval confirmations when `None` and `desired`
    /// needs them). A timeout on a transition that needs confirmations is
    /// retried per the approval retry policy. The admin session is logged
    /// out before returning.
    pub async fn ensure_tool_state(
        &self,
        toolname: &str,
        data: &ToolData,
        desired: ToolState,
        confirm: Option<Arc<dyn StateConfirmation>>,
    ) -> E2eResult<()> {
        let confirm = confirm.or_else(|| {
            desired
                .requires_confirmation()
                .then(|| Arc::new(ApprovalConfirmation::default()) as Arc<dyn StateConfirmation>)
        });
        let policy = if desired.requires_confirmation() {
            self.approval_retry
        } else {
            RetryPolicy::once()
        };

        let what = format!("moving {} to {}", toolname, desired);
        let confirm = &confirm;
        policy
            .run(&what, E2eError::is_timeout, |_| async move {
                self.transition_once(toolname, data, desired, confirm.as_deref())
                    .await
            })
            .await
    }

    /// Finalizer that puts `toolname` back into `state` after the test
    pub fn finalize_tool_state(
        self: &Arc<Self>,
        toolname: impl Into<String>,
        data: ToolData,
        state: ToolState,
        confirm: Option<Arc<dyn StateConfirmation>>,
    ) -> FinalizeToolState {
        FinalizeToolState {
            manager: Arc::clone(self),
            toolname: toolname.into(),
            data,
            state,
            confirm,
        }
    }

    async fn transition_once(
        &self,
        toolname: &str,
        data: &ToolData,
        desired: ToolState,
        confirm: Option<&dyn StateConfirmation>,
    ) -> E2eResult<()> {
        let (manager, manager_pass) = self.testdata.find_account_for(Self::MANAGER_ROLE)?;
        self.admin.login(manager, manager_pass).await?;

        let result = self.drive(toolname, data, desired, confirm).await;
        let logout = self.admin.logout().await;
        result?;
        logout
    }

    async fn drive(
        &self,
        toolname: &str,
        data: &ToolData,
        desired: ToolState,
        confirm: Option<&dyn StateConfirmation>,
    ) -> E2eResult<()> {
        let current = match self.admin.tool_state(toolname).await {
            Ok(state) => state,
            Err(E2eError::Navigation { .. }) => {
                info!("Tool {} not found, registering it", toolname);
                self.register(toolname, data).await?;
                self.admin.tool_state(toolname).await?
            }
            Err(e) => return Err(e),
        };

        if current == desired {
            info!("Tool {} already {}", toolname, desired);
            return Ok(());
        }

        let path = desired.path_from(current);
        if path.is_empty() {
            if !self.allow_backward {
                return Err(E2eError::Setup(format!(
                    "tool {} is {}; refusing to move it back to {}",
                    toolname, current, desired
                )));
            }
            warn!("Moving {} backwards from {} to {}", toolname, current, desired);
        } else {
            info!("Moving {} from {} through {:?}", toolname, current, path);
        }

        self.admin.submit_state(toolname, desired).await?;
        if let Some(confirm) = confirm {
            confirm.confirm(self.admin.as_ref(), toolname).await?;
        }

        let reached = self.admin.tool_state(toolname).await?;
        E2eError::check(reached == desired, || {
            format!("tool {} is {} after moving it to {}", toolname, reached, desired)
        })
    }

    /// Register as the submitter, then come back as the manager
    async fn register(&self, toolname: &str, data: &ToolData) -> E2eResult<()> {
        let (manager, manager_pass) = self.testdata.find_account_for(Self::MANAGER_ROLE)?;
        let (submitter, submitter_pass) = self.testdata.find_account_for(Self::SUBMITTER_ROLE)?;

        self.admin.logout().await?;
        self.admin.login(submitter, submitter_pass).await?;
        self.admin.register(toolname, data).await?;
        self.admin.logout().await?;
        self.admin.login(manager, manager_pass).await
    }
}

/// Restores a tool's state after a test, pass or fail
pub struct FinalizeToolState {
    manager: Arc<ToolStateManager>,
    toolname: String,
    data: ToolData,
    state: ToolState,
    confirm: Option<Arc<dyn StateConfirmation>>,
}

#[async_trait]
impl Finalizer for FinalizeToolState {
    fn name(&self) -> String {
        format!("finalize_tool_state({}, {})", self.toolname, self.state)
    }

    async fn finalize(&self, _outcome: &Outcome) -> E2eResult<()> {
        self.manager
            .ensure_tool_state(&self.toolname, &self.data, self.state, self.confirm.clone())
            .await
    }
}
