//! Walking a tool through the contribution pipeline

use std::sync::Arc;

use async_trait::async_trait;
use hubcheck_common::{ToolData, ToolState};
use tracing::info;

use crate::actions::{account, contribtool};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{
    ClassScope, Finalizers, SharedResources, ToolAdmin, ToolStateManager, WebToolAdmin,
};
use crate::runner::{Scenario, TestContext};

/// Tool registered for these scenarios; hub-wide, so concurrent runs race
pub const PIPELINE_TOOL: &str = "hcpipeline";

pub fn scenarios() -> Vec<Box<dyn Scenario>> {
    [
        ToolState::Created,
        ToolState::Uploaded,
        ToolState::Installed,
        ToolState::Approved,
    ]
    .into_iter()
    .map(|state| Box::new(PipelineTransition::new(state)) as Box<dyn Scenario>)
    .collect()
}

fn tool_data() -> ToolData {
    ToolData::new(
        "hubcheck pipeline tool",
        "Registered by hubcheck to exercise the tool contribution pipeline",
    )
}

fn manager(hub: &SharedResources) -> ToolStateManager {
    let admin: Arc<dyn ToolAdmin> = Arc::new(WebToolAdmin::new(hub.catalog.clone()));
    ToolStateManager::new(
        admin,
        Arc::clone(&hub.testdata),
        hub.settings.approval_retry(),
    )
}

/// Move the pipeline tool forward to one later state
///
/// The scenarios run in pipeline order, each starting where the previous
/// one left the tool. The class puts the tool back to Registered before
/// the first and after the last.
pub struct PipelineTransition {
    name: String,
    state: ToolState,
}

impl PipelineTransition {
    fn new(state: ToolState) -> Self {
        Self {
            name: format!("test_tool_state_{}", state.as_str().to_lowercase()),
            state,
        }
    }
}

#[async_trait]
impl Scenario for PipelineTransition {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        "TestContribtoolPipeline"
    }

    fn tags(&self) -> &[&str] {
        &["website", "contribtool"]
    }

    /// Register the tool if the hub has never seen it and reset it to
    /// Registered, now and once the class is done
    async fn class_fixtures(
        &self,
        hub: &Arc<SharedResources>,
        _class: &ClassScope,
        teardown: &mut Finalizers,
    ) -> E2eResult<()> {
        hub.browser.get(&hub.urls.https_authority).await?;
        let reset = Arc::new(manager(hub).allowing_backward());
        reset
            .ensure_tool_state(PIPELINE_TOOL, &tool_data(), ToolState::Registered, None)
            .await?;
        teardown.push(reset.finalize_tool_state(
            PIPELINE_TOOL,
            tool_data(),
            ToolState::Registered,
            None,
        ));
        Ok(())
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        let manager = manager(ctx.hub());
        let hub = ctx.hub();

        let path = self.state.path_from(ToolState::Registered);
        info!("Moving {} towards {:?}", PIPELINE_TOOL, path);
        manager
            .ensure_tool_state(PIPELINE_TOOL, &tool_data(), self.state, None)
            .await?;

        // what a manager sees on the status page, independent of the move
        let (username, password) = hub.account_for(ToolStateManager::MANAGER_ROLE)?;
        account::login_as(&hub.catalog, &username, &password).await?;
        let shown = async {
            contribtool::goto_tool_status_page(&hub.catalog, PIPELINE_TOOL, self.state)
                .await?
                .get_tool_state()
                .await
        }
        .await;
        account::logout(&hub.catalog).await?;

        let shown = shown?;
        E2eError::check(shown == self.state, || {
            format!(
                "status page shows {} as {}, expected {}",
                PIPELINE_TOOL, shown, self.state
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenarios_only_move_forward() {
        let states: Vec<ToolState> = scenarios()
            .iter()
            .map(|s| s.name().trim_start_matches("test_tool_state_").parse().unwrap())
            .collect();
        assert!(states.windows(2).all(|w| w[0] < w[1]), "{:?}", states);
    }

    #[test]
    fn test_scenarios_cover_every_state_after_registered() {
        let names: Vec<String> = scenarios().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "test_tool_state_created",
                "test_tool_state_uploaded",
                "test_tool_state_installed",
                "test_tool_state_approved",
            ]
        );
    }
}
