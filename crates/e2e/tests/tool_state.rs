//! Tool pipeline transitions against an in-memory platform

mod support;

use std::sync::Arc;
use std::time::Duration;

use hubcheck_common::{ToolData, ToolState};
use hubcheck_e2e::fixtures::{Finalizer, Outcome, ToolAdmin, ToolStateManager};
use hubcheck_e2e::retry::RetryPolicy;
use hubcheck_e2e::E2eError;
use test_case::test_case;

use support::FakePlatform;

const TOOL: &str = "hctool";

fn data() -> ToolData {
    ToolData::new("hc tool", "pipeline checks")
}

fn plain_manager(platform: &Arc<FakePlatform>, attempts: u32) -> ToolStateManager {
    let admin: Arc<dyn ToolAdmin> = platform.clone();
    ToolStateManager::new(
        admin,
        Arc::new(support::testdata()),
        RetryPolicy {
            max_attempts: attempts,
            delay: Duration::ZERO,
        },
    )
}

fn manager(platform: &Arc<FakePlatform>, attempts: u32) -> Arc<ToolStateManager> {
    Arc::new(plain_manager(platform, attempts))
}

async fn converges(prior: Option<ToolState>, desired: ToolState) {
    let platform = match prior {
        Some(state) => FakePlatform::new().with_tool(TOOL, state),
        None => FakePlatform::new(),
    };
    let platform = Arc::new(platform);

    plain_manager(&platform, 2)
        .allowing_backward()
        .ensure_tool_state(TOOL, &data(), desired, None)
        .await
        .unwrap();

    assert_eq!(platform.state_of(TOOL), Some(desired));
    assert_eq!(platform.logged_in(), None);
}

#[test_case(ToolState::Registered)]
#[test_case(ToolState::Created)]
#[test_case(ToolState::Uploaded)]
#[test_case(ToolState::Installed)]
#[test_case(ToolState::Approved)]
#[test_case(ToolState::Published)]
#[tokio::test]
async fn ensure_tool_state_converges_from_every_prior_state(desired: ToolState) {
    converges(None, desired).await;
    for prior in ToolState::ALL {
        converges(Some(prior), desired).await;
    }
}

#[tokio::test]
async fn unknown_tool_is_registered_by_the_submitter() {
    let platform = Arc::new(FakePlatform::new());

    manager(&platform, 1)
        .ensure_tool_state(TOOL, &data(), ToolState::Created, None)
        .await
        .unwrap();

    assert_eq!(
        platform.registered_by(),
        vec![(TOOL.to_string(), "submitter".to_string())]
    );
    assert_eq!(platform.submits(), vec![(TOOL.to_string(), ToolState::Created)]);
}

#[tokio::test]
async fn matching_state_submits_nothing() {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, ToolState::Installed));

    manager(&platform, 1)
        .ensure_tool_state(TOOL, &data(), ToolState::Installed, None)
        .await
        .unwrap();

    assert!(platform.submits().is_empty());
    assert!(platform.registered_by().is_empty());
}

#[tokio::test]
async fn approval_navigation_timeout_is_retried_once() {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, ToolState::Installed));
    platform.time_out_approvals(1);

    manager(&platform, 2)
        .ensure_tool_state(TOOL, &data(), ToolState::Approved, None)
        .await
        .unwrap();

    assert_eq!(platform.state_of(TOOL), Some(ToolState::Approved));
    assert_eq!(platform.submits().len(), 2);
    assert_eq!(platform.versions(), vec!["1.01".to_string()]);
}

#[tokio::test]
async fn second_approval_timeout_fails() {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, ToolState::Installed));
    platform.time_out_approvals(2);

    let err = manager(&platform, 2)
        .ensure_tool_state(TOOL, &data(), ToolState::Approved, None)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert_eq!(platform.state_of(TOOL), Some(ToolState::Installed));
    assert_eq!(platform.logged_in(), None);
}

#[tokio::test]
async fn approval_failure_that_is_not_a_timeout_is_not_retried() {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, ToolState::Installed));
    platform.fail_approvals(1);

    let err = manager(&platform, 3)
        .ensure_tool_state(TOOL, &data(), ToolState::Approved, None)
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::Browser(_)), "unexpected error: {}", err);
    assert_eq!(platform.submits().len(), 1);
    assert_eq!(platform.state_of(TOOL), Some(ToolState::Installed));
}

#[test_case(ToolState::Created, ToolState::Registered)]
#[test_case(ToolState::Approved, ToolState::Installed)]
#[test_case(ToolState::Published, ToolState::Created)]
#[tokio::test]
async fn backward_target_is_refused_by_default(current: ToolState, desired: ToolState) {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, current));

    let err = manager(&platform, 2)
        .ensure_tool_state(TOOL, &data(), desired, None)
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::Setup(ref m) if m.contains("refusing")), "unexpected error: {}", err);
    assert!(platform.submits().is_empty());
    assert_eq!(platform.state_of(TOOL), Some(current));
    assert_eq!(platform.logged_in(), None);
}

#[tokio::test]
async fn backward_target_is_reached_when_allowed() {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, ToolState::Approved));

    plain_manager(&platform, 1)
        .allowing_backward()
        .ensure_tool_state(TOOL, &data(), ToolState::Registered, None)
        .await
        .unwrap();

    assert_eq!(platform.state_of(TOOL), Some(ToolState::Registered));
}

#[tokio::test]
async fn finalizer_restores_the_state_after_a_failure() {
    let platform = Arc::new(FakePlatform::new().with_tool(TOOL, ToolState::Registered));
    let manager = Arc::new(plain_manager(&platform, 1).allowing_backward());
    let finalizer = manager.finalize_tool_state(TOOL, data(), ToolState::Registered, None);

    manager
        .ensure_tool_state(TOOL, &data(), ToolState::Installed, None)
        .await
        .unwrap();
    finalizer
        .finalize(&Outcome::Failed("scenario broke".to_string()))
        .await
        .unwrap();

    assert_eq!(platform.state_of(TOOL), Some(ToolState::Registered));
    assert!(finalizer.name().contains(TOOL));
}

#[tokio::test]
async fn missing_manager_account_is_a_setup_error() {
    let platform = Arc::new(FakePlatform::new());
    let admin: Arc<dyn ToolAdmin> = platform.clone();
    let manager = ToolStateManager::new(
        admin,
        Arc::new(hubcheck_common::Testdata::default()),
        RetryPolicy::once(),
    );

    let err = manager
        .ensure_tool_state(TOOL, &data(), ToolState::Created, None)
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::Common(_)), "unexpected error: {}", err);
}
