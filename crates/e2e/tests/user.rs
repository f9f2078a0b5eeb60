//! Container account checks over local shells

mod support;

use std::path::Path;
use std::sync::Arc;

use hubcheck_e2e::scenarios::user;
use hubcheck_e2e::{RunnerConfig, TestResult, TestRunner, TestSuiteResult};

use support::{FakeBrowser, FakeHub};

fn runner(dir: &Path, hub: FakeHub) -> TestRunner {
    let (scope, _) = support::scope(dir, Arc::new(FakeBrowser::new()), Arc::new(hub));
    let mut runner = TestRunner::new(
        Arc::new(scope),
        RunnerConfig {
            output_dir: dir.join("results"),
            ..RunnerConfig::default()
        },
    );
    runner.register_all(user::scenarios());
    runner
}

fn find<'a>(suite: &'a TestSuiteResult, name: &str) -> &'a TestResult {
    suite
        .results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for {}", name))
}

#[tokio::test]
async fn registered_umask_is_checked() {
    let dir = tempfile::tempdir().unwrap();

    let suite = runner(dir.path(), FakeHub::new(dir.path()).with_umask("0027")).run().await;

    let result = find(&suite, "test_registered_umask");
    assert!(result.success, "error: {:?}", result.error);
}

#[tokio::test]
async fn loose_umask_fails_the_registered_check() {
    let dir = tempfile::tempdir().unwrap();

    let suite = runner(dir.path(), FakeHub::new(dir.path()).with_umask("0022")).run().await;

    let result = find(&suite, "test_registered_umask");
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("incorrect umask: 0022, expected: 0027"));
}

#[tokio::test]
async fn apps_checks_skip_outside_the_apps_group() {
    let dir = tempfile::tempdir().unwrap();

    let suite = runner(dir.path(), FakeHub::new(dir.path())).run().await;

    for name in ["test_apps_umask", "test_apps_home_directory"] {
        let result = find(&suite, name);
        assert!(result.skipped, "{} was not skipped: {:?}", name, result.error);
        assert!(result.error.as_deref().unwrap_or_default().contains("not in apps group"));
    }
}
