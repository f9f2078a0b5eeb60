//! Runner scoping, teardown order and reporting with fake hub resources

mod support;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use hubcheck_e2e::fixtures::{ClassScope, Finalizer, Finalizers, Outcome, SharedResources};
use hubcheck_e2e::{
    E2eError, E2eResult, RunnerConfig, Scenario, Settings, TestContext, TestRunner,
    TestSuiteResult,
};

use support::{FakeBrowser, FakeHub};

type Log = Arc<Mutex<Vec<String>>>;

struct Note {
    name: String,
    log: Log,
    fail: bool,
}

#[async_trait]
impl Finalizer for Note {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn finalize(&self, outcome: &Outcome) -> E2eResult<()> {
        let tag = match outcome {
            Outcome::Passed => "after pass",
            Outcome::Skipped(_) => "after skip",
            Outcome::Failed(_) => "after failure",
        };
        self.log.lock().push(format!("{} {}", self.name, tag));
        if self.fail {
            return Err(E2eError::Setup(format!("{} broke", self.name)));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Body {
    Pass,
    Fail,
    Skip,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ClassSetup {
    Ok,
    Skip,
    Fail,
}

struct Scripted {
    name: &'static str,
    class: &'static str,
    tags: &'static [&'static str],
    body: Body,
    setup: ClassSetup,
    finalizers: &'static [(&'static str, bool)],
    log: Log,
}

impl Scripted {
    fn new(name: &'static str, class: &'static str, log: &Log) -> Self {
        Self {
            name,
            class,
            tags: &[],
            body: Body::Pass,
            setup: ClassSetup::Ok,
            finalizers: &[],
            log: Arc::clone(log),
        }
    }

    fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    fn setup(mut self, setup: ClassSetup) -> Self {
        self.setup = setup;
        self
    }

    fn with_tags(mut self, tags: &'static [&'static str]) -> Self {
        self.tags = tags;
        self
    }

    fn finalizers(mut self, finalizers: &'static [(&'static str, bool)]) -> Self {
        self.finalizers = finalizers;
        self
    }
}

#[async_trait]
impl Scenario for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn class(&self) -> &str {
        self.class
    }

    fn tags(&self) -> &[&str] {
        self.tags
    }

    async fn class_fixtures(
        &self,
        _hub: &Arc<SharedResources>,
        class: &ClassScope,
        teardown: &mut Finalizers,
    ) -> E2eResult<()> {
        self.log.lock().push(format!("setup {}", class.class()));
        teardown.push(Note {
            name: format!("teardown {}", class.class()),
            log: Arc::clone(&self.log),
            fail: false,
        });
        match self.setup {
            ClassSetup::Ok => Ok(()),
            ClassSetup::Skip => Err(E2eError::Skipped("account not in the apps group".to_string())),
            ClassSetup::Fail => Err(E2eError::Setup("no workspace".to_string())),
        }
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()> {
        self.log.lock().push(format!("run {}", self.name));
        for (name, fail) in self.finalizers {
            ctx.add_finalizer(Note {
                name: name.to_string(),
                log: Arc::clone(&self.log),
                fail: *fail,
            });
        }
        match self.body {
            Body::Pass => Ok(()),
            Body::Fail => Err(E2eError::AssertionFailed("forced".to_string())),
            Body::Skip => Err(E2eError::Skipped("not on this hub".to_string())),
        }
    }
}

fn runner(dir: &Path, browser: Arc<FakeBrowser>, config: RunnerConfig) -> TestRunner {
    runner_with(support::settings(dir), dir, browser, config)
}

fn runner_with(
    settings: Settings,
    dir: &Path,
    browser: Arc<FakeBrowser>,
    config: RunnerConfig,
) -> TestRunner {
    let hub = Arc::new(FakeHub::new(dir));
    let (scope, _) = support::scope_with(settings, browser, hub);
    TestRunner::new(
        Arc::new(scope),
        RunnerConfig {
            output_dir: dir.join("results"),
            ..config
        },
    )
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

fn find<'a>(suite: &'a TestSuiteResult, name: &str) -> &'a hubcheck_e2e::TestResult {
    suite
        .results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for {}", name))
}

#[tokio::test]
async fn shared_resources_are_provisioned_once() {
    let dir = tempfile::tempdir().unwrap();
    let hub = Arc::new(FakeHub::new(dir.path()));
    let (scope, builds) = support::scope(dir.path(), Arc::new(FakeBrowser::new()), hub);
    assert!(!scope.is_provisioned());

    let first = scope.provision_shared_resources().await.unwrap();
    let second = scope.provision_shared_resources().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.browser, &second.browser));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(scope.is_provisioned());
    assert_eq!(first.urls.https_authority, "https://hub.example.org");
}

#[tokio::test]
async fn classes_run_together_with_fixtures_once_per_class() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let browser = Arc::new(FakeBrowser::new());
    let mut runner = runner(dir.path(), browser.clone(), RunnerConfig::default());
    runner.register(Scripted::new("a1", "A", &log));
    runner.register(Scripted::new("b1", "B", &log));
    runner.register(Scripted::new("a2", "A", &log));

    let suite = runner.run().await;

    assert_eq!((suite.total, suite.passed), (3, 3));
    assert_eq!(
        entries(&log),
        vec![
            "setup A",
            "run a1",
            "run a2",
            "teardown A after pass",
            "setup B",
            "run b1",
            "teardown B after pass",
        ]
    );
    assert!(browser.is_closed());
}

#[tokio::test]
async fn finalizers_run_last_first_whatever_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), RunnerConfig::default());
    runner.register(
        Scripted::new("broken", "A", &log)
            .body(Body::Fail)
            .finalizers(&[("first", false), ("second", true), ("third", false)]),
    );

    let suite = runner.run().await;
    let result = find(&suite, "broken");

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Assertion failed: forced"));
    assert_eq!(result.teardown_errors.len(), 1);
    assert!(result.teardown_errors[0].starts_with("second"));
    let run: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.ends_with("after failure"))
        .collect();
    assert_eq!(
        run,
        vec![
            "third after failure",
            "second after failure",
            "first after failure",
        ]
    );
}

#[tokio::test]
async fn failing_teardown_fails_a_passing_test() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), RunnerConfig::default());
    runner.register(Scripted::new("leaky", "A", &log).finalizers(&[("cleanup", true)]));

    let suite = runner.run().await;
    let result = find(&suite, "leaky");

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or("").starts_with("teardown: cleanup"));
    assert!(!suite.success());
}

#[tokio::test]
async fn screenshot_failure_keeps_the_original_result() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let browser = Arc::new(FakeBrowser::failing_screenshots());
    let mut runner = runner(dir.path(), browser.clone(), RunnerConfig::default());
    runner.register(Scripted::new("broken", "TestShots", &log).body(Body::Fail));

    let suite = runner.run().await;
    let result = find(&suite, "broken");

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Assertion failed: forced"));
    assert!(result.teardown_errors.is_empty());
    assert!(browser.screenshots().is_empty());
}

#[tokio::test]
async fn failed_test_leaves_a_screenshot_named_after_the_class() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let browser = Arc::new(FakeBrowser::new());
    let mut runner = runner(dir.path(), browser.clone(), RunnerConfig::default());
    runner.register(Scripted::new("fine", "TestShots", &log));
    runner.register(Scripted::new("broken", "TestShots", &log).body(Body::Fail));

    runner.run().await;

    assert_eq!(
        browser.screenshots(),
        vec![dir.path().join("screenshots").join("TestShots.png")]
    );
}

#[tokio::test]
async fn skipped_class_setup_skips_its_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), RunnerConfig::default());
    runner.register(Scripted::new("apps1", "Apps", &log).setup(ClassSetup::Skip));
    runner.register(Scripted::new("apps2", "Apps", &log).setup(ClassSetup::Skip));
    runner.register(Scripted::new("other", "Other", &log));

    let suite = runner.run().await;

    assert_eq!((suite.total, suite.passed, suite.skipped, suite.failed), (3, 1, 2, 0));
    assert!(suite.success());
    assert!(!entries(&log).contains(&"run apps1".to_string()));
    assert!(entries(&log).contains(&"teardown Apps after skip".to_string()));
}

#[tokio::test]
async fn failed_class_setup_fails_its_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), RunnerConfig::default());
    runner.register(Scripted::new("c1", "C", &log).setup(ClassSetup::Fail));

    let suite = runner.run().await;
    let result = find(&suite, "c1");

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap_or("")
        .starts_with("class setup: Setup failed: no workspace"));
}

#[tokio::test]
async fn skipped_scenario_counts_as_skip() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), RunnerConfig::default());
    runner.register(Scripted::new("maybe", "A", &log).body(Body::Skip));

    let suite = runner.run().await;

    assert_eq!((suite.skipped, suite.failed), (1, 0));
    assert_eq!(find(&suite, "maybe").error.as_deref(), Some("not on this hub"));
}

#[tokio::test]
async fn skipped_scenario_takes_no_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let browser = Arc::new(FakeBrowser::new());
    let mut runner = runner(dir.path(), browser.clone(), RunnerConfig::default());
    runner.register(
        Scripted::new("maybe", "TestShots", &log)
            .body(Body::Skip)
            .finalizers(&[("cleanup", false)]),
    );

    runner.run().await;

    assert!(browser.screenshots().is_empty());
    assert!(entries(&log).contains(&"cleanup after skip".to_string()));
}

#[tokio::test]
async fn failed_test_keeps_its_recording_when_video_is_on() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let browser = Arc::new(FakeBrowser::recording());
    let mut settings = support::settings(dir.path());
    settings.browser.video_dir = Some(dir.path().join("videos"));
    let mut runner = runner_with(settings, dir.path(), browser.clone(), RunnerConfig::default());
    runner.register(Scripted::new("fine", "TestVideo", &log));
    runner.register(Scripted::new("broken", "TestVideo", &log).body(Body::Fail));
    runner.register(Scripted::new("maybe", "TestVideo", &log).body(Body::Skip));

    let suite = runner.run().await;

    assert_eq!(
        browser.videos(),
        vec![dir.path().join("videos").join("TestVideo.webm")]
    );
    assert_eq!(browser.screenshots().len(), 1);
    assert!(find(&suite, "broken").teardown_errors.is_empty());
}

#[tokio::test]
async fn video_is_not_saved_when_recording_is_off() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let browser = Arc::new(FakeBrowser::recording());
    let mut runner = runner(dir.path(), browser.clone(), RunnerConfig::default());
    runner.register(Scripted::new("broken", "TestVideo", &log).body(Body::Fail));

    runner.run().await;

    assert!(browser.videos().is_empty());
    assert_eq!(browser.screenshots().len(), 1);
}

#[tokio::test]
async fn repeat_runs_each_test_again() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let config = RunnerConfig {
        repeat: 2,
        ..RunnerConfig::default()
    };
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), config);
    runner.register(Scripted::new("again", "A", &log));

    let suite = runner.run().await;

    let names: Vec<&str> = suite.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["again[1/2]", "again[2/2]"]);
    assert_eq!(
        entries(&log).iter().filter(|e| e.starts_with("setup")).count(),
        1
    );
}

#[tokio::test]
async fn name_and_tag_filters_select_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let build = |config: RunnerConfig| {
        let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), config);
        runner.register(Scripted::new("web1", "W", &log).with_tags(&["website"]));
        runner.register(Scripted::new("box1", "X", &log).with_tags(&["container", "website"]));
        runner.register(Scripted::new("box2", "X", &log).with_tags(&["container"]));
        runner
    };

    let by_tag = build(RunnerConfig {
        tag: Some("container".to_string()),
        ..RunnerConfig::default()
    });
    let names: Vec<&str> = by_tag.selected().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["box1", "box2"]);

    let by_name = build(RunnerConfig {
        name: Some("web1".to_string()),
        ..RunnerConfig::default()
    });
    let suite = by_name.run().await;
    assert_eq!(suite.total, 1);
    assert_eq!(entries(&log), vec!["setup W", "run web1", "teardown W after pass"]);
}

#[tokio::test]
async fn results_are_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let mut runner = runner(dir.path(), Arc::new(FakeBrowser::new()), RunnerConfig::default());
    runner.register(Scripted::new("ok", "A", &log));
    runner.register(Scripted::new("bad", "A", &log).body(Body::Fail));

    let suite = runner.run().await;
    let path = runner.write_results(&suite).unwrap();

    assert_eq!(path, dir.path().join("results").join("test-results.json"));
    let written: TestSuiteResult =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!((written.total, written.passed, written.failed), (2, 1, 1));
}
