//! Scenario runner
//!
//! Runs registered scenarios class by class: class fixtures are set up
//! before the first scenario of a class and torn down after its last one;
//! every scenario gets its own finalizer stack with screenshot-on-failure
//! (and video-on-failure when recording) finalizers at the bottom.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hubcheck_common::rappture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::fixtures::{
    ClassScope, Finalizer, Finalizers, Outcome, ScreenshotOnFailure, SharedResources, SharedScope,
    VideoOnFailure,
};

/// What a running scenario can reach
pub struct TestContext {
    hub: Arc<SharedResources>,
    class: ClassScope,
    finalizers: Finalizers,
}

impl TestContext {
    pub fn new(hub: Arc<SharedResources>, class: ClassScope) -> Self {
        Self {
            hub,
            class,
            finalizers: Finalizers::new(),
        }
    }

    pub fn hub(&self) -> &Arc<SharedResources> {
        &self.hub
    }

    pub fn class(&self) -> &ClassScope {
        &self.class
    }

    /// Run `finalizer` after the test, before the ones registered earlier
    pub fn add_finalizer(&mut self, finalizer: impl Finalizer + 'static) {
        self.finalizers.push(finalizer);
    }

    pub fn finalizers_mut(&mut self) -> &mut Finalizers {
        &mut self.finalizers
    }
}

/// One acceptance check
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    /// Scenarios of one class share class fixtures
    fn class(&self) -> &str;

    fn tags(&self) -> &[&str] {
        &[]
    }

    /// Class-level setup, called on the first selected scenario of the
    /// class; pushed finalizers run after the last one
    async fn class_fixtures(
        &self,
        _hub: &Arc<SharedResources>,
        _class: &ClassScope,
        _teardown: &mut Finalizers,
    ) -> E2eResult<()> {
        Ok(())
    }

    async fn run(&self, ctx: &mut TestContext) -> E2eResult<()>;
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub class: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Finalizer failures, reported next to the test's own error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown_errors: Vec<String>,
}

impl TestResult {
    fn failed(name: &str, class: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            success: false,
            skipped: false,
            duration_ms: 0,
            error: Some(error),
            teardown_errors: Vec::new(),
        }
    }

    fn skipped(name: &str, class: &str, reason: String) -> Self {
        Self {
            success: true,
            skipped: true,
            ..Self::failed(name, class, reason)
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    fn push(&mut self, result: TestResult) {
        self.total += 1;
        if result.skipped {
            self.skipped += 1;
            info!("- {} skipped: {}", result.name, result.error.as_deref().unwrap_or(""));
        } else if result.success {
            self.passed += 1;
            info!("✓ {} ({} ms)", result.name, result.duration_ms);
        } else {
            self.failed += 1;
            error!(
                "✗ {} - {}",
                result.name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        self.results.push(result);
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pause before each test
    pub delay: Duration,
    /// Times each test is run
    pub repeat: u32,
    pub tag: Option<String>,
    pub name: Option<String>,
    pub rappture_version: Option<String>,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            repeat: 1,
            tag: None,
            name: None,
            rappture_version: None,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Parse `--delay`: seconds, fractions allowed
pub fn parse_delay(text: &str) -> Result<Duration, String> {
    let secs: f64 = text
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", text))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("delay must be a finite, non-negative number, got '{}'", text));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("delay '{}': {}", text, e))
}

/// Keep a known `--rappture_version`; anything else falls back to the
/// default rappture environment
pub fn rappture_version_option(option: Option<String>) -> Option<String> {
    match option {
        Some(v) if rappture::is_valid_version(&v) => Some(v),
        Some(v) => {
            warn!(
                "Unknown rappture version '{}', using the {} environment",
                v,
                rappture::DEFAULT_RAPPTURE
            );
            None
        }
        None => None,
    }
}

/// Main acceptance runner
pub struct TestRunner {
    scope: Arc<SharedScope>,
    config: RunnerConfig,
    scenarios: Vec<Box<dyn Scenario>>,
}

impl TestRunner {
    pub fn new(scope: Arc<SharedScope>, config: RunnerConfig) -> Self {
        Self {
            scope,
            config,
            scenarios: Vec::new(),
        }
    }

    pub fn register(&mut self, scenario: impl Scenario + 'static) {
        self.scenarios.push(Box::new(scenario));
    }

    pub fn register_all(&mut self, scenarios: Vec<Box<dyn Scenario>>) {
        self.scenarios.extend(scenarios);
    }

    /// Scenarios passing the name and tag filters, in registration order
    pub fn selected(&self) -> Vec<&dyn Scenario> {
        self.scenarios
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| self.config.name.as_deref().map_or(true, |n| s.name() == n))
            .filter(|s| {
                self.config
                    .tag
                    .as_deref()
                    .map_or(true, |t| s.tags().contains(&t))
            })
            .collect()
    }

    /// Run the selected scenarios, grouped by class
    pub async fn run(&self) -> TestSuiteResult {
        let start = Instant::now();
        let selected = self.selected();
        let mut suite = TestSuiteResult::default();
        info!("Running {} test(s)...", selected.len());

        let hub = match self.scope.provision_shared_resources().await {
            Ok(hub) => hub,
            Err(e) => {
                error!("Could not provision shared resources: {}", e);
                for scenario in &selected {
                    suite.push(TestResult::failed(
                        scenario.name(),
                        scenario.class(),
                        format!("setup: {}", e),
                    ));
                }
                return suite;
            }
        };

        for (class, scenarios) in group_by_class(&selected) {
            self.run_class(&hub, class, &scenarios, &mut suite).await;
        }

        if let Err(e) = self.scope.close().await {
            warn!("Could not close the browser: {}", e);
        }

        suite.duration_ms = start.elapsed().as_millis() as u64;
        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );
        suite
    }

    async fn run_class(
        &self,
        hub: &Arc<SharedResources>,
        class: &str,
        scenarios: &[&dyn Scenario],
        suite: &mut TestSuiteResult,
    ) {
        let scope = ClassScope::new(class, &hub.settings, self.config.rappture_version.as_deref());
        let mut class_teardown = Finalizers::new();
        debug!("Setting up class {}", class);

        if let Some(first) = scenarios.first() {
            if let Err(e) = first.class_fixtures(hub, &scope, &mut class_teardown).await {
                for scenario in scenarios {
                    suite.push(match &e {
                        E2eError::Skipped(reason) => {
                            TestResult::skipped(scenario.name(), class, reason.clone())
                        }
                        e => TestResult::failed(
                            scenario.name(),
                            class,
                            format!("class setup: {}", e),
                        ),
                    });
                }
                if !e.is_skip() {
                    error!("Class setup of {} failed: {}", class, e);
                }
                let outcome = match &e {
                    E2eError::Skipped(reason) => Outcome::Skipped(reason.clone()),
                    e => Outcome::Failed(e.to_string()),
                };
                class_teardown.run_all(&outcome).await;
                return;
            }
        }

        let repeat = self.config.repeat.max(1);
        for scenario in scenarios {
            for round in 1..=repeat {
                if !self.config.delay.is_zero() {
                    tokio::time::sleep(self.config.delay).await;
                }
                let mut result = self.run_one(hub, &scope, *scenario).await;
                if repeat > 1 {
                    result.name = format!("{}[{}/{}]", result.name, round, repeat);
                }
                suite.push(result);
            }
        }

        debug!("Tearing down class {}", class);
        for (name, e) in class_teardown.run_all(&Outcome::Passed).await {
            error!("Class teardown {} of {} failed: {}", name, class, e);
        }
    }

    /// Run one scenario and its finalizers
    pub async fn run_one(
        &self,
        hub: &Arc<SharedResources>,
        class: &ClassScope,
        scenario: &dyn Scenario,
    ) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", scenario.name());

        // saving the video blanks the page, so it goes below the screenshot
        let mut ctx = TestContext::new(Arc::clone(hub), class.clone());
        if let Some(path) = class.video_path() {
            ctx.add_finalizer(VideoOnFailure::new(Arc::clone(&hub.browser), path));
        }
        ctx.add_finalizer(ScreenshotOnFailure::new(
            Arc::clone(&hub.browser),
            class.screenshot_path(),
        ));

        let result = scenario.run(&mut ctx).await;
        let outcome = Outcome::from_result(&result);
        let teardown_errors: Vec<String> = ctx
            .finalizers_mut()
            .run_all(&outcome)
            .await
            .into_iter()
            .map(|(name, e)| format!("{}: {}", name, e))
            .collect();

        let (success, skipped, error) = match result {
            Ok(()) if teardown_errors.is_empty() => (true, false, None),
            Ok(()) => (false, false, Some(format!("teardown: {}", teardown_errors.join("; ")))),
            Err(E2eError::Skipped(reason)) => (true, true, Some(reason)),
            Err(e) => (false, false, Some(e.to_string())),
        };

        TestResult {
            name: scenario.name().to_string(),
            class: scenario.class().to_string(),
            success,
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            teardown_errors,
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Classes in order of first appearance, each with its scenarios
fn group_by_class<'a>(scenarios: &[&'a dyn Scenario]) -> Vec<(&'a str, Vec<&'a dyn Scenario>)> {
    let mut groups: Vec<(&'a str, Vec<&'a dyn Scenario>)> = Vec::new();
    for &scenario in scenarios {
        let class = scenario.class();
        match groups.iter_mut().find(|(c, _)| *c == class) {
            Some((_, members)) => members.push(scenario),
            None => groups.push((class, vec![scenario])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Scenario for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn class(&self) -> &str {
            self.1
        }

        async fn run(&self, _ctx: &mut TestContext) -> E2eResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_group_by_class_keeps_first_appearance_order() {
        let a = Named("a1", "A");
        let b = Named("b1", "B");
        let a2 = Named("a2", "A");
        let all: Vec<&dyn Scenario> = vec![&a, &b, &a2];

        let groups = group_by_class(&all);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "A");
        let names: Vec<&str> = groups[0].1.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a1", "a2"]);
        assert_eq!(groups[1].0, "B");
    }

    #[test]
    fn test_parse_delay_takes_fractions() {
        assert_eq!(parse_delay("0.5").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_delay("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_delay("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_delay_rejects_nonsense() {
        for text in ["-1", "-0.25", "inf", "NaN", "soon", ""] {
            assert!(parse_delay(text).is_err(), "accepted {:?}", text);
        }
    }

    #[test]
    fn test_unknown_rappture_version_falls_back() {
        assert_eq!(rappture_version_option(Some("dev".into())), Some("dev".to_string()));
        assert_eq!(rappture_version_option(Some("1.9".into())), None);
        assert_eq!(rappture_version_option(None), None);
    }

    #[test]
    fn test_suite_counts() {
        let mut suite = TestSuiteResult::default();
        suite.push(TestResult::failed("x", "C", "boom".to_string()));
        suite.push(TestResult {
            success: true,
            error: None,
            ..TestResult::failed("y", "C", String::new())
        });
        suite.push(TestResult::skipped("z", "C", "no apps group".to_string()));
        assert_eq!((suite.total, suite.passed, suite.failed, suite.skipped), (3, 1, 1, 1));
        assert!(!suite.success());
    }
}
