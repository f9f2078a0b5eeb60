//! Per-test teardown
//!
//! Finalizers are registered while a test runs and executed after it, in
//! reverse registration order, whatever the test's outcome. A finalizer
//! error is logged and reported separately; it never replaces the test's
//! own failure.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::error::{E2eError, E2eResult};
use crate::shell::SessionSnapshot;

/// How the test body ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn from_result<T>(result: &E2eResult<T>) -> Self {
        match result {
            Ok(_) => Outcome::Passed,
            Err(E2eError::Skipped(reason)) => Outcome::Skipped(reason.clone()),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[async_trait]
pub trait Finalizer: Send + Sync {
    fn name(&self) -> String;

    async fn finalize(&self, outcome: &Outcome) -> E2eResult<()>;
}

/// Finalizers registered for one test
#[derive(Default)]
pub struct Finalizers {
    stack: Vec<Box<dyn Finalizer>>,
}

impl Finalizers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finalizer: impl Finalizer + 'static) {
        self.stack.push(Box::new(finalizer));
    }

    pub fn push_boxed(&mut self, finalizer: Box<dyn Finalizer>) {
        self.stack.push(finalizer);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Run every finalizer, last registered first
    ///
    /// Returns the errors that occurred, tagged with the finalizer name.
    pub async fn run_all(&mut self, outcome: &Outcome) -> Vec<(String, E2eError)> {
        let mut errors = Vec::new();
        while let Some(finalizer) = self.stack.pop() {
            let name = finalizer.name();
            debug!("Running finalizer {}", name);
            if let Err(e) = finalizer.finalize(outcome).await {
                warn!("Finalizer {} failed: {}", name, e);
                errors.push((name, e));
            }
        }
        errors
    }
}

/// Capture the browser when the test failed
///
/// Capture problems are logged at debug level and dropped.
pub struct ScreenshotOnFailure {
    browser: Arc<dyn Browser>,
    path: PathBuf,
}

impl ScreenshotOnFailure {
    pub fn new(browser: Arc<dyn Browser>, path: impl Into<PathBuf>) -> Self {
        Self {
            browser,
            path: path.into(),
        }
    }
}

#[async_trait]
impl Finalizer for ScreenshotOnFailure {
    fn name(&self) -> String {
        "screenshot_on_failure".to_string()
    }

    async fn finalize(&self, outcome: &Outcome) -> E2eResult<()> {
        if !outcome.failed() {
            return Ok(());
        }
        match self.browser.take_screenshot(&self.path).await {
            Ok(()) => info!("Saved failure screenshot to {}", self.path.display()),
            Err(e) => debug!("Screenshot capture failed: {}", e),
        }
        Ok(())
    }
}

/// Keep the browser's recording when the test failed
///
/// Saving swaps the window onto a fresh blank page. Problems are logged at
/// debug level and dropped.
pub struct VideoOnFailure {
    browser: Arc<dyn Browser>,
    path: PathBuf,
}

impl VideoOnFailure {
    pub fn new(browser: Arc<dyn Browser>, path: impl Into<PathBuf>) -> Self {
        Self {
            browser,
            path: path.into(),
        }
    }
}

#[async_trait]
impl Finalizer for VideoOnFailure {
    fn name(&self) -> String {
        "video_on_failure".to_string()
    }

    async fn finalize(&self, outcome: &Outcome) -> E2eResult<()> {
        if !outcome.failed() {
            return Ok(());
        }
        match self.browser.save_video(&self.path).await {
            Ok(()) => info!("Saved failure video to {}", self.path.display()),
            Err(e) => debug!("Video capture failed: {}", e),
        }
        Ok(())
    }
}

/// Stop container sessions the test left behind
pub struct ReconcileSessions {
    snapshot: SessionSnapshot,
}

impl ReconcileSessions {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl Finalizer for ReconcileSessions {
    fn name(&self) -> String {
        "reconcile_sessions".to_string()
    }

    async fn finalize(&self, _outcome: &Outcome) -> E2eResult<()> {
        let stopped = self.snapshot.reconcile().await?;
        if !stopped.is_empty() {
            info!("Stopped leftover sessions {:?}", stopped);
        }
        Ok(())
    }
}
