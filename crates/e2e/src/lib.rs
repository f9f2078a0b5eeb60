//! hubcheck acceptance layer
//!
//! Drives a HUBzero hub from the outside: a browser for the website, ssh
//! shells into tool session containers, and WebDAV. Scenarios are plain
//! structs run by [`TestRunner`], which owns setup and teardown.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 acceptance (harness binary)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── SharedScope   -> browser, test data, containers      │
//! │    ├── ClassScope    -> class fixtures, screenshot path     │
//! │    └── Finalizers    -> per-test teardown, LIFO             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  scenarios                                                  │
//! │    ├── catalog / actions   (website via Browser)            │
//! │    ├── shell               (Workspace, ToolSession)         │
//! │    └── webdav                                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod retry;
pub mod runner;
pub mod scenarios;
pub mod shell;
pub mod webdav;

pub use config::Settings;
pub use error::{E2eError, E2eResult};
pub use runner::{RunnerConfig, Scenario, TestContext, TestResult, TestRunner, TestSuiteResult};

/// hubcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
