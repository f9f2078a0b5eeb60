//! Multi-page flows shared by scenarios and fixtures

pub mod account;
pub mod contribtool;
pub mod tools;

pub use tools::launch_tool_with_parameters;
