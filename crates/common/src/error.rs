//! Error types for hubcheck common

use thiserror::Error;

/// Result type alias using the hubcheck common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading test data or interpreting platform output
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No test account is tagged with role '{0}'")]
    NoAccountForRole(String),

    #[error("No test account named '{0}'")]
    NoSuchAccount(String),

    #[error("No url registered for '{0}'")]
    NoUrlFor(String),

    #[error("Url value for '{key}' is not a port: {value}")]
    NotAPort { key: String, value: String },

    #[error("Sealed test data error: {0}")]
    Seal(String),

    #[error("Unknown tool state: {0}")]
    UnknownToolState(String),

    #[error("Invalid parameter sweep '{input}': {reason}")]
    InvalidSweep { input: String, reason: String },

    #[error("Missing sweep input file: {0}")]
    MissingSweepFile(String),

    #[error("Invalid tool parameters line: {0}")]
    InvalidToolParameters(String),
}
