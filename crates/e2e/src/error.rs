//! Error types for hubcheck scenarios

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Error loading {url} (status {status})")]
    Navigation {
        url: String,
        status: i64,
        /// Raw page-load entry, kept for diagnosis
        har: String,
    },

    #[error("Command '{command}' exited with status {status}: {output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    #[error("Command '{command}' timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Connection closed by remote host")]
    ConnectionClosed,

    #[error("Out of container resources for {username}@{host}: {source}")]
    ResourceExhausted {
        host: String,
        username: String,
        #[source]
        source: Box<E2eError>,
    },

    #[error("Bad parameters while loading {url}: {message}")]
    BadParameters { url: String, message: String },

    #[error("Failed to invoke session: {0}")]
    SessionInvoke(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    /// The scenario does not apply to this hub
    #[error("Skipped: {0}")]
    Skipped(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("WebDAV login rejected for {0}")]
    Unauthorized(String),

    #[error("WebDAV request to {url} failed with status {status}")]
    Webdav { url: String, status: u16 },

    #[error(transparent)]
    Common(#[from] hubcheck_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Command timeouts and wait deadlines
    pub fn is_timeout(&self) -> bool {
        matches!(self, E2eError::CommandTimeout { .. } | E2eError::Timeout(_))
    }

    /// Pseudo-terminal or session exhaustion on the hub
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, E2eError::ResourceExhausted { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, E2eError::Skipped(_))
    }

    /// Fail with `message` unless `condition` holds
    pub fn check(condition: bool, message: impl FnOnce() -> String) -> E2eResult<()> {
        if condition {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed(message()))
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let timed_out = E2eError::CommandTimeout {
            command: "sleep 9".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(timed_out.is_timeout());
        assert!(E2eError::Timeout("session list".into()).is_timeout());
        assert!(!E2eError::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_resource_exhaustion_wraps_cause() {
        let err = E2eError::ResourceExhausted {
            host: "hub".into(),
            username: "u".into(),
            source: Box::new(E2eError::ConnectionClosed),
        };
        assert!(err.is_resource_exhaustion());
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("u@hub"));
    }

    #[test]
    fn test_check() {
        assert!(E2eError::check(true, || unreachable!()).is_ok());
        let err = E2eError::check(false, || "expected 'a', got 'b'".into()).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(m) if m.contains("got 'b'")));
    }
}
