//! hubcheck common library
//!
//! Test data, the tool lifecycle model and the pure parsers shared by the
//! acceptance scenarios. Nothing in this crate talks to a hub.

pub mod error;
pub mod invoke;
pub mod parse;
pub mod rappture;
pub mod seal;
pub mod sweep;
pub mod testdata;
pub mod text;
pub mod tool;

pub use error::{Error, Result};
pub use invoke::{InvokeApp, Placeholder, Selection, ToolParameters};
pub use sweep::{SubmitCommand, SweepArgs, SweepFiles};
pub use testdata::{HubUrls, TestAccount, Testdata};
pub use tool::{LicenseTerms, ToolData, ToolState};

/// hubcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default directory for settings, test data and artifacts
pub fn default_home() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".hubcheck")
}

/// Default settings file
pub fn default_config_path() -> std::path::PathBuf {
    default_home().join("hubcheck.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
