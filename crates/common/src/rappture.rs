//! Rappture runtime selection

use once_cell::sync::Lazy;
use regex::Regex;

/// Environment name used when no alternate runtime is requested
pub const DEFAULT_RAPPTURE: &str = "rappture";

static VERSION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(dev|nightly-(trunk|(branch-\d+(\.\d+)?)))$").ok());

/// True for `dev`, `nightly-trunk` and `nightly-branch-X[.Y]`
pub fn is_valid_version(option: &str) -> bool {
    VERSION_RE
        .as_ref()
        .map(|re| re.is_match(option))
        .unwrap_or(false)
}

/// The `use` environment for a `--rappture_version` option
///
/// Unrecognised options fall back to the default environment.
pub fn rappture_environment(option: &str) -> String {
    if is_valid_version(option) {
        format!("{}-{}", DEFAULT_RAPPTURE, option)
    } else {
        DEFAULT_RAPPTURE.to_string()
    }
}
