//! Tool lifecycle on the hub's contribution pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle position of a contributed tool
///
/// The variants are declared in pipeline order, so `Ord` follows the
/// forward direction of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ToolState {
    Registered,
    Created,
    Uploaded,
    Installed,
    Approved,
    Published,
}

impl ToolState {
    pub const ALL: [ToolState; 6] = [
        ToolState::Registered,
        ToolState::Created,
        ToolState::Uploaded,
        ToolState::Installed,
        ToolState::Approved,
        ToolState::Published,
    ];

    /// Label used by the status form and status page
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolState::Registered => "Registered",
            ToolState::Created => "Created",
            ToolState::Uploaded => "Uploaded",
            ToolState::Installed => "Installed",
            ToolState::Approved => "Approved",
            ToolState::Published => "Published",
        }
    }

    pub fn next(&self) -> Option<ToolState> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Forward edges walked to get from `from` to `self`
    ///
    /// Empty when `from` already is `self` or lies ahead of it.
    pub fn path_from(&self, from: ToolState) -> Vec<ToolState> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| *s > from && s <= self)
            .collect()
    }

    /// Approval needs version, license and tool-info confirmations
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, ToolState::Approved)
    }
}

impl fmt::Display for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::UnknownToolState(s.to_string()))
    }
}

/// Version to enter on the approval version form
///
/// A numeric version is bumped by 0.01, anything else is replaced by
/// `now_unix`.
pub fn next_approval_version(current: &str, now_unix: u64) -> String {
    match current.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => {
            let bumped = ((v + 0.01) * 1000.0).round() / 1000.0;
            bumped.to_string()
        }
        _ => now_unix.to_string(),
    }
}

/// Data entered on the tool registration form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolData {
    pub title: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub vnc_geometry: Option<String>,
    #[serde(default)]
    pub team: Vec<String>,
}

impl ToolData {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: "1.0".to_string(),
            description: description.into(),
            vnc_geometry: None,
            team: Vec::new(),
        }
    }
}

/// Answers for the license step of an approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseTerms {
    pub source_access: String,
    pub templates: String,
    pub license_text: String,
    pub authorize: bool,
}

impl Default for LicenseTerms {
    fn default() -> Self {
        Self {
            source_access: "open source".to_string(),
            templates: "custom".to_string(),
            license_text: ".".to_string(),
            authorize: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_states_are_ordered_along_the_pipeline() {
        assert!(ToolState::Registered < ToolState::Created);
        assert!(ToolState::Approved < ToolState::Published);
        assert_eq!(ToolState::Installed.next(), Some(ToolState::Approved));
        assert_eq!(ToolState::Published.next(), None);
    }

    #[test]
    fn test_path_from_only_walks_forward() {
        assert_eq!(
            ToolState::Approved.path_from(ToolState::Uploaded),
            vec![ToolState::Installed, ToolState::Approved]
        );
        assert!(ToolState::Created.path_from(ToolState::Published).is_empty());
        assert!(ToolState::Created.path_from(ToolState::Created).is_empty());
    }

    #[test_case("Approved", ToolState::Approved)]
    #[test_case(" published ", ToolState::Published)]
    #[test_case("REGISTERED", ToolState::Registered)]
    fn test_parse_state_labels(label: &str, expected: ToolState) {
        assert_eq!(label.parse::<ToolState>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_state_label() {
        assert!(matches!(
            "Retired".parse::<ToolState>(),
            Err(Error::UnknownToolState(_))
        ));
    }

    #[test]
    fn test_only_approval_needs_confirmation() {
        let confirmed: Vec<_> = ToolState::ALL
            .iter()
            .filter(|s| s.requires_confirmation())
            .collect();
        assert_eq!(confirmed, vec![&ToolState::Approved]);
    }

    #[test_case("1.0", "1.01")]
    #[test_case("2.5", "2.51")]
    #[test_case("dev", "1700000000")]
    #[test_case("", "1700000000")]
    fn test_next_approval_version(current: &str, expected: &str) {
        assert_eq!(next_approval_version(current, 1_700_000_000), expected);
    }
}
