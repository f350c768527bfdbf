//! Advisory task priority.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task priority.
///
/// Priority orders work and feeds reporting. It never decides whether an
/// action needs approval.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Parses a priority, falling back to [`Priority::Medium`] when the value
    /// is absent or unrecognized.
    #[must_use]
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Medium,
        }
    }

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
