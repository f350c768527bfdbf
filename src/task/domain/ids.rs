//! Identifier and validated scalar types for the task domain.

use super::TaskDomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest bytes kept for the suffix (eight hexadecimal characters).
const SUFFIX_BYTES: usize = 4;

/// Upper bound on identifier length so identifiers stay usable as file names.
const MAX_ID_LEN: usize = 128;

/// Stable identifier of a task record.
///
/// Generated identifiers have the form `<yyyyMMddTHHmmssSSSZ>-<suffix>`,
/// where the suffix is a SHA-256 prefix of the record content. Identical
/// content submitted at the same instant therefore gets the same identifier
/// and is rejected by the store as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Derives an identifier from the creation instant and record content.
    #[must_use]
    pub fn generate(created_at: DateTime<Utc>, content: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in content {
            hasher.update(part.as_bytes());
            // Separator keeps ("ab", "c") and ("a", "bc") apart.
            hasher.update([0x1f]);
        }
        hasher.update(created_at.timestamp_millis().to_string());
        let digest = hasher.finalize();

        let suffix: String = digest
            .iter()
            .take(SUFFIX_BYTES)
            .map(|byte| format!("{byte:02x}"))
            .collect();

        Self(format!(
            "{}-{suffix}",
            created_at.format("%Y%m%dT%H%M%S%3fZ")
        ))
    }

    /// Parses a persisted identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskId`] when the value is empty,
    /// longer than 128 characters, starts with `.` or `-`, or contains
    /// characters other than ASCII letters, digits, `-`, and `_`.
    pub fn parse(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let is_valid = !raw.is_empty()
            && raw.len() <= MAX_ID_LEN
            && !raw.starts_with(['.', '-'])
            && raw
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(TaskDomainError::InvalidTaskId(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Categorical tag naming the producer of a task (`mail`, `file_drop`, ...).
///
/// The set is open: unknown kinds are valid and handled generically.
/// Values are trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKind(String);

impl TaskKind {
    /// Creates a validated task kind.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidKind`] when the value is empty after
    /// trimming or contains a line break.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        if normalized.is_empty() || normalized.contains(['\n', '\r']) {
            return Err(TaskDomainError::InvalidKind(raw));
        }
        Ok(Self(normalized.to_ascii_lowercase()))
    }

    /// Returns the kind as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskKind {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskKind> for String {
    fn from(value: TaskKind) -> Self {
        value.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
