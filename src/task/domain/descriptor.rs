//! Structured action metadata attached to a task.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key naming the requested action.
const NAME_KEY: &str = "name";

/// Free-form description of the action a task requests or took.
///
/// Keys follow `[a-z0-9_-]+`; values are single trimmed lines. The `name`
/// entry, when present, is the action name approvers and classifiers read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionDescriptor(BTreeMap<String, String>);

impl ActionDescriptor {
    /// Creates a descriptor naming the requested action.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidDescriptorValue`] when the name
    /// spans several lines.
    pub fn new(name: impl Into<String>) -> Result<Self, TaskDomainError> {
        Self::default().with(NAME_KEY, name)
    }

    /// Adds or replaces an entry.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidDescriptorKey`] or
    /// [`TaskDomainError::InvalidDescriptorValue`] when the entry does not
    /// follow the descriptor grammar.
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, TaskDomainError> {
        let key_raw = key.into();
        let is_valid_key = !key_raw.is_empty()
            && key_raw
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
        if !is_valid_key {
            return Err(TaskDomainError::InvalidDescriptorKey(key_raw));
        }

        let value_raw = value.into();
        if value_raw.contains(['\n', '\r']) {
            return Err(TaskDomainError::InvalidDescriptorValue { key: key_raw });
        }
        self.0.insert(key_raw, value_raw.trim().to_owned());
        Ok(self)
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the requested action name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_KEY).filter(|name| !name.is_empty())
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Returns `true` when the descriptor has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
