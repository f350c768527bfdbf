//! In-memory action log.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::task::ports::{ActionEvent, ActionLog, ActionLogEntry, ActionLogError};

/// Thread-safe in-memory action log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActionLog {
    entries: Arc<RwLock<Vec<ActionLogEntry>>>,
}

impl InMemoryActionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entry in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<ActionLogEntry> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Returns the events recorded for `key` in append order.
    #[must_use]
    pub fn events_for(&self, key: &str) -> Vec<ActionEvent> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.key == key)
            .map(|entry| entry.event)
            .collect()
    }
}

#[async_trait]
impl ActionLog for InMemoryActionLog {
    async fn append(&self, entry: &ActionLogEntry) -> Result<(), ActionLogError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|err| ActionLogError::unavailable(std::io::Error::other(err.to_string())))?;
        entries.push(entry.clone());
        Ok(())
    }
}
