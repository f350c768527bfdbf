//! In-memory snapshot sink.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::PublishedSnapshot,
    ports::{SnapshotSink, SnapshotSinkError},
};

/// Keeps every published snapshot in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotSink {
    published: Arc<RwLock<Vec<PublishedSnapshot>>>,
}

impl InMemorySnapshotSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently published snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<PublishedSnapshot> {
        self.published
            .read()
            .ok()
            .and_then(|published| published.last().cloned())
    }

    /// Returns how many snapshots were published.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .map(|published| published.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotSink for InMemorySnapshotSink {
    async fn publish(&self, snapshot: &PublishedSnapshot) -> Result<(), SnapshotSinkError> {
        let mut published = self.published.write().map_err(|err| {
            SnapshotSinkError::unavailable(std::io::Error::other(err.to_string()))
        })?;
        published.push(snapshot.clone());
        Ok(())
    }
}
