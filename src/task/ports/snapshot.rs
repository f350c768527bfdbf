//! Snapshot publication port for read-only reporting consumers.

use crate::task::domain::PublishedSnapshot;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Persists the latest aggregate snapshot.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Replaces the published snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotSinkError`] when the snapshot cannot be persisted.
    async fn publish(&self, snapshot: &PublishedSnapshot) -> Result<(), SnapshotSinkError>;
}

/// Errors returned by snapshot sinks.
#[derive(Debug, Clone, Error)]
pub enum SnapshotSinkError {
    /// The snapshot could not be serialized.
    #[error("snapshot could not be encoded: {0}")]
    Encoding(String),

    /// The sink medium failed.
    #[error("snapshot sink unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl SnapshotSinkError {
    /// Wraps a sink-medium error.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
