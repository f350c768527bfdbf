//! Snapshot file at the vault root.

use super::{VaultLayout, layout::SNAPSHOT_FILE, run_blocking_with, write_atomic};
use crate::task::{
    domain::PublishedSnapshot,
    ports::{SnapshotSink, SnapshotSinkError},
};
use async_trait::async_trait;
use std::io;

/// Publishes the aggregate snapshot as `Snapshot.json`, replacing it
/// atomically so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct FileSnapshotSink {
    layout: VaultLayout,
}

impl FileSnapshotSink {
    /// Creates a sink over an opened vault.
    #[must_use]
    pub const fn new(layout: VaultLayout) -> Self {
        Self { layout }
    }

    /// Loads the most recently published snapshot.
    ///
    /// Returns `None` before the first pass completed.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotSinkError`] when the file cannot be read or parsed.
    pub async fn load(&self) -> Result<Option<PublishedSnapshot>, SnapshotSinkError> {
        let layout = self.layout.clone();
        run_blocking_with(
            move || {
                let text = match layout.root().read_to_string(SNAPSHOT_FILE) {
                    Ok(text) => text,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
                    Err(err) => return Err(SnapshotSinkError::unavailable(err)),
                };
                serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|err| SnapshotSinkError::Encoding(err.to_string()))
            },
            SnapshotSinkError::unavailable,
        )
        .await
    }
}

#[async_trait]
impl SnapshotSink for FileSnapshotSink {
    async fn publish(&self, snapshot: &PublishedSnapshot) -> Result<(), SnapshotSinkError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| SnapshotSinkError::Encoding(err.to_string()))?;
        let layout = self.layout.clone();
        run_blocking_with(
            move || {
                write_atomic(layout.root(), SNAPSHOT_FILE, &json)
                    .map_err(SnapshotSinkError::unavailable)
            },
            SnapshotSinkError::unavailable,
        )
        .await
    }
}
