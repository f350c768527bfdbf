//! Storage port for partitioned, file-per-record task persistence.

use crate::task::domain::{TaskId, TaskRecord, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Addressable reference to one stored record.
///
/// The key is the storage name of the record within its partition. For
/// readable records it equals the record id; corrupt records are still
/// addressable by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHandle {
    state: TaskState,
    key: String,
}

impl RecordHandle {
    /// Creates a handle for the record stored under `key` in `state`.
    #[must_use]
    pub fn new(state: TaskState, key: impl Into<String>) -> Self {
        Self {
            state,
            key: key.into(),
        }
    }

    /// Returns the partition the record was enumerated from.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.state, self.key)
    }
}

/// Outcome of an atomic move between partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The record now resides in the target partition.
    Moved,
    /// The record was not in the source partition, or the target already
    /// holds it. Another actor handled it first.
    Conflict,
}

/// Per-record bookkeeping kept beside, not inside, the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAnnotation {
    /// Execution failures since the last successful transition.
    pub consecutive_failures: u32,
    /// Reason reported by the latest failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
    /// Instant of the latest failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Set once the failure count reached the stall threshold.
    #[serde(default)]
    pub stalled: bool,
    /// Parse failure that quarantined the record in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine: Option<String>,
}

/// Durable storage partitioned by lifecycle state.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Enumerates the records in a partition in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unavailable`] when the partition cannot be
    /// enumerated.
    async fn list(&self, state: TaskState) -> TaskStoreResult<Vec<RecordHandle>>;

    /// Reads the record behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::CorruptRecord`] when the stored
    /// representation cannot be parsed and [`TaskStoreError::NotFound`] when
    /// the record left the partition after enumeration.
    async fn read(&self, handle: &RecordHandle) -> TaskStoreResult<TaskRecord>;

    /// Atomically moves the record from the handle's partition to `to`,
    /// stamping `transitioned_at` as its latest transition instant.
    ///
    /// Returns [`MoveOutcome::Conflict`] instead of creating a second copy
    /// when the record is no longer in the source partition or the target
    /// already holds it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unavailable`] when the storage medium fails.
    async fn move_record(
        &self,
        handle: &RecordHandle,
        to: TaskState,
        transitioned_at: DateTime<Utc>,
    ) -> TaskStoreResult<MoveOutcome>;

    /// Stores a new record in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateId`] when a record with the same
    /// id exists in any partition.
    async fn create(&self, state: TaskState, record: &TaskRecord) -> TaskStoreResult<RecordHandle>;

    /// Locates the record with `id` in any partition.
    ///
    /// Returns `None` when no partition holds it.
    async fn find(&self, id: &TaskId) -> TaskStoreResult<Option<RecordHandle>>;

    /// Returns the annotation stored for `key`, if any.
    async fn annotation(&self, key: &str) -> TaskStoreResult<Option<RecordAnnotation>>;

    /// Replaces the annotation stored for `key`.
    async fn annotate(&self, key: &str, annotation: &RecordAnnotation) -> TaskStoreResult<()>;

    /// Removes the annotation stored for `key`. Missing annotations are
    /// ignored.
    async fn clear_annotation(&self, key: &str) -> TaskStoreResult<()>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A record with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateId(TaskId),

    /// The stored representation cannot be parsed.
    #[error("corrupt record {handle}: {reason}")]
    CorruptRecord {
        /// Handle of the unreadable record.
        handle: RecordHandle,
        /// Parse failure description.
        reason: String,
    },

    /// The record is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The storage medium cannot be reached.
    #[error("task store unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a storage-medium error.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }

    /// Creates a corrupt-record error for `handle`.
    pub fn corrupt(handle: &RecordHandle, reason: impl fmt::Display) -> Self {
        Self::CorruptRecord {
            handle: handle.clone(),
            reason: reason.to_string(),
        }
    }
}
