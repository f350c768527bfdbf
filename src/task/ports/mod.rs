//! Port contracts for task lifecycle management.
//!
//! Ports define infrastructure-agnostic interfaces used by task services:
//! durable storage, the decision and execution collaborators, the
//! append-only action log, and the snapshot publication sink.

pub mod action_log;
pub mod decision;
pub mod execution;
pub mod snapshot;
pub mod store;

pub use action_log::{ActionEvent, ActionLog, ActionLogEntry, ActionLogError};
pub use decision::{DecisionCollaborator, DecisionError};
pub use execution::{ActionExecutor, ExecutionError};
pub use snapshot::{SnapshotSink, SnapshotSinkError};
pub use store::{
    MoveOutcome, RecordAnnotation, RecordHandle, TaskStore, TaskStoreError, TaskStoreResult,
};
