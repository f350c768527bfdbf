//! Error types for task domain validation and parsing.

use super::{TaskId, TaskState};
use thiserror::Error;

/// Errors returned while constructing domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task identifier is empty or contains characters that cannot be
    /// used in a storage key.
    #[error("invalid task identifier '{0}'")]
    InvalidTaskId(String),

    /// The task kind is empty after trimming or spans several lines.
    #[error("invalid task kind '{0}'")]
    InvalidKind(String),

    /// An action descriptor key does not follow the `[a-z0-9_-]+` grammar.
    #[error("invalid action descriptor key '{0}'")]
    InvalidDescriptorKey(String),

    /// An action descriptor value spans several lines.
    #[error("action descriptor value for '{key}' must be a single line")]
    InvalidDescriptorValue {
        /// Descriptor key whose value was rejected.
        key: String,
    },

    /// `last_transitioned_at` would precede `created_at`.
    #[error("task {0} would transition before it was created")]
    TimestampRegression(TaskId),

    /// The requested state transition is not permitted.
    #[error("invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current task state.
        from: TaskState,
        /// Requested target state.
        to: TaskState,
    },
}

/// Error returned while parsing task states from persistence or user input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task state: {0}")]
pub struct ParseTaskStateError(pub String);
