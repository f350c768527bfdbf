//! Append-only action log port.
//!
//! The action log is the durable audit trail of the engine. It is separate
//! from diagnostic tracing output and entries are never rewritten.

use crate::task::domain::{Priority, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// One action log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// Instant the event happened.
    pub at: DateTime<Utc>,
    /// Storage key of the record the event concerns.
    pub key: String,
    /// What happened.
    #[serde(flatten)]
    pub event: ActionEvent,
}

impl ActionLogEntry {
    /// Creates an entry for the record stored under `key`.
    #[must_use]
    pub fn new(at: DateTime<Utc>, key: impl Into<String>, event: ActionEvent) -> Self {
        Self {
            at,
            key: key.into(),
            event,
        }
    }
}

/// Events recorded in the action log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActionEvent {
    /// A producer created the record.
    Submitted {
        /// Producing source.
        kind: String,
        /// Advisory priority.
        priority: Priority,
    },
    /// The record moved between partitions.
    Moved {
        /// Source partition.
        from: TaskState,
        /// Target partition.
        to: TaskState,
    },
    /// The requested action was carried out.
    Executed {
        /// Action name, when the descriptor carries one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
    /// Execution failed; the record stays in place.
    ExecutionFailed {
        /// Failure description.
        reason: String,
        /// Failures since the last successful transition.
        consecutive_failures: u32,
    },
    /// The stall threshold was reached.
    Stalled {
        /// Failures since the last successful transition.
        consecutive_failures: u32,
    },
    /// Classification failed and routed the record toward approval.
    ClassificationDegraded {
        /// Collaborator error.
        reason: String,
    },
    /// The record could not be parsed and was left in place.
    Quarantined {
        /// Parse failure description.
        reason: String,
    },
}

/// Durable, append-only audit trail keyed by record.
#[async_trait]
pub trait ActionLog: Send + Sync {
    /// Appends `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionLogError`] when the entry cannot be made durable.
    async fn append(&self, entry: &ActionLogEntry) -> Result<(), ActionLogError>;
}

/// Errors returned by action log implementations.
#[derive(Debug, Clone, Error)]
pub enum ActionLogError {
    /// The entry could not be serialized.
    #[error("action log entry could not be encoded: {0}")]
    Encoding(String),

    /// The log medium failed.
    #[error("action log unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl ActionLogError {
    /// Wraps a log-medium error.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }
}
