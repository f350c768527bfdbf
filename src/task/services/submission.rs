//! Producer-facing task submission.

use crate::task::{
    domain::{
        ActionDescriptor, NewTask, Priority, TaskDomainError, TaskId, TaskKind, TaskRecord,
        TaskState,
    },
    ports::{ActionEvent, ActionLog, ActionLogEntry, TaskStore, TaskStoreError},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Request payload for submitting a new work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    kind: String,
    priority: Priority,
    body: String,
    action_descriptor: Option<ActionDescriptor>,
    expires_at: Option<DateTime<Utc>>,
}

impl SubmitRequest {
    /// Creates a medium-priority request with the required fields.
    #[must_use]
    pub fn new(kind: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            priority: Priority::default(),
            body: body.into(),
            action_descriptor: None,
            expires_at: None,
        }
    }

    /// Sets the advisory priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches the requested action.
    #[must_use]
    pub fn with_action(mut self, descriptor: ActionDescriptor) -> Self {
        self.action_descriptor = Some(descriptor);
        self
    }

    /// Sets the instant after which a pending approval counts as expired.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Service-level errors for task submission.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

impl SubmissionError {
    /// Returns the colliding identifier when the store rejected a duplicate.
    #[must_use]
    pub const fn duplicate_id(&self) -> Option<&TaskId> {
        match self {
            Self::Store(TaskStoreError::DuplicateId(id)) => Some(id),
            _ => None,
        }
    }
}

/// Result type for submission operations.
pub type SubmissionResult<T> = Result<T, SubmissionError>;

/// Creates new records in the `needs_action` partition.
pub struct SubmissionService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    action_log: Arc<dyn ActionLog>,
    clock: Arc<C>,
}

// `S` and `C` need not be `Clone`.
impl<S, C> Clone for SubmissionService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            action_log: Arc::clone(&self.action_log),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> SubmissionService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a new submission service.
    #[must_use]
    pub const fn new(store: Arc<S>, action_log: Arc<dyn ActionLog>, clock: Arc<C>) -> Self {
        Self {
            store,
            action_log,
            clock,
        }
    }

    /// Submits a work item and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::Domain`] when the kind is invalid and
    /// [`SubmissionError::Store`] wrapping [`TaskStoreError::DuplicateId`]
    /// when a record with the same identifier already exists.
    pub async fn submit(&self, request: SubmitRequest) -> SubmissionResult<TaskId> {
        let record = TaskRecord::new_submission(
            NewTask {
                kind: TaskKind::new(request.kind)?,
                priority: request.priority,
                body: request.body,
                action_descriptor: request.action_descriptor,
                expires_at: request.expires_at,
            },
            &*self.clock,
        );
        self.store.create(TaskState::NeedsAction, &record).await?;
        info!(
            task_id = %record.id(),
            kind = %record.kind(),
            priority = %record.priority(),
            "submitted task"
        );

        let entry = ActionLogEntry::new(
            record.created_at(),
            record.id().as_str(),
            ActionEvent::Submitted {
                kind: record.kind().to_string(),
                priority: record.priority(),
            },
        );
        if let Err(err) = self.action_log.append(&entry).await {
            warn!(task_id = %record.id(), error = %err, "failed to log submission");
        }
        Ok(record.id().clone())
    }
}
