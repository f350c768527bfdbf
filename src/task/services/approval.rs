//! Approval interface for human and policy actors.

use crate::task::{
    domain::{TaskDomainError, TaskId, TaskRecord, TaskState, TransitionGuard},
    ports::{ActionEvent, ActionLog, ActionLogEntry, MoveOutcome, TaskStore, TaskStoreError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Service-level errors for approval decisions.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No partition holds the record.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The record is not awaiting a decision.
    #[error("task {id} is {state}, not pending approval")]
    NotPending {
        /// Task the decision was requested for.
        id: TaskId,
        /// Partition currently holding it.
        state: TaskState,
    },

    /// Another actor moved the record first.
    #[error("task {0} was moved concurrently")]
    Conflict(TaskId),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;

/// Moves `pending_approval` records into `approved` or `rejected`.
///
/// This is the only externally triggered state mutation besides record
/// creation.
pub struct ApprovalService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    action_log: Arc<dyn ActionLog>,
    clock: Arc<C>,
}

// `S` and `C` need not be `Clone`.
impl<S, C> Clone for ApprovalService<S, C>
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

impl<S, C> ApprovalService<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a new approval service.
    #[must_use]
    pub const fn new(store: Arc<S>, action_log: Arc<dyn ActionLog>, clock: Arc<C>) -> Self {
        Self {
            store,
            action_log,
            clock,
        }
    }

    /// Approves a pending record.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::NotFound`] or [`ApprovalError::NotPending`]
    /// when the record is not awaiting a decision, and
    /// [`ApprovalError::Conflict`] when it was moved concurrently.
    pub async fn approve(&self, id: &TaskId) -> ApprovalResult<TaskRecord> {
        self.decide(id, TaskState::Approved).await
    }

    /// Rejects a pending record.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::approve`].
    pub async fn reject(&self, id: &TaskId) -> ApprovalResult<TaskRecord> {
        self.decide(id, TaskState::Rejected).await
    }

    /// Lists readable records awaiting a decision, oldest first.
    ///
    /// Corrupt records are skipped; the reconciliation snapshot reports
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Store`] when the partition cannot be read.
    pub async fn pending(&self) -> ApprovalResult<Vec<TaskRecord>> {
        let mut records = Vec::new();
        for handle in self.store.list(TaskState::PendingApproval).await? {
            match self.store.read(&handle).await {
                Ok(record) => records.push(record),
                Err(TaskStoreError::CorruptRecord { .. } | TaskStoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        records.sort_by(|left, right| {
            left.created_at()
                .cmp(&right.created_at())
                .then_with(|| left.id().cmp(right.id()))
        });
        Ok(records)
    }

    async fn decide(&self, id: &TaskId, target: TaskState) -> ApprovalResult<TaskRecord> {
        let handle = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(id.clone()))?;
        let from = handle.state();
        if from.guard(target) != Some(TransitionGuard::ExternalDecision) {
            return Err(ApprovalError::NotPending {
                id: id.clone(),
                state: from,
            });
        }

        let mut record = self.store.read(&handle).await?;
        record.transition_to(target, &*self.clock)?;
        match self
            .store
            .move_record(&handle, target, record.last_transitioned_at())
            .await?
        {
            MoveOutcome::Moved => {}
            MoveOutcome::Conflict => return Err(ApprovalError::Conflict(id.clone())),
        }
        info!(task_id = %id, from = %from, to = %target, "recorded approval decision");

        if let Err(err) = self.store.clear_annotation(handle.key()).await {
            warn!(task_id = %id, error = %err, "failed to clear annotation");
        }
        let entry = ActionLogEntry::new(
            record.last_transitioned_at(),
            handle.key(),
            ActionEvent::Moved { from, to: target },
        );
        if let Err(err) = self.action_log.append(&entry).await {
            warn!(task_id = %id, error = %err, "failed to log approval decision");
        }
        Ok(record)
    }
}
