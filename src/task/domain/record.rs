//! Task record aggregate root.

use super::{ActionDescriptor, Priority, TaskDomainError, TaskId, TaskKind, TaskState};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use mockable::Clock;

/// Timestamps are kept at millisecond precision, matching the record header.
const TIMESTAMP_DIGITS: u16 = 3;

/// Parameter object describing a task submitted by a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Producing source.
    pub kind: TaskKind,
    /// Advisory priority.
    pub priority: Priority,
    /// Human-readable substance of the item.
    pub body: String,
    /// Requested action, if any.
    pub action_descriptor: Option<ActionDescriptor>,
    /// Instant after which a pending approval is considered expired.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task record.
///
/// The state is not part of the persisted data: it comes from the partition
/// the record was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted producing source.
    pub kind: TaskKind,
    /// Persisted priority.
    pub priority: Priority,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest transition timestamp.
    pub last_transitioned_at: DateTime<Utc>,
    /// Persisted approval expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// Persisted action descriptor, if any.
    pub action_descriptor: Option<ActionDescriptor>,
    /// Persisted body.
    pub body: String,
}

/// Task record aggregate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    id: TaskId,
    kind: TaskKind,
    priority: Priority,
    state: TaskState,
    created_at: DateTime<Utc>,
    last_transitioned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    action_descriptor: Option<ActionDescriptor>,
    body: String,
}

impl TaskRecord {
    /// Creates a `needs_action` record from a producer submission.
    #[must_use]
    pub fn new_submission(task: NewTask, clock: &impl Clock) -> Self {
        let created_at = clock.utc().trunc_subsecs(TIMESTAMP_DIGITS);
        let expires_at = task
            .expires_at
            .map(|instant| instant.trunc_subsecs(TIMESTAMP_DIGITS));
        let descriptor_text = task
            .action_descriptor
            .as_ref()
            .map(|descriptor| {
                descriptor
                    .iter()
                    .map(|(key, value)| format!("{key}={value}\n"))
                    .collect::<String>()
            })
            .unwrap_or_default();
        let expiry_text = expires_at.map(|instant| instant.to_rfc3339()).unwrap_or_default();
        let id = TaskId::generate(
            created_at,
            &[
                task.kind.as_str(),
                task.priority.as_str(),
                &task.body,
                &descriptor_text,
                &expiry_text,
            ],
        );

        Self {
            id,
            kind: task.kind,
            priority: task.priority,
            state: TaskState::NeedsAction,
            created_at,
            last_transitioned_at: created_at,
            expires_at,
            action_descriptor: task.action_descriptor.filter(|d| !d.is_empty()),
            body: task.body,
        }
    }

    /// Reconstructs a record read from the partition holding `state`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TimestampRegression`] when the persisted
    /// transition timestamp precedes the creation timestamp.
    pub fn from_persisted(
        data: PersistedTaskData,
        state: TaskState,
    ) -> Result<Self, TaskDomainError> {
        if data.last_transitioned_at < data.created_at {
            return Err(TaskDomainError::TimestampRegression(data.id));
        }
        Ok(Self {
            id: data.id,
            kind: data.kind,
            priority: data.priority,
            state,
            created_at: data.created_at,
            last_transitioned_at: data.last_transitioned_at,
            expires_at: data.expires_at,
            action_descriptor: data.action_descriptor.filter(|d| !d.is_empty()),
            body: data.body,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the producing source.
    #[must_use]
    pub const fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Returns the advisory priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest transition timestamp.
    #[must_use]
    pub const fn last_transitioned_at(&self) -> DateTime<Utc> {
        self.last_transitioned_at
    }

    /// Returns the approval expiry, if any.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns the action descriptor, if any.
    #[must_use]
    pub const fn action_descriptor(&self) -> Option<&ActionDescriptor> {
        self.action_descriptor.as_ref()
    }

    /// Returns the requested action name, if any.
    #[must_use]
    pub fn action_name(&self) -> Option<&str> {
        self.action_descriptor.as_ref().and_then(ActionDescriptor::name)
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns `true` when the record carries an expiry that lies before
    /// `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now > expiry)
    }

    /// Returns how long the record has been in its current state.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        (now - self.last_transitioned_at).max(TimeDelta::zero())
    }

    /// Raises the transition timestamp to `observed` when that is later.
    ///
    /// Storage adapters use this when they keep the latest transition
    /// instant outside the record header.
    pub fn observe_transition(&mut self, observed: DateTime<Utc>) {
        let truncated = observed.trunc_subsecs(TIMESTAMP_DIGITS);
        if truncated > self.last_transitioned_at {
            self.last_transitioned_at = truncated;
        }
    }

    /// Transitions the record to `target`, stamping a transition timestamp
    /// that never decreases.
    ///
    /// Guard conditions are the caller's responsibility; this only enforces
    /// the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the table
    /// does not permit the transition. The record is left unchanged.
    pub fn transition_to(
        &mut self,
        target: TaskState,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if !self.state.can_transition_to(target) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id.clone(),
                from: self.state,
                to: target,
            });
        }
        let now = clock.utc().trunc_subsecs(TIMESTAMP_DIGITS);
        self.last_transitioned_at = now.max(self.last_transitioned_at);
        self.state = target;
        Ok(())
    }
}
