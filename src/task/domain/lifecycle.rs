//! Transition guards and routing rules for the lifecycle state machine.

use super::TaskState;
use serde::{Deserialize, Serialize};

/// Outcome of consulting the decision collaborator about a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// No external communication, deletion, or irreversible effect.
    AutoExecute,
    /// Sending, deleting, or otherwise irreversible; needs a human decision.
    RequiresApproval,
}

/// Condition that must hold before a permitted transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGuard {
    /// Applied as soon as the record is observed in its source partition.
    Unconditional,
    /// Applied after the decision collaborator routed the record.
    Classified,
    /// Applied only after the delegated execution reported success.
    ExecutionSucceeded,
    /// Applied only by an external approver; the engine never takes it.
    ExternalDecision,
}

/// Returns the target state for a `needs_action` record.
#[must_use]
pub const fn needs_action_target(classification: Classification) -> TaskState {
    match classification {
        Classification::AutoExecute => TaskState::Done,
        Classification::RequiresApproval => TaskState::PendingApproval,
    }
}

/// Collapses a collaborator answer into a classification.
///
/// Any error, including a timeout, routes toward approval and never toward
/// automatic execution.
#[must_use]
pub fn fail_safe<E>(answer: &Result<Classification, E>) -> Classification {
    match answer {
        Ok(classification) => *classification,
        Err(_) => Classification::RequiresApproval,
    }
}
