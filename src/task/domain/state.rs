//! Lifecycle states and the transition table.

use super::{ParseTaskStateError, TransitionGuard};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle state.
///
/// Each state corresponds to one storage partition. A record's partition is
/// its state; there is no separate state field that could drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Newly produced, awaiting routing.
    NeedsAction,
    /// Awaiting a human or policy decision.
    PendingApproval,
    /// Approved, awaiting execution.
    Approved,
    /// Rejected, awaiting archival.
    Rejected,
    /// Completed. Terminal.
    Done,
    /// Rejected and archived. Terminal.
    RejectedArchive,
}

impl TaskState {
    /// Every lifecycle state, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::NeedsAction,
        Self::PendingApproval,
        Self::Approved,
        Self::Rejected,
        Self::Done,
        Self::RejectedArchive,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeedsAction => "needs_action",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Done => "done",
            Self::RejectedArchive => "rejected_archive",
        }
    }

    /// Returns the vault folder name holding records in this state.
    #[must_use]
    pub const fn partition_name(self) -> &'static str {
        match self {
            Self::NeedsAction => "Needs_Action",
            Self::PendingApproval => "Pending_Approval",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Done => "Done",
            Self::RejectedArchive => "Rejected_Archive",
        }
    }

    /// Returns `true` when the state has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::RejectedArchive)
    }

    /// Returns `true` for states whose records still await resolution.
    #[must_use]
    pub const fn is_unresolved(self) -> bool {
        matches!(
            self,
            Self::NeedsAction | Self::PendingApproval | Self::Approved
        )
    }

    /// Returns the guard attached to the transition `self -> target`, or
    /// `None` when the transition is not permitted.
    #[must_use]
    pub const fn guard(self, target: Self) -> Option<TransitionGuard> {
        match (self, target) {
            (Self::NeedsAction, Self::Done) | (Self::Approved, Self::Done) => {
                Some(TransitionGuard::ExecutionSucceeded)
            }
            (Self::NeedsAction, Self::PendingApproval) => Some(TransitionGuard::Classified),
            (Self::PendingApproval, Self::Approved | Self::Rejected) => {
                Some(TransitionGuard::ExternalDecision)
            }
            (Self::Rejected, Self::RejectedArchive) => Some(TransitionGuard::Unconditional),
            _ => None,
        }
    }

    /// Returns whether the transition `self -> target` is permitted.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        self.guard(target).is_some()
    }

    /// Returns every state reachable in one transition.
    #[must_use]
    pub fn successors(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }
}

impl TryFrom<&str> for TaskState {
    type Error = ParseTaskStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseTaskStateError(value.to_owned()))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
