//! Decision collaborator port.

use crate::task::domain::{Classification, TaskRecord};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Decides whether a `needs_action` record may auto-execute.
#[async_trait]
pub trait DecisionCollaborator: Send + Sync {
    /// Classifies the action requested by `record`.
    ///
    /// # Errors
    ///
    /// Any error is treated by callers as
    /// [`Classification::RequiresApproval`].
    async fn classify(&self, record: &TaskRecord) -> Result<Classification, DecisionError>;
}

/// Errors returned by decision collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecisionError {
    /// The collaborator failed to answer.
    #[error("decision collaborator unavailable: {0}")]
    Unavailable(String),

    /// The collaborator did not answer in time.
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),
}
