//! Delegated execution port.

use crate::task::domain::TaskRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Carries out the action a record requests.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Executes the action described by `record`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the action did not take effect. The
    /// record then stays in its partition and is retried next pass.
    async fn execute(&self, record: &TaskRecord) -> Result<(), ExecutionError>;
}

/// Errors returned by action executors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// The executor reported a failure.
    #[error("execution failed: {0}")]
    Failed(String),

    /// The executor did not finish in time.
    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),
}
