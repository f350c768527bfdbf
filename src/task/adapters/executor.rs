//! Execution adapter that records approved actions without side effects.

use crate::task::{
    domain::TaskRecord,
    ports::{ActionExecutor, ExecutionError},
};
use async_trait::async_trait;
use tracing::info;

/// Executor that journals the action and reports success.
///
/// The engine itself writes the `executed` action log entry; this adapter
/// only traces. Real executors for mail or chat live outside the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalExecutor;

#[async_trait]
impl ActionExecutor for JournalExecutor {
    async fn execute(&self, record: &TaskRecord) -> Result<(), ExecutionError> {
        info!(
            task_id = %record.id(),
            kind = %record.kind(),
            action = record.action_name().unwrap_or("unspecified"),
            "executing task action"
        );
        Ok(())
    }
}
