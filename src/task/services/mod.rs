//! Application services for task lifecycle orchestration.

mod approval;
pub mod metrics;
mod producer;
mod reconciler;
mod scheduler;
mod submission;

pub use approval::{ApprovalError, ApprovalResult, ApprovalService};
pub use metrics::{MetricsPolicy, Observation, aggregate, collect_snapshot, observe_store};
pub use producer::{Producer, RecentKeys};
pub use reconciler::{
    Collaborators, PassReport, PassStatus, ReconcileError, ReconcilePolicy, ReconcileResult,
    Reconciler,
};
pub use scheduler::Scheduler;
pub use submission::{SubmissionError, SubmissionResult, SubmissionService, SubmitRequest};
