//! Idempotent reconciliation pass over the task store.
//!
//! A pass drains `approved` into `done`, archives `rejected`, routes
//! `needs_action`, then recomputes and publishes the aggregate snapshot.
//! Every move is a single atomic store operation, so a pass interrupted at
//! any point between records leaves the store valid, and running it again
//! finishes the work.

use super::metrics::{MetricsPolicy, Observation, aggregate, observe_store};
use crate::task::{
    domain::{
        Classification, PublishedSnapshot, TaskDomainError, TaskRecord, TaskState,
        TransitionGuard, fail_safe,
    },
    ports::{
        ActionEvent, ActionExecutor, ActionLog, ActionLogEntry, DecisionCollaborator,
        DecisionError, ExecutionError, MoveOutcome, RecordHandle, SnapshotSink, TaskStore,
        TaskStoreError,
    },
};
use mockable::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Service-level errors for reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The store could not be enumerated; the pass was aborted.
    #[error("task store unavailable, pass aborted: {0}")]
    StoreUnavailable(#[source] TaskStoreError),

    /// A per-record store operation failed.
    #[error(transparent)]
    Record(#[from] TaskStoreError),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// The engine attempted a transition whose guard it does not hold.
    #[error("transition {from} -> {to} is not permitted for the engine")]
    GuardNotSatisfied {
        /// Current partition.
        from: TaskState,
        /// Requested partition.
        to: TaskState,
    },
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// External collaborators consulted during a pass.
#[derive(Clone)]
pub struct Collaborators {
    /// Routes `needs_action` records.
    pub decision: Arc<dyn DecisionCollaborator>,
    /// Carries out approved and auto-executable actions.
    pub executor: Arc<dyn ActionExecutor>,
    /// Durable audit trail.
    pub action_log: Arc<dyn ActionLog>,
    /// Receives every completed snapshot.
    pub snapshot_sink: Arc<dyn SnapshotSink>,
}

/// Tunables for a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Upper bound on each classification and execution call.
    pub collaborator_timeout: Duration,
    /// Thresholds for the aggregate snapshot and stall detection.
    pub metrics: MetricsPolicy,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            collaborator_timeout: Duration::from_secs(30),
            metrics: MetricsPolicy::default(),
        }
    }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PassStatus {
    /// Every step ran and the snapshot was published.
    #[default]
    Completed,
    /// Another pass was in flight; nothing ran.
    Skipped,
    /// Cancellation stopped the pass between records.
    Cancelled,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pass sequence number; zero for skipped passes.
    pub pass: u64,
    /// How the pass ended.
    pub status: PassStatus,
    /// Records moved between partitions.
    pub moved: usize,
    /// Actions executed successfully.
    pub executed: usize,
    /// Moves lost to a concurrent actor.
    pub conflicts: usize,
    /// Failed execution attempts.
    pub failures: usize,
    /// Records newly quarantined as corrupt.
    pub quarantined: usize,
    /// Classifications that fell back to approval.
    pub degraded: usize,
    /// Per-record errors that were isolated.
    pub errors: usize,
}

impl PassReport {
    fn skipped() -> Self {
        Self {
            status: PassStatus::Skipped,
            ..Self::default()
        }
    }

    /// Returns `true` when the pass changed nothing in the store.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.moved == 0
            && self.executed == 0
            && self.failures == 0
            && self.quarantined == 0
            && self.degraded == 0
    }
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight reconciliation engine.
///
/// The latest snapshot is held in a watch channel: the reconciler is its
/// only writer and readers never block it.
pub struct Reconciler<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    collaborators: Collaborators,
    policy: ReconcilePolicy,
    clock: Arc<C>,
    in_flight: AtomicBool,
    passes: AtomicU64,
    published: watch::Sender<Option<PublishedSnapshot>>,
}

impl<S, C> Reconciler<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a reconciler with no published snapshot.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        collaborators: Collaborators,
        policy: ReconcilePolicy,
        clock: Arc<C>,
    ) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            store,
            collaborators,
            policy,
            clock,
            in_flight: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            published,
        }
    }

    /// Returns the snapshot of the most recently completed pass.
    #[must_use]
    pub fn snapshot(&self) -> Option<PublishedSnapshot> {
        self.published.borrow().clone()
    }

    /// Subscribes to snapshots published by future passes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<PublishedSnapshot>> {
        self.published.subscribe()
    }

    /// Runs one pass unless another is already in flight.
    ///
    /// An overlapping invocation returns a [`PassStatus::Skipped`] report
    /// immediately instead of queueing.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::StoreUnavailable`] when a partition cannot
    /// be enumerated. Per-record failures never abort the pass; they are
    /// counted in the report.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> ReconcileResult<PassReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("reconciliation pass already in flight, skipping");
            return Ok(PassReport::skipped());
        };
        let pass = self.passes.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.run_steps(pass, cancel)
            .instrument(info_span!("reconcile_pass", pass))
            .await
    }

    async fn run_steps(&self, pass: u64, cancel: &CancellationToken) -> ReconcileResult<PassReport> {
        let mut report = PassReport {
            pass,
            ..PassReport::default()
        };

        self.drain_approved(&mut report, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(cancelled(report));
        }
        self.archive_rejected(&mut report, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(cancelled(report));
        }
        self.route_needs_action(&mut report, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(cancelled(report));
        }

        let as_of = self.clock.utc();
        let observations = observe_store(&*self.store)
            .await
            .map_err(ReconcileError::StoreUnavailable)?;
        // Partitions the pass never reads are only seen here.
        for observation in &observations {
            if let Observation::Corrupt { handle, reason } = observation {
                let result = self.quarantine(handle, reason, &mut report).await;
                isolate(&mut report, handle, result);
            }
        }
        let snapshot = aggregate(&observations, as_of, &self.policy.metrics);
        let published = PublishedSnapshot {
            pass,
            as_of,
            snapshot,
        };
        if let Err(err) = self.collaborators.snapshot_sink.publish(&published).await {
            warn!(error = %err, "failed to persist snapshot");
        }
        self.published.send_replace(Some(published));

        info!(
            moved = report.moved,
            executed = report.executed,
            conflicts = report.conflicts,
            failures = report.failures,
            quarantined = report.quarantined,
            degraded = report.degraded,
            errors = report.errors,
            "reconciliation pass completed"
        );
        Ok(report)
    }

    async fn list(&self, state: TaskState) -> ReconcileResult<Vec<RecordHandle>> {
        self.store
            .list(state)
            .await
            .map_err(ReconcileError::StoreUnavailable)
    }

    async fn drain_approved(
        &self,
        report: &mut PassReport,
        cancel: &CancellationToken,
    ) -> ReconcileResult<()> {
        for handle in self.list(TaskState::Approved).await? {
            if cancel.is_cancelled() {
                break;
            }
            let result = self.execute_approved(&handle, report).await;
            isolate(report, &handle, result);
        }
        Ok(())
    }

    async fn execute_approved(
        &self,
        handle: &RecordHandle,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        let Some(mut record) = self.read_for_pass(handle, report).await? else {
            return Ok(());
        };
        self.execute_then_complete(handle, &mut record, report).await
    }

    async fn archive_rejected(
        &self,
        report: &mut PassReport,
        cancel: &CancellationToken,
    ) -> ReconcileResult<()> {
        for handle in self.list(TaskState::Rejected).await? {
            if cancel.is_cancelled() {
                break;
            }
            let result = match self.read_for_pass(&handle, report).await {
                Ok(Some(mut record)) => {
                    self.advance(
                        &handle,
                        &mut record,
                        TaskState::RejectedArchive,
                        TransitionGuard::Unconditional,
                        report,
                    )
                    .await
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            isolate(report, &handle, result);
        }
        Ok(())
    }

    async fn route_needs_action(
        &self,
        report: &mut PassReport,
        cancel: &CancellationToken,
    ) -> ReconcileResult<()> {
        let mut pending = Vec::new();
        for handle in self.list(TaskState::NeedsAction).await? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.read_for_pass(&handle, report).await {
                Ok(Some(record)) => pending.push((handle, record)),
                Ok(None) => {}
                Err(err) => isolate(report, &handle, Err(err)),
            }
        }

        // Advisory order only: high priority first, then oldest first.
        pending.sort_by(|(_, left), (_, right)| {
            right
                .priority()
                .cmp(&left.priority())
                .then_with(|| left.created_at().cmp(&right.created_at()))
                .then_with(|| left.id().cmp(right.id()))
        });

        for (handle, mut record) in pending {
            if cancel.is_cancelled() {
                break;
            }
            let result = self.route(&handle, &mut record, report).await;
            isolate(report, &handle, result);
        }
        Ok(())
    }

    async fn route(
        &self,
        handle: &RecordHandle,
        record: &mut TaskRecord,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        let limit = self.policy.collaborator_timeout;
        let answer = timeout(limit, self.collaborators.decision.classify(record))
            .await
            .unwrap_or(Err(DecisionError::Timeout(limit)));
        if let Err(err) = &answer {
            report.degraded += 1;
            warn!(task_id = %record.id(), error = %err, "classification failed, routing to approval");
            self.log(
                handle.key(),
                ActionEvent::ClassificationDegraded {
                    reason: err.to_string(),
                },
            )
            .await;
        }

        match fail_safe(&answer) {
            Classification::RequiresApproval => {
                self.advance(
                    handle,
                    record,
                    TaskState::PendingApproval,
                    TransitionGuard::Classified,
                    report,
                )
                .await
            }
            Classification::AutoExecute => {
                self.execute_then_complete(handle, record, report).await
            }
        }
    }

    async fn execute_then_complete(
        &self,
        handle: &RecordHandle,
        record: &mut TaskRecord,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        let limit = self.policy.collaborator_timeout;
        let outcome = timeout(limit, self.collaborators.executor.execute(record))
            .await
            .unwrap_or(Err(ExecutionError::TimedOut(limit)));
        match outcome {
            Ok(()) => {
                report.executed += 1;
                self.log(
                    handle.key(),
                    ActionEvent::Executed {
                        action: record.action_name().map(str::to_owned),
                    },
                )
                .await;
                self.advance(
                    handle,
                    record,
                    TaskState::Done,
                    TransitionGuard::ExecutionSucceeded,
                    report,
                )
                .await
            }
            Err(err) => self.record_failure(handle, &err, report).await,
        }
    }

    /// Reads a record, quarantining it when corrupt.
    ///
    /// Returns `None` for records that cannot be processed this pass.
    async fn read_for_pass(
        &self,
        handle: &RecordHandle,
        report: &mut PassReport,
    ) -> ReconcileResult<Option<TaskRecord>> {
        match self.store.read(handle).await {
            Ok(record) => Ok(Some(record)),
            Err(TaskStoreError::CorruptRecord { reason, .. }) => {
                self.quarantine(handle, &reason, report).await?;
                Ok(None)
            }
            Err(TaskStoreError::NotFound(_)) => {
                report.conflicts += 1;
                debug!(record = %handle, "record left its partition during the pass");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn quarantine(
        &self,
        handle: &RecordHandle,
        reason: &str,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        let mut annotation = self
            .store
            .annotation(handle.key())
            .await?
            .unwrap_or_default();
        if annotation.quarantine.as_deref() == Some(reason) {
            return Ok(());
        }
        annotation.quarantine = Some(reason.to_owned());
        self.store.annotate(handle.key(), &annotation).await?;
        report.quarantined += 1;
        warn!(record = %handle, reason, "quarantined corrupt record in place");
        self.log(
            handle.key(),
            ActionEvent::Quarantined {
                reason: reason.to_owned(),
            },
        )
        .await;
        Ok(())
    }

    async fn record_failure(
        &self,
        handle: &RecordHandle,
        failure: &ExecutionError,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        let reason = failure.to_string();
        let mut annotation = self
            .store
            .annotation(handle.key())
            .await?
            .unwrap_or_default();
        annotation.consecutive_failures = annotation.consecutive_failures.saturating_add(1);
        annotation.last_failure = Some(reason.clone());
        annotation.last_failure_at = Some(self.clock.utc());
        let newly_stalled = !annotation.stalled
            && annotation.consecutive_failures >= self.policy.metrics.stall_threshold;
        annotation.stalled |= newly_stalled;
        self.store.annotate(handle.key(), &annotation).await?;

        report.failures += 1;
        let consecutive_failures = annotation.consecutive_failures;
        warn!(record = %handle, consecutive_failures, error = %failure, "execution failed, will retry");
        self.log(
            handle.key(),
            ActionEvent::ExecutionFailed {
                reason,
                consecutive_failures,
            },
        )
        .await;
        if newly_stalled {
            warn!(record = %handle, consecutive_failures, "record stalled");
            self.log(
                handle.key(),
                ActionEvent::Stalled {
                    consecutive_failures,
                },
            )
            .await;
        }
        Ok(())
    }

    /// Applies an engine-driven transition whose guard the caller satisfied.
    async fn advance(
        &self,
        handle: &RecordHandle,
        record: &mut TaskRecord,
        to: TaskState,
        satisfied: TransitionGuard,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        let from = handle.state();
        if satisfied == TransitionGuard::ExternalDecision || from.guard(to) != Some(satisfied) {
            return Err(ReconcileError::GuardNotSatisfied { from, to });
        }
        record.transition_to(to, &*self.clock)?;
        match self
            .store
            .move_record(handle, to, record.last_transitioned_at())
            .await?
        {
            MoveOutcome::Moved => {
                report.moved += 1;
                info!(task_id = %record.id(), from = %from, to = %to, "moved record");
                self.log(handle.key(), ActionEvent::Moved { from, to }).await;
                self.store.clear_annotation(handle.key()).await?;
            }
            MoveOutcome::Conflict => {
                report.conflicts += 1;
                debug!(task_id = %record.id(), from = %from, to = %to, "move already handled elsewhere");
            }
        }
        Ok(())
    }

    async fn log(&self, key: &str, event: ActionEvent) {
        let entry = ActionLogEntry::new(self.clock.utc(), key, event);
        if let Err(err) = self.collaborators.action_log.append(&entry).await {
            warn!(key, error = %err, "failed to append action log entry");
        }
    }
}

fn cancelled(mut report: PassReport) -> PassReport {
    report.status = PassStatus::Cancelled;
    info!(moved = report.moved, "reconciliation pass cancelled");
    report
}

fn isolate(report: &mut PassReport, handle: &RecordHandle, result: ReconcileResult<()>) {
    if let Err(err) = result {
        report.errors += 1;
        warn!(record = %handle, error = %err, "record step failed, continuing pass");
    }
}
