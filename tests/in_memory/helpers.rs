//! Shared harness for in-memory lifecycle integration tests.

use crate::test_helpers::{ManualClock, epoch};
use async_trait::async_trait;
use rstest::fixture;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use steward::task::{
    adapters::{
        HandbookClassifier,
        memory::{InMemoryActionLog, InMemorySnapshotSink, InMemoryTaskStore},
    },
    domain::{ActionDescriptor, Priority, TaskId, TaskRecord, TaskState},
    ports::{ActionExecutor, ExecutionError},
    services::{
        ApprovalService, Collaborators, PassReport, ReconcilePolicy, Reconciler,
        SubmissionService, SubmitRequest,
    },
};
use tokio_util::sync::CancellationToken;

/// Reconciler type used by the harness.
pub type TestReconciler = Reconciler<InMemoryTaskStore, ManualClock>;

/// Executor that records every call and can be scripted to fail or cancel.
#[derive(Default)]
pub struct CountingExecutor {
    calls: Mutex<Vec<TaskId>>,
    failures_left: AtomicU32,
    cancel_on_call: Option<CancellationToken>,
}

impl CountingExecutor {
    /// Creates an executor that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor whose first `failures` calls fail.
    #[must_use]
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    /// Creates an executor that cancels `token` on every call.
    #[must_use]
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some(token),
            ..Self::default()
        }
    }

    /// Returns how many times `id` was executed.
    #[must_use]
    pub fn calls_for(&self, id: &TaskId) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|called| *called == id)
            .count()
    }

    /// Returns the total number of execution attempts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl ActionExecutor for CountingExecutor {
    async fn execute(&self, record: &TaskRecord) -> Result<(), ExecutionError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(record.id().clone());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            Err(ExecutionError::Failed("scripted failure".to_owned()))
        } else {
            Ok(())
        }
    }
}

/// Fully wired engine over the in-memory adapters.
pub struct Engine {
    /// Task store shared by every service.
    pub store: Arc<InMemoryTaskStore>,
    /// Action log shared by every service.
    pub log: Arc<InMemoryActionLog>,
    /// Snapshot sink fed by the reconciler.
    pub sink: Arc<InMemorySnapshotSink>,
    /// Clock shared by every service.
    pub clock: Arc<ManualClock>,
    /// Executor double.
    pub executor: Arc<CountingExecutor>,
    /// Reconciliation engine.
    pub reconciler: Arc<TestReconciler>,
    /// Submission interface.
    pub submission: SubmissionService<InMemoryTaskStore, ManualClock>,
    /// Approval interface.
    pub approval: ApprovalService<InMemoryTaskStore, ManualClock>,
}

impl Engine {
    /// Wires an engine around `executor` with the handbook classifier.
    #[must_use]
    pub fn with_executor(executor: CountingExecutor) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let log = Arc::new(InMemoryActionLog::new());
        let sink = Arc::new(InMemorySnapshotSink::new());
        let clock = Arc::new(ManualClock::at(epoch()));
        let executor = Arc::new(executor);
        let collaborators = Collaborators {
            decision: Arc::new(HandbookClassifier::new()),
            executor: executor.clone(),
            action_log: log.clone(),
            snapshot_sink: sink.clone(),
        };
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            collaborators,
            ReconcilePolicy::default(),
            Arc::clone(&clock),
        ));
        let submission =
            SubmissionService::new(Arc::clone(&store), log.clone(), Arc::clone(&clock));
        let approval = ApprovalService::new(Arc::clone(&store), log.clone(), Arc::clone(&clock));
        Self {
            store,
            log,
            sink,
            clock,
            executor,
            reconciler,
            submission,
            approval,
        }
    }

    /// Submits a `mail` item with an optional action name.
    pub async fn submit(&self, body: &str, action: Option<&str>) -> TaskId {
        self.submit_with(body, action, Priority::Medium).await
    }

    /// Submits a `mail` item with the given priority.
    pub async fn submit_with(&self, body: &str, action: Option<&str>, priority: Priority) -> TaskId {
        let mut request = SubmitRequest::new("mail", body).with_priority(priority);
        if let Some(name) = action {
            request = request.with_action(ActionDescriptor::new(name).expect("valid action"));
        }
        self.submission
            .submit(request)
            .await
            .expect("submission should succeed")
    }

    /// Runs one pass and expects it to succeed.
    pub async fn pass(&self) -> PassReport {
        self.reconciler
            .run_pass(&CancellationToken::new())
            .await
            .expect("pass should succeed")
    }

    /// Returns every partition holding `id`.
    #[must_use]
    pub fn partitions_holding(&self, id: &TaskId) -> Vec<TaskState> {
        TaskState::ALL
            .into_iter()
            .filter(|state| {
                self.store
                    .keys(*state)
                    .expect("in-memory store is available")
                    .iter()
                    .any(|key| key == id.as_str())
            })
            .collect()
    }

    /// Returns the single partition holding `id`.
    #[must_use]
    pub fn state_of(&self, id: &TaskId) -> TaskState {
        let holding = self.partitions_holding(id);
        assert_eq!(holding.len(), 1, "{id} held by {holding:?}");
        *holding.first().expect("one partition")
    }
}

/// Provides an engine whose executor always succeeds.
#[fixture]
pub fn engine() -> Engine {
    Engine::with_executor(CountingExecutor::new())
}
