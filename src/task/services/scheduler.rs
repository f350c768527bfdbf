//! Periodic driver for reconciliation passes.

use super::reconciler::{PassStatus, Reconciler};
use crate::task::ports::TaskStore;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Shortest interval the scheduler accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Runs a pass on every tick until cancelled.
///
/// Ticks missed while a pass runs are dropped rather than replayed, so a
/// slow pass never causes a burst of catch-up passes.
pub struct Scheduler<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    reconciler: Arc<Reconciler<S, C>>,
    period: Duration,
}

impl<S, C> Scheduler<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a scheduler firing every `period`.
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler<S, C>>, period: Duration) -> Self {
        Self {
            reconciler,
            period: period.max(MIN_INTERVAL),
        }
    }

    /// Returns the reconciler driven by this scheduler.
    #[must_use]
    pub const fn reconciler(&self) -> &Arc<Reconciler<S, C>> {
        &self.reconciler
    }

    /// Runs passes until `cancel` fires and returns the number of completed
    /// passes.
    ///
    /// A pass aborted because the store is unavailable is logged and the
    /// next tick tries again.
    pub async fn run(&self, cancel: &CancellationToken) -> u64 {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut completed = 0_u64;
        info!(period = ?self.period, "reconciliation scheduler started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.reconciler.run_pass(cancel).await {
                        Ok(report) if report.status == PassStatus::Completed => {
                            completed = completed.saturating_add(1);
                        }
                        Ok(report) => debug!(status = ?report.status, "pass did not complete"),
                        Err(err) => error!(error = %err, "reconciliation pass aborted"),
                    }
                }
            }
        }

        info!(completed, "reconciliation scheduler stopped");
        completed
    }
}
