//! Aggregate metrics derived from a full store enumeration.
//!
//! Nothing here is maintained incrementally: every snapshot is a pure
//! function of the observed partitions, so it cannot drift from them.

use crate::task::{
    domain::{AggregateSnapshot, Bottleneck, BottleneckReason, Priority, TaskRecord, TaskState},
    ports::{RecordAnnotation, RecordHandle, TaskStore, TaskStoreError, TaskStoreResult},
};
use chrono::{DateTime, TimeDelta, Utc};

/// Thresholds applied while deriving bottlenecks and throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsPolicy {
    /// Age past which a `needs_action` record is a bottleneck.
    pub staleness: TimeDelta,
    /// Consecutive execution failures that mark a record stalled.
    pub stall_threshold: u32,
    /// Window counted by [`AggregateSnapshot::completed_in_window`].
    pub throughput_window: TimeDelta,
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        Self {
            staleness: TimeDelta::days(3),
            stall_threshold: 3,
            throughput_window: TimeDelta::hours(24),
        }
    }
}

/// One enumerated record as seen by the metrics view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A readable record and its annotation, if any.
    Record {
        /// The record.
        record: TaskRecord,
        /// Failure bookkeeping kept beside the record.
        annotation: Option<RecordAnnotation>,
    },
    /// A record whose stored form cannot be parsed.
    Corrupt {
        /// Where the record lives.
        handle: RecordHandle,
        /// Parse failure description.
        reason: String,
    },
}

impl Observation {
    const fn state(&self) -> TaskState {
        match self {
            Self::Record { record, .. } => record.state(),
            Self::Corrupt { handle, .. } => handle.state(),
        }
    }
}

/// Derives the aggregate snapshot from a complete set of observations.
#[must_use]
pub fn aggregate(
    observations: &[Observation],
    now: DateTime<Utc>,
    policy: &MetricsPolicy,
) -> AggregateSnapshot {
    let mut snapshot = AggregateSnapshot {
        counts: TaskState::ALL.into_iter().map(|state| (state, 0)).collect(),
        ..AggregateSnapshot::default()
    };

    for observation in observations {
        *snapshot.counts.entry(observation.state()).or_default() += 1;
        match observation {
            Observation::Record { record, annotation } => {
                observe_record(&mut snapshot, record, annotation.as_ref(), now, policy);
            }
            Observation::Corrupt { handle, reason } => snapshot.bottlenecks.push(Bottleneck {
                state: handle.state(),
                key: handle.key().to_owned(),
                reason: BottleneckReason::Corrupt {
                    detail: reason.clone(),
                },
            }),
        }
    }

    snapshot.bottlenecks.sort();
    snapshot
}

fn observe_record(
    snapshot: &mut AggregateSnapshot,
    record: &TaskRecord,
    annotation: Option<&RecordAnnotation>,
    now: DateTime<Utc>,
    policy: &MetricsPolicy,
) {
    let state = record.state();
    let key = record.id().as_str();
    let flag = |reason| Bottleneck {
        state,
        key: key.to_owned(),
        reason,
    };

    if state.is_unresolved() && record.priority() == Priority::High {
        snapshot.high_priority_unresolved += 1;
    }
    match state {
        TaskState::NeedsAction => {
            *snapshot
                .needs_action_by_kind
                .entry(record.kind().to_string())
                .or_default() += 1;
            let age = record.age(now);
            if age > policy.staleness {
                snapshot.bottlenecks.push(flag(BottleneckReason::Stale {
                    age_days: age.num_days(),
                }));
            }
        }
        TaskState::PendingApproval => {
            if let Some(expired_at) = record.expires_at().filter(|_| record.is_expired(now)) {
                snapshot
                    .bottlenecks
                    .push(flag(BottleneckReason::ApprovalExpired { expired_at }));
            }
        }
        TaskState::Done => {
            if record.last_transitioned_at() >= now - policy.throughput_window {
                snapshot.completed_in_window += 1;
            }
        }
        TaskState::Approved | TaskState::Rejected | TaskState::RejectedArchive => {}
    }

    if let Some(stalled) = annotation.filter(|annotation| annotation.stalled) {
        snapshot.bottlenecks.push(flag(BottleneckReason::Stalled {
            consecutive_failures: stalled.consecutive_failures,
        }));
    }
}

/// Enumerates every partition and reads each record.
///
/// Records that disappear between enumeration and read were moved by a
/// concurrent actor and are skipped.
///
/// # Errors
///
/// Returns the first store error other than a corrupt or vanished record.
pub async fn observe_store<S>(store: &S) -> TaskStoreResult<Vec<Observation>>
where
    S: TaskStore + ?Sized,
{
    let mut observations = Vec::new();
    for state in TaskState::ALL {
        for handle in store.list(state).await? {
            match store.read(&handle).await {
                Ok(record) => {
                    let annotation = store.annotation(handle.key()).await?;
                    observations.push(Observation::Record { record, annotation });
                }
                Err(TaskStoreError::CorruptRecord { handle: corrupt, reason }) => {
                    observations.push(Observation::Corrupt {
                        handle: corrupt,
                        reason,
                    });
                }
                Err(TaskStoreError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
    }
    Ok(observations)
}

/// Recomputes the aggregate snapshot from a fresh enumeration of `store`.
///
/// # Errors
///
/// Returns the store error that prevented a complete enumeration.
pub async fn collect_snapshot<S>(
    store: &S,
    now: DateTime<Utc>,
    policy: &MetricsPolicy,
) -> TaskStoreResult<AggregateSnapshot>
where
    S: TaskStore + ?Sized,
{
    let observations = observe_store(store).await?;
    Ok(aggregate(&observations, now, policy))
}
