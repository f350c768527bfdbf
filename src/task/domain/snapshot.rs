//! Derived aggregate view over every partition.

use super::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counters and bottlenecks derived from a full store enumeration.
///
/// The snapshot is never authoritative: rescanning the store always
/// reproduces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Number of records per partition, including corrupt ones.
    pub counts: BTreeMap<TaskState, usize>,
    /// Number of readable `needs_action` records per kind.
    pub needs_action_by_kind: BTreeMap<String, usize>,
    /// High-priority records not yet resolved.
    pub high_priority_unresolved: usize,
    /// Records that reached `done` within the throughput window.
    pub completed_in_window: usize,
    /// Records that need human attention, in deterministic order.
    pub bottlenecks: Vec<Bottleneck>,
}

impl AggregateSnapshot {
    /// Returns the number of records in `state`.
    #[must_use]
    pub fn count(&self, state: TaskState) -> usize {
        self.counts.get(&state).copied().unwrap_or_default()
    }

    /// Returns the total number of records across all partitions.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Returns bottlenecks recorded for the record stored under `key`.
    pub fn bottlenecks_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Bottleneck> {
        self.bottlenecks.iter().filter(move |entry| entry.key == key)
    }
}

/// A record exceeding a staleness or expiry threshold without resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bottleneck {
    /// Partition the record resides in.
    pub state: TaskState,
    /// Storage key of the record (its id for readable records).
    pub key: String,
    /// Why the record was flagged.
    pub reason: BottleneckReason,
}

/// Reason a record was flagged as a bottleneck.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BottleneckReason {
    /// Waiting in `needs_action` longer than the staleness threshold.
    Stale {
        /// Whole days spent in the partition.
        age_days: i64,
    },
    /// Pending approval past its `expires_at`.
    ApprovalExpired {
        /// The expiry that passed.
        expired_at: DateTime<Utc>,
    },
    /// Execution failed repeatedly; still retried every pass.
    Stalled {
        /// Consecutive failed attempts.
        consecutive_failures: u32,
    },
    /// The stored representation cannot be parsed; quarantined in place.
    Corrupt {
        /// Parse failure description.
        detail: String,
    },
}

impl fmt::Display for BottleneckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale { age_days } => write!(f, "waiting in needs_action for {age_days} days"),
            Self::ApprovalExpired { .. } => f.write_str("approval expired"),
            Self::Stalled {
                consecutive_failures,
            } => write!(f, "stalled after {consecutive_failures} consecutive failures"),
            Self::Corrupt { detail } => write!(f, "corrupt record: {detail}"),
        }
    }
}

/// Snapshot as published by a completed reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    /// Sequence number of the pass that produced the snapshot.
    pub pass: u64,
    /// Instant the snapshot was computed.
    pub as_of: DateTime<Utc>,
    /// Aggregate content.
    pub snapshot: AggregateSnapshot,
}
