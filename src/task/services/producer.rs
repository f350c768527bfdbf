//! Producer-side deduplication.

use super::submission::{SubmissionResult, SubmissionService, SubmitRequest};
use crate::task::{domain::TaskId, ports::TaskStore};
use mockable::Clock;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

/// Bounded set of recently seen source keys.
///
/// Inserting beyond capacity evicts the oldest key.
#[derive(Debug, Clone)]
pub struct RecentKeys {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentKeys {
    /// Creates an empty set holding at most `capacity` keys (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let bounded = capacity.max(1);
        Self {
            capacity: bounded,
            order: VecDeque::with_capacity(bounded),
            members: HashSet::with_capacity(bounded),
        }
    }

    /// Returns `true` when `key` was seen and not yet evicted.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    /// Records `key`. Returns `false` when it was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let owned = key.into();
        if self.members.contains(&owned) {
            return false;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    self.members.remove(&evicted);
                }
                None => break,
            }
        }
        self.members.insert(owned.clone());
        self.order.push_back(owned);
        true
    }

    /// Returns the number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A detector-side submitter that skips source items it already handed in.
///
/// The deduplication set belongs to this producer instance only.
pub struct Producer<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    submission: SubmissionService<S, C>,
    recent: Mutex<RecentKeys>,
}

impl<S, C> Producer<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync,
{
    /// Creates a producer remembering up to `capacity` source keys.
    #[must_use]
    pub fn new(submission: SubmissionService<S, C>, capacity: usize) -> Self {
        Self {
            submission,
            recent: Mutex::new(RecentKeys::new(capacity)),
        }
    }

    /// Submits `request` unless `source_key` was already handled.
    ///
    /// Returns `Ok(None)` for a repeated key, and also when the store
    /// already holds a record with the same identifier.
    ///
    /// # Errors
    ///
    /// Returns [`super::SubmissionError`] for any other submission failure.
    /// The key is not remembered in that case, so a later call retries.
    pub async fn submit_once(
        &self,
        source_key: &str,
        request: SubmitRequest,
    ) -> SubmissionResult<Option<TaskId>> {
        let mut recent = self.recent.lock().await;
        if recent.contains(source_key) {
            debug!(source_key, "skipping already submitted source item");
            return Ok(None);
        }
        match self.submission.submit(request).await {
            Ok(id) => {
                recent.insert(source_key);
                Ok(Some(id))
            }
            Err(err) if err.duplicate_id().is_some() => {
                recent.insert(source_key);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
