//! In-memory task store.
//!
//! Records are kept in their encoded text form so that reads go through the
//! same codec as the file-system adapter and corrupt records can be staged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    codec,
    domain::{TaskId, TaskRecord, TaskState},
    ports::{
        MoveOutcome, RecordAnnotation, RecordHandle, TaskStore, TaskStoreError, TaskStoreResult,
    },
};

/// Thread-safe in-memory task store.
#[derive(Debug, Clone)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryStoreState>>,
    available: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    partitions: BTreeMap<TaskState, BTreeMap<String, StoredRecord>>,
    annotations: BTreeMap<String, RecordAnnotation>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    text: String,
    stamped_at: Option<DateTime<Utc>>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InMemoryTaskStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw record text under `key`, bypassing validation.
    ///
    /// Used to stage corrupt or externally written records.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unavailable`] when the store lock is
    /// poisoned.
    pub fn insert_raw(
        &self,
        state: TaskState,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> TaskStoreResult<RecordHandle> {
        let storage_key = key.into();
        let mut guard = self.write()?;
        guard.partitions.entry(state).or_default().insert(
            storage_key.clone(),
            StoredRecord {
                text: text.into(),
                stamped_at: None,
            },
        );
        Ok(RecordHandle::new(state, storage_key))
    }

    /// Simulates losing or regaining the storage medium.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the keys stored in `state`, for assertions.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unavailable`] when the store lock is
    /// poisoned.
    pub fn keys(&self, state: TaskState) -> TaskStoreResult<Vec<String>> {
        let guard = self.read_guard()?;
        Ok(guard
            .partitions
            .get(&state)
            .map(|partition| partition.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn ensure_available(&self) -> TaskStoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TaskStoreError::unavailable(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "in-memory store marked unavailable",
            )))
        }
    }

    fn read_guard(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryStoreState>> {
        self.ensure_available()?;
        self.state
            .read()
            .map_err(|err| TaskStoreError::unavailable(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryStoreState>> {
        self.ensure_available()?;
        self.state
            .write()
            .map_err(|err| TaskStoreError::unavailable(std::io::Error::other(err.to_string())))
    }
}

impl InMemoryStoreState {
    fn locate(&self, key: &str) -> Option<TaskState> {
        self.partitions
            .iter()
            .find(|(_, partition)| partition.contains_key(key))
            .map(|(state, _)| *state)
    }
}

fn decode_stored(handle: &RecordHandle, stored: &StoredRecord) -> TaskStoreResult<TaskRecord> {
    let data = codec::decode(&stored.text).map_err(|err| TaskStoreError::corrupt(handle, err))?;
    if data.id.as_str() != handle.key() {
        return Err(TaskStoreError::corrupt(
            handle,
            format!("header id {} does not match storage key", data.id),
        ));
    }
    let mut record = TaskRecord::from_persisted(data, handle.state())
        .map_err(|err| TaskStoreError::corrupt(handle, err))?;
    if let Some(stamped_at) = stored.stamped_at {
        record.observe_transition(stamped_at);
    }
    Ok(record)
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list(&self, state: TaskState) -> TaskStoreResult<Vec<RecordHandle>> {
        Ok(self
            .keys(state)?
            .into_iter()
            .map(|key| RecordHandle::new(state, key))
            .collect())
    }

    async fn read(&self, handle: &RecordHandle) -> TaskStoreResult<TaskRecord> {
        let guard = self.read_guard()?;
        let stored = guard
            .partitions
            .get(&handle.state())
            .and_then(|partition| partition.get(handle.key()))
            .ok_or_else(|| TaskStoreError::NotFound(handle.to_string()))?;
        decode_stored(handle, stored)
    }

    async fn move_record(
        &self,
        handle: &RecordHandle,
        to: TaskState,
        transitioned_at: DateTime<Utc>,
    ) -> TaskStoreResult<MoveOutcome> {
        let mut guard = self.write()?;
        let target_holds_key = guard
            .partitions
            .get(&to)
            .is_some_and(|partition| partition.contains_key(handle.key()));
        if target_holds_key {
            return Ok(MoveOutcome::Conflict);
        }
        let Some(mut stored) = guard
            .partitions
            .get_mut(&handle.state())
            .and_then(|partition| partition.remove(handle.key()))
        else {
            return Ok(MoveOutcome::Conflict);
        };
        stored.stamped_at = Some(
            stored
                .stamped_at
                .map_or(transitioned_at, |previous| previous.max(transitioned_at)),
        );
        guard
            .partitions
            .entry(to)
            .or_default()
            .insert(handle.key().to_owned(), stored);
        Ok(MoveOutcome::Moved)
    }

    async fn create(&self, state: TaskState, record: &TaskRecord) -> TaskStoreResult<RecordHandle> {
        let mut guard = self.write()?;
        let key = record.id().as_str();
        if guard.locate(key).is_some() {
            return Err(TaskStoreError::DuplicateId(record.id().clone()));
        }
        guard.partitions.entry(state).or_default().insert(
            key.to_owned(),
            StoredRecord {
                text: codec::encode(record),
                stamped_at: None,
            },
        );
        Ok(RecordHandle::new(state, key))
    }

    async fn find(&self, id: &TaskId) -> TaskStoreResult<Option<RecordHandle>> {
        let guard = self.read_guard()?;
        Ok(guard
            .locate(id.as_str())
            .map(|state| RecordHandle::new(state, id.as_str())))
    }

    async fn annotation(&self, key: &str) -> TaskStoreResult<Option<RecordAnnotation>> {
        let guard = self.read_guard()?;
        Ok(guard.annotations.get(key).cloned())
    }

    async fn annotate(&self, key: &str, annotation: &RecordAnnotation) -> TaskStoreResult<()> {
        let mut guard = self.write()?;
        guard.annotations.insert(key.to_owned(), annotation.clone());
        Ok(())
    }

    async fn clear_annotation(&self, key: &str) -> TaskStoreResult<()> {
        let mut guard = self.write()?;
        guard.annotations.remove(key);
        Ok(())
    }
}
