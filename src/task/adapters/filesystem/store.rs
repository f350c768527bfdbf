//! File-per-record task store over a vault directory tree.

use super::{VaultLayout, discard_temp, run_blocking_with, temp_name, write_atomic, write_temp};
use crate::task::{
    codec,
    domain::{TaskId, TaskRecord, TaskState},
    ports::{
        MoveOutcome, RecordAnnotation, RecordHandle, TaskStore, TaskStoreError, TaskStoreResult,
    },
};
use async_trait::async_trait;
use cap_std::fs_utf8::{Dir, OpenOptions};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::warn;

const RECORD_EXTENSION: &str = ".md";
const ANNOTATION_EXTENSION: &str = ".json";

/// Task store keeping one Markdown file per record, one folder per state.
///
/// The partition holding a file is the record's state. Moves are a single
/// `rename`, so a record is never visible in two partitions.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    layout: VaultLayout,
}

impl FileTaskStore {
    /// Creates a store over an opened vault.
    #[must_use]
    pub const fn new(layout: VaultLayout) -> Self {
        Self { layout }
    }

    /// Returns the vault layout backing the store.
    #[must_use]
    pub const fn layout(&self) -> &VaultLayout {
        &self.layout
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&VaultLayout) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let layout = self.layout.clone();
        run_blocking_with(move || f(&layout), TaskStoreError::unavailable).await
    }
}

fn record_file_name(key: &str) -> String {
    format!("{key}{RECORD_EXTENSION}")
}

fn annotation_file_name(key: &str) -> String {
    format!("{key}{ANNOTATION_EXTENSION}")
}

fn list_blocking(layout: &VaultLayout, state: TaskState) -> TaskStoreResult<Vec<RecordHandle>> {
    let mut keys = Vec::new();
    for entry in layout
        .partition(state)
        .entries()
        .map_err(TaskStoreError::unavailable)?
    {
        let dir_entry = entry.map_err(TaskStoreError::unavailable)?;
        let Ok(name) = dir_entry.file_name() else {
            warn!(partition = %state, "skipping entry with a non UTF-8 name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Some(key) = name.strip_suffix(RECORD_EXTENSION) else {
            continue;
        };
        let is_file = dir_entry
            .file_type()
            .map_err(TaskStoreError::unavailable)?
            .is_file();
        if is_file && !key.is_empty() {
            keys.push(key.to_owned());
        }
    }
    keys.sort();
    Ok(keys
        .into_iter()
        .map(|key| RecordHandle::new(state, key))
        .collect())
}

fn read_blocking(layout: &VaultLayout, handle: &RecordHandle) -> TaskStoreResult<TaskRecord> {
    let dir = layout.partition(handle.state());
    let name = record_file_name(handle.key());
    let text = dir.read_to_string(&name).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => TaskStoreError::NotFound(handle.to_string()),
        io::ErrorKind::InvalidData => TaskStoreError::corrupt(handle, "record is not UTF-8"),
        _ => TaskStoreError::unavailable(err),
    })?;
    let data = codec::decode(&text).map_err(|err| TaskStoreError::corrupt(handle, err))?;
    if data.id.as_str() != handle.key() {
        return Err(TaskStoreError::corrupt(
            handle,
            format!("header id {} does not match file name", data.id),
        ));
    }
    TaskRecord::from_persisted(data, handle.state())
        .map_err(|err| TaskStoreError::corrupt(handle, err))
}

/// Rewrites the `last_transitioned_at` header through an open handle.
///
/// The handle follows the file wherever it has been renamed to, so the
/// rewrite can never recreate a copy in a partition the record has left.
/// A value of the same width is overwritten in place.
fn restamp(file: &mut File, transitioned_at: DateTime<Utc>) -> io::Result<()> {
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let span = codec::transition_stamp_span(&text).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "record has no last_transitioned_at header")
    })?;
    let stamp = codec::format_timestamp(transitioned_at);

    if span.len() == stamp.len() {
        let position = u64::try_from(span.start).map_err(io::Error::other)?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(stamp.as_bytes())?;
    } else {
        let head = text.get(..span.start).unwrap_or_default();
        let tail = text.get(span.end..).unwrap_or_default();
        let rewritten = format!("{head}{stamp}{tail}");
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(rewritten.as_bytes())?;
    }
    file.sync_data()
}

fn move_blocking(
    layout: &VaultLayout,
    handle: &RecordHandle,
    to: TaskState,
    transitioned_at: DateTime<Utc>,
) -> TaskStoreResult<MoveOutcome> {
    let source = layout.partition(handle.state());
    let target = layout.partition(to);
    let name = record_file_name(handle.key());

    // Opened before the rename so the stamp lands on the file that moved.
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    let mut file = match source.open_with(&name, &options) {
        Ok(file) => file.into_std(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(MoveOutcome::Conflict),
        Err(err) => return Err(TaskStoreError::unavailable(err)),
    };
    if target.exists(&name) {
        return Ok(MoveOutcome::Conflict);
    }
    match source.rename(&name, target, &name) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(MoveOutcome::Conflict),
        Err(err) => return Err(TaskStoreError::unavailable(err)),
    }
    if let Err(err) = restamp(&mut file, transitioned_at) {
        warn!(record = %handle, to = %to, error = %err, "could not stamp transition time");
    }
    Ok(MoveOutcome::Moved)
}

fn create_blocking(
    layout: &VaultLayout,
    state: TaskState,
    id: &TaskId,
    text: &str,
    created_at: DateTime<Utc>,
) -> TaskStoreResult<RecordHandle> {
    let name = record_file_name(id.as_str());
    if TaskState::ALL
        .into_iter()
        .any(|candidate| layout.partition(candidate).exists(&name))
    {
        return Err(TaskStoreError::DuplicateId(id.clone()));
    }

    let dir = layout.partition(state);
    let temp = temp_name(&name);
    if let Err(err) = write_temp(dir, &temp, text.as_bytes(), Some(created_at.into())) {
        discard_temp(dir, &temp);
        return Err(TaskStoreError::unavailable(err));
    }
    // A hard link never replaces an existing file, unlike a rename.
    let published = dir.hard_link(&temp, dir, &name);
    discard_temp(dir, &temp);
    match published {
        Ok(()) => Ok(RecordHandle::new(state, id.as_str())),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(TaskStoreError::DuplicateId(id.clone()))
        }
        Err(err) => Err(TaskStoreError::unavailable(err)),
    }
}

fn find_blocking(layout: &VaultLayout, id: &TaskId) -> Option<RecordHandle> {
    let name = record_file_name(id.as_str());
    TaskState::ALL
        .into_iter()
        .find(|state| layout.partition(*state).exists(&name))
        .map(|state| RecordHandle::new(state, id.as_str()))
}

fn read_annotation(dir: &Dir, key: &str) -> TaskStoreResult<Option<RecordAnnotation>> {
    let text = match dir.read_to_string(annotation_file_name(key)) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(TaskStoreError::unavailable(err)),
    };
    match serde_json::from_str(&text) {
        Ok(annotation) => Ok(Some(annotation)),
        Err(err) => {
            warn!(key, error = %err, "ignoring unreadable annotation");
            Ok(None)
        }
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn list(&self, state: TaskState) -> TaskStoreResult<Vec<RecordHandle>> {
        self.run_blocking(move |layout| list_blocking(layout, state))
            .await
    }

    async fn read(&self, handle: &RecordHandle) -> TaskStoreResult<TaskRecord> {
        let owned = handle.clone();
        self.run_blocking(move |layout| read_blocking(layout, &owned))
            .await
    }

    async fn move_record(
        &self,
        handle: &RecordHandle,
        to: TaskState,
        transitioned_at: DateTime<Utc>,
    ) -> TaskStoreResult<MoveOutcome> {
        let owned = handle.clone();
        self.run_blocking(move |layout| move_blocking(layout, &owned, to, transitioned_at))
            .await
    }

    async fn create(&self, state: TaskState, record: &TaskRecord) -> TaskStoreResult<RecordHandle> {
        let id = record.id().clone();
        let text = codec::encode(record);
        let created_at = record.created_at();
        self.run_blocking(move |layout| create_blocking(layout, state, &id, &text, created_at))
            .await
    }

    async fn find(&self, id: &TaskId) -> TaskStoreResult<Option<RecordHandle>> {
        let owned = id.clone();
        self.run_blocking(move |layout| Ok(find_blocking(layout, &owned)))
            .await
    }

    async fn annotation(&self, key: &str) -> TaskStoreResult<Option<RecordAnnotation>> {
        let owned = key.to_owned();
        self.run_blocking(move |layout| read_annotation(layout.annotations(), &owned))
            .await
    }

    async fn annotate(&self, key: &str, annotation: &RecordAnnotation) -> TaskStoreResult<()> {
        let name = annotation_file_name(key);
        let json = serde_json::to_vec_pretty(annotation).map_err(TaskStoreError::unavailable)?;
        self.run_blocking(move |layout| {
            write_atomic(layout.annotations(), &name, &json).map_err(TaskStoreError::unavailable)
        })
        .await
    }

    async fn clear_annotation(&self, key: &str) -> TaskStoreResult<()> {
        let name = annotation_file_name(key);
        self.run_blocking(move |layout| match layout.annotations().remove_file(&name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TaskStoreError::unavailable(err)),
        })
        .await
    }
}
