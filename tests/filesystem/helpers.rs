//! Shared fixtures for file-system vault tests.

use crate::test_helpers::{ManualClock, epoch};
use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use std::sync::Arc;
use steward::task::{
    adapters::filesystem::{FileActionLog, FileSnapshotSink, FileTaskStore, VaultLayout},
    domain::{ActionDescriptor, NewTask, Priority, TaskKind, TaskRecord, TaskState},
};
use tempfile::TempDir;

/// A vault rooted in a temporary directory.
pub struct TempVault {
    _dir: TempDir,
    /// Opened vault layout.
    pub layout: VaultLayout,
    /// Record store over the vault.
    pub store: Arc<FileTaskStore>,
    /// Clock used to stamp new records.
    pub clock: Arc<ManualClock>,
}

impl TempVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temporary directory");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("vault"))
            .expect("temporary path should be UTF-8");
        let layout = VaultLayout::open(&root).expect("vault should open");
        Self {
            _dir: dir,
            store: Arc::new(FileTaskStore::new(layout.clone())),
            layout,
            clock: Arc::new(ManualClock::at(epoch())),
        }
    }

    /// Returns the vault root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.layout.root_path()
    }

    /// Returns an action log over this vault.
    #[must_use]
    pub fn action_log(&self) -> FileActionLog {
        FileActionLog::new(self.layout.clone())
    }

    /// Returns a snapshot sink over this vault.
    #[must_use]
    pub fn snapshot_sink(&self) -> FileSnapshotSink {
        FileSnapshotSink::new(self.layout.clone())
    }

    /// Builds a record stamped by the vault clock.
    #[must_use]
    pub fn record(&self, body: &str, action: Option<&str>) -> TaskRecord {
        TaskRecord::new_submission(
            NewTask {
                kind: TaskKind::new("mail").expect("valid kind"),
                priority: Priority::Medium,
                body: body.to_owned(),
                action_descriptor: action
                    .map(|name| ActionDescriptor::new(name).expect("valid action")),
                expires_at: None,
            },
            &*self.clock,
        )
    }

    /// Writes `contents` straight into a partition folder.
    pub fn write_file(&self, state: TaskState, name: &str, contents: &str) {
        std::fs::write(self.layout.partition_path(state).join(name), contents)
            .expect("write partition file");
    }

    /// Returns the file names present in a partition folder.
    #[must_use]
    pub fn file_names(&self, state: TaskState) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.layout.partition_path(state))
            .expect("read partition folder")
            .map(|entry| {
                entry
                    .expect("directory entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

/// Provides a fresh temporary vault.
#[fixture]
pub fn vault() -> TempVault {
    TempVault::new()
}
