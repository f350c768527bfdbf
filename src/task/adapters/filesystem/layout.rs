//! Vault directory layout.

use crate::task::domain::TaskState;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io;
use std::sync::Arc;

const LOGS_DIR: &str = "Logs";
const ANNOTATIONS_DIR: &str = "Annotations";

/// File name of the published aggregate snapshot at the vault root.
pub(super) const SNAPSHOT_FILE: &str = "Snapshot.json";

/// Opened handles to every vault directory.
///
/// Cloning is cheap; clones share the same directory handles.
#[derive(Debug, Clone)]
pub struct VaultLayout {
    root_path: Utf8PathBuf,
    dirs: Arc<VaultDirs>,
}

#[derive(Debug)]
struct VaultDirs {
    root: Dir,
    needs_action: Dir,
    pending_approval: Dir,
    approved: Dir,
    rejected: Dir,
    done: Dir,
    rejected_archive: Dir,
    logs: Dir,
    annotations: Dir,
}

impl VaultLayout {
    /// Opens the vault rooted at `root`, creating missing directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when a directory cannot be created or opened.
    pub fn open(root: impl AsRef<Utf8Path>) -> io::Result<Self> {
        let root_path = root.as_ref().to_path_buf();
        Dir::create_ambient_dir_all(&root_path, ambient_authority())?;
        let root_dir = Dir::open_ambient_dir(&root_path, ambient_authority())?;
        let open_child = |name: &str| -> io::Result<Dir> {
            root_dir.create_dir_all(name)?;
            root_dir.open_dir(name)
        };

        let dirs = VaultDirs {
            needs_action: open_child(TaskState::NeedsAction.partition_name())?,
            pending_approval: open_child(TaskState::PendingApproval.partition_name())?,
            approved: open_child(TaskState::Approved.partition_name())?,
            rejected: open_child(TaskState::Rejected.partition_name())?,
            done: open_child(TaskState::Done.partition_name())?,
            rejected_archive: open_child(TaskState::RejectedArchive.partition_name())?,
            logs: open_child(LOGS_DIR)?,
            annotations: open_child(ANNOTATIONS_DIR)?,
            root: root_dir,
        };
        Ok(Self {
            root_path,
            dirs: Arc::new(dirs),
        })
    }

    /// Returns the vault root path.
    #[must_use]
    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    /// Returns the on-disk path of the folder holding `state`.
    #[must_use]
    pub fn partition_path(&self, state: TaskState) -> Utf8PathBuf {
        self.root_path.join(state.partition_name())
    }

    pub(super) fn root(&self) -> &Dir {
        &self.dirs.root
    }

    pub(super) fn partition(&self, state: TaskState) -> &Dir {
        match state {
            TaskState::NeedsAction => &self.dirs.needs_action,
            TaskState::PendingApproval => &self.dirs.pending_approval,
            TaskState::Approved => &self.dirs.approved,
            TaskState::Rejected => &self.dirs.rejected,
            TaskState::Done => &self.dirs.done,
            TaskState::RejectedArchive => &self.dirs.rejected_archive,
        }
    }

    pub(super) fn logs(&self) -> &Dir {
        &self.dirs.logs
    }

    pub(super) fn annotations(&self) -> &Dir {
        &self.dirs.annotations
    }
}
