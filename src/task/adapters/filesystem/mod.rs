//! File-per-record vault adapters.
//!
//! The vault keeps one folder per lifecycle state, plus folders for the
//! action log and record annotations and the published snapshot file.
//! Blocking file-system calls run on the blocking thread pool via
//! [`tokio::task::spawn_blocking`].

mod action_log;
mod layout;
mod snapshot;
mod store;

pub use action_log::FileActionLog;
pub use layout::VaultLayout;
pub use snapshot::FileSnapshotSink;
pub use store::FileTaskStore;

use cap_std::fs_utf8::Dir;
use std::io::{self, Write};
use std::time::SystemTime;
use uuid::Uuid;

/// Runs a blocking file-system operation on the blocking thread pool and
/// maps join errors into the caller's error type.
async fn run_blocking_with<F, T, E, M>(f: F, map_err: M) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    M: FnOnce(tokio::task::JoinError) -> E,
{
    tokio::task::spawn_blocking(f).await.map_err(map_err)?
}

/// Returns a dot-prefixed temporary name beside `name`.
///
/// Dot files are never enumerated as records.
fn temp_name(name: &str) -> String {
    format!(".{name}.{}.tmp", Uuid::new_v4().simple())
}

/// Writes `contents` to a fresh temporary file in `dir` and flushes it.
fn write_temp(
    dir: &Dir,
    name: &str,
    contents: &[u8],
    modified: Option<SystemTime>,
) -> io::Result<()> {
    let mut file = dir.create(name)?.into_std();
    file.write_all(contents)?;
    if let Some(instant) = modified {
        file.set_modified(instant)?;
    }
    file.sync_all()
}

/// Replaces `name` in `dir` with `contents` through a temporary file and a
/// rename.
fn write_atomic(dir: &Dir, name: &str, contents: &[u8]) -> io::Result<()> {
    let temp = temp_name(name);
    if let Err(err) = write_temp(dir, &temp, contents, None) {
        discard_temp(dir, &temp);
        return Err(err);
    }
    dir.rename(&temp, dir, name).inspect_err(|_| discard_temp(dir, &temp))
}

fn discard_temp(dir: &Dir, temp: &str) {
    if let Err(err) = dir.remove_file(temp) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(file = temp, error = %err, "failed to remove temporary file");
        }
    }
}
