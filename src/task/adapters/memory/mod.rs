//! In-memory adapters for tests and embedding.

mod action_log;
mod snapshot;
mod store;

pub use action_log::InMemoryActionLog;
pub use snapshot::InMemorySnapshotSink;
pub use store::InMemoryTaskStore;
