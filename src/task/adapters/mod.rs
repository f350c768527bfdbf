//! Adapter implementations of the task ports.

mod classifier;
mod executor;
pub mod filesystem;
pub mod memory;

pub use classifier::HandbookClassifier;
pub use executor::JournalExecutor;
