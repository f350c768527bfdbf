//! Domain model for task lifecycle management.
//!
//! The task domain models work items, their lifecycle states, the guards
//! attached to each transition, and the derived aggregate snapshot. All
//! storage and collaborator concerns stay outside of the domain boundary.

mod descriptor;
mod error;
mod ids;
mod lifecycle;
mod priority;
mod record;
mod snapshot;
mod state;

pub use descriptor::ActionDescriptor;
pub use error::{ParseTaskStateError, TaskDomainError};
pub use ids::{TaskId, TaskKind};
pub use lifecycle::{Classification, TransitionGuard, fail_safe, needs_action_target};
pub use priority::Priority;
pub use record::{NewTask, PersistedTaskData, TaskRecord};
pub use snapshot::{AggregateSnapshot, Bottleneck, BottleneckReason, PublishedSnapshot};
pub use state::TaskState;
