//! Steward: task lifecycle and reconciliation engine for an AI employee vault.
//!
//! Independent producers (file drops, inbox mail, chat, feed monitors) write
//! candidate work items into durable storage. Steward advances each item
//! through a bounded lifecycle, consults an external decision collaborator for
//! routing, and keeps an aggregate snapshot of backlog and throughput for
//! reporting jobs.
//!
//! # Architecture
//!
//! Steward follows hexagonal architecture principles:
//!
//! - **Domain**: Task records, lifecycle states, and transition guards
//! - **Ports**: Abstract trait interfaces for storage and collaborators
//! - **Adapters**: In-memory and file-per-record implementations of ports
//! - **Services**: Submission, approval, metrics, and reconciliation
//!
//! # Modules
//!
//! - [`task`]: Task lifecycle state machine and reconciliation engine
//! - [`config`]: Engine configuration from defaults and the environment
//! - [`telemetry`]: Diagnostic logging setup

pub mod config;
pub mod task;
pub mod telemetry;
