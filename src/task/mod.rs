//! Task lifecycle management for Steward.
//!
//! A task record enters the `needs_action` partition when a producer submits
//! it. The reconciliation loop then routes it through approval or automatic
//! execution until it lands in a terminal partition. The partition a record
//! lives in is its state. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - On-disk record format in [`codec`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod codec;
pub mod domain;
pub mod ports;
pub mod services;
