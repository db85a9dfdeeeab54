//! # Chainwatch Types
//!
//! Core type definitions shared across the listener's adapter, pipeline,
//! and manager crates.
//!
//! This crate provides the fundamental data structures, enums, and traits
//! that define the boundary contracts of the system: the canonical event
//! model every chain adapter must produce, the monitoring target shape a
//! caller declares interest with, and the chain adapter trait concrete
//! adapters implement.
//!
//! ## Modules
//!
//! - **chain**: the closed `ChainKind` tag set.
//! - **amount**: base-unit / decimal amount handling shared by every adapter.
//! - **event**: `EventKind`, the per-kind event payload, and `CanonicalEvent`.
//! - **target**: `MonitoringTarget` and its filter overrides.
//! - **processed**: pipeline output (`ProcessedEvent`) and its sub-records.
//! - **adapter**: the `ChainAdapter` trait, connection status, and signals.
//! - **error**: the shared error taxonomy.

pub mod adapter;
pub mod amount;
pub mod chain;
pub mod error;
pub mod event;
pub mod processed;
pub mod retry;
pub mod target;

pub use adapter::*;
pub use amount::*;
pub use chain::*;
pub use error::*;
pub use event::*;
pub use processed::*;
pub use retry::{with_retry, with_retry_counted};
pub use target::*;
