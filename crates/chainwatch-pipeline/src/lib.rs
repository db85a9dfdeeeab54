//! # Chainwatch Pipeline
//!
//! The filter → enrich → process → notify pipeline every canonical event
//! passes through before it reaches a caller. Filters, enrichers,
//! processors, and notifiers are each kept in an `Arc<RwLock<_>>` registry
//! with "replacing an existing id is an error" `add_*` semantics.

pub mod enrich;
pub mod error;
pub mod filters;
pub mod notifier;
pub mod pipeline;
pub mod processor;

pub use enrich::*;
pub use error::{NotifierError, PipelineError, Result};
pub use filters::*;
pub use notifier::*;
pub use pipeline::{Pipeline, ResolvedFilters};
pub use processor::*;
