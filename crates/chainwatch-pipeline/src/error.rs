//! One `thiserror` enum per crate boundary, never a bare `String`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("filter '{0}' could not evaluate the event: {1}")]
	Filter(String, String),
	#[error("a registry operation was invalid: {0}")]
	Registry(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A notifier failure is recorded in `ProcessedEvent.notifications`, never
/// propagated as a thrown `PipelineError` — a delivery failure on one
/// channel must not abort the others.
#[derive(Debug, Error, Clone)]
#[error("notifier '{channel}' failed: {message}")]
pub struct NotifierError {
	pub channel: String,
	pub message: String,
	/// Delivery attempts made before giving up. Notifiers that don't retry
	/// (pub/sub, structured log) always report 0.
	pub retry_count: u32,
}
