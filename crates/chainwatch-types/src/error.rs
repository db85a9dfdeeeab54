//! Shared error taxonomy.
//!
//! Each crate in the workspace defines its own `thiserror`-derived error
//! enum for the failures that originate there (see `chainwatch_adapters::AdapterError`,
//! `chainwatch_pipeline::PipelineError`, `chainwatch_config::ConfigError`,
//! `chainwatch_manager::ManagerError`). This module holds only the
//! validation taxonomy that is shared across crate boundaries, since both
//! `MonitoringTarget` construction (types crate) and `add_monitoring_target`
//! (adapter crate) need to raise it synchronously.

use thiserror::Error;

/// Raised synchronously by `validate_address` callers and `MonitoringTarget`
/// construction. Never recoverable by retry; the caller must fix its input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	#[error("address '{address}' is not valid on chain {chain}")]
	InvalidAddress { chain: String, address: String },

	#[error("target must declare at least one event kind")]
	EmptyEventKinds,

	#[error("invalid value '{value}' for field '{field}'")]
	InvalidEnumValue { field: String, value: String },

	#[error("missing required field '{0}'")]
	MissingField(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Adapter-level failures. A dropped, unparsable event is a `Protocol`
/// error the adapter logs and continues past, never propagates.
#[derive(Error, Debug)]
pub enum AdapterError {
	#[error("transport error: {0}")]
	Transport(String),

	#[error("protocol decode error: {0}")]
	Protocol(String),

	#[error(transparent)]
	Validation(#[from] ValidationError),

	#[error("operation not supported by this adapter: {0}")]
	NotSupported(String),

	#[error("adapter not connected")]
	NotConnected,
}

pub type AdapterResult<T> = Result<T, AdapterError>;
