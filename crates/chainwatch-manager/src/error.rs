//! One `thiserror` enum for every failure that originates at the
//! manager/facade boundary.

use chainwatch_pipeline::PipelineError;
use chainwatch_types::error::AdapterError;
use chainwatch_types::ChainKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
	#[error("chain {0} is already registered")]
	DuplicateChain(ChainKind),

	#[error("chain {0} is not registered")]
	UnknownChain(ChainKind),

	#[error("adapter for chain {0} failed: {1}")]
	Adapter(ChainKind, AdapterError),

	#[error(transparent)]
	Pipeline(#[from] PipelineError),

	#[error("target '{0}' is not registered")]
	UnknownTarget(String),

	#[error(transparent)]
	Validation(#[from] chainwatch_types::error::ValidationError),
}

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
