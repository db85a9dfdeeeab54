//! Configuration errors: fatal at startup, rejected-with-no-side-effect
//! at runtime.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("unsupported config file extension: {0:?}")]
	UnsupportedFormat(Option<String>),

	#[error("failed to parse TOML: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("failed to parse JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("failed to parse YAML: {0}")]
	Yaml(#[from] serde_yaml::Error),

	#[error("invalid configuration: {0}")]
	Invalid(String),

	#[error(transparent)]
	Validation(#[from] chainwatch_types::ValidationError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
