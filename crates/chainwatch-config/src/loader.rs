//! Configuration loading from files and environment.

use crate::error::{ConfigError, ConfigResult};
use crate::types::ListenerConfig;
use chainwatch_types::ChainKind;
use std::path::Path;
use tracing::{debug, info};

pub struct ConfigLoader;

impl ConfigLoader {
	pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<ListenerConfig> {
		let path = path.as_ref();
		info!("loading configuration from {:?}", path);

		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.display().to_string(),
			source,
		})?;

		let config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents)?,
			Some("json") => Self::from_json(&contents)?,
			Some("yaml") | Some("yml") => Self::from_yaml(&contents)?,
			other => return Err(ConfigError::UnsupportedFormat(other.map(str::to_string))),
		};

		Self::validate(&config)?;
		Ok(config)
	}

	pub fn from_toml(contents: &str) -> ConfigResult<ListenerConfig> {
		Ok(toml::from_str(contents)?)
	}

	pub fn from_json(contents: &str) -> ConfigResult<ListenerConfig> {
		Ok(serde_json::from_str(contents)?)
	}

	pub fn from_yaml(contents: &str) -> ConfigResult<ListenerConfig> {
		Ok(serde_yaml::from_str(contents)?)
	}

	/// Load from a file if given, falling back to defaults, then apply
	/// `CHAINWATCH_*` environment overrides.
	pub fn from_env_and_file(file_path: Option<&Path>) -> ConfigResult<ListenerConfig> {
		let mut config = match file_path {
			Some(path) => Self::from_file(path)?,
			None => ListenerConfig::default(),
		};

		Self::apply_env_overrides(&mut config);
		Self::validate(&config)?;
		Ok(config)
	}

	fn apply_env_overrides(config: &mut ListenerConfig) {
		if let Ok(url) = std::env::var("CHAINWATCH_REDIS_URL") {
			debug!("overriding redis_url from environment");
			config.database.redis_url = url;
		}

		if let Ok(url) = std::env::var("CHAINWATCH_WEBHOOK_URL") {
			debug!("overriding webhook_url from environment");
			config.notifications.webhook_url = Some(url);
		}

		for (key, value) in std::env::vars() {
			if let Some(chain_name) = key.strip_prefix("CHAINWATCH_RPC_URL_") {
				let chain_name = chain_name.to_lowercase();
				if let Some(chain_config) = config.chains.get_mut(&chain_name) {
					debug!("overriding rpc_url for chain {} from environment", chain_name);
					chain_config.rpc_url = value;
				}
			}
		}
	}

	/// Cross-field checks: every chain name must be recognized, and
	/// whichever notification channels are configured must carry the
	/// fields they need.
	fn validate(config: &ListenerConfig) -> ConfigResult<()> {
		for chain_name in config.chains.keys() {
			if chain_name.parse::<ChainKind>().is_err() {
				return Err(ConfigError::Invalid(format!(
					"unknown chain '{}' in [chains] table",
					chain_name
				)));
			}
		}

		if config.notifications.enabled {
			use crate::types::NotificationChannel;
			for channel in &config.notifications.channels {
				match channel {
					NotificationChannel::Webhook if config.notifications.webhook_url.is_none() => {
						return Err(ConfigError::Invalid(
							"notifications.webhook channel enabled without webhook_url".to_string(),
						));
					}
					NotificationChannel::RedisPubsub if config.notifications.redis_channel.is_none() => {
						return Err(ConfigError::Invalid(
							"notifications.redis_pubsub channel enabled without redis_channel".to_string(),
						));
					}
					_ => {}
				}
			}
		}

		for target in &config.targets.enhanced_targets {
			if target.event_types.is_empty() {
				return Err(ConfigError::Invalid(format!(
					"enhanced target '{}' declares no event_types",
					target.id
				)));
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn minimal_toml() -> &'static str {
		r#"
[database]
redis_url = "redis://localhost:6379"
connection_pool_size = 5

[logging]
level = "info"
format = "text"
correlation_tracking = true

[notifications]
enabled = false
channels = []
"#
	}

	#[test]
	fn parses_minimal_toml() {
		let config = ConfigLoader::from_toml(minimal_toml()).unwrap();
		assert_eq!(config.database.connection_pool_size, 5);
		assert!(!config.notifications.enabled);
	}

	#[test]
	fn rejects_webhook_channel_without_url() {
		let toml = r#"
[notifications]
enabled = true
channels = ["webhook"]
"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(ConfigLoader::validate(&config).is_err());
	}

	#[test]
	fn rejects_unknown_chain_name() {
		let toml = r#"
[chains.marscoin]
rpc_url = "http://localhost"
"#;
		let config = ConfigLoader::from_toml(toml).unwrap();
		assert!(ConfigLoader::validate(&config).is_err());
	}

	#[test]
	fn from_file_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, minimal_toml()).unwrap();
		let config = ConfigLoader::from_file(&path).unwrap();
		assert_eq!(config.database.redis_url, "redis://localhost:6379");
	}
}
