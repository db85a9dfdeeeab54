//! Structured logging setup: picks a JSON or plain-text `fmt` layer from
//! `[logging] format`, with the CLI's `--log-level` flag taking priority
//! over the config file's level when both are present.

use chainwatch_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn setup_tracing(logging: &LoggingConfig, cli_log_level: Option<&str>) -> anyhow::Result<()> {
	let default_directive = cli_log_level.unwrap_or(level_str(logging.level));
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(env_filter)
				.with(tracing_subscriber::fmt::layer().json())
				.try_init()?;
		}
		LogFormat::Text => {
			tracing_subscriber::registry()
				.with(env_filter)
				.with(tracing_subscriber::fmt::layer())
				.try_init()?;
		}
	}

	Ok(())
}

fn level_str(level: chainwatch_config::LogLevel) -> &'static str {
	use chainwatch_config::LogLevel::*;
	match level {
		Debug => "debug",
		Info => "info",
		Warn => "warn",
		Error => "error",
	}
}
