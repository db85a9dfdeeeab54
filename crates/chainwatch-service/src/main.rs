//! # Chainwatch Service Binary
//!
//! Command-line entry point for the multi-chain event listener: loads
//! configuration, wires adapters/pipeline/manager into a `ListenerFacade`,
//! and runs until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use chainwatch_config::ConfigLoader;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

mod logging;
mod signals;
mod wiring;

#[derive(Parser)]
#[command(name = "chainwatch")]
#[command(about = "Multi-chain event listener", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Path to the TOML configuration file.
	#[arg(short, long, value_name = "FILE", env = "CHAINWATCH_CONFIG")]
	config: Option<PathBuf>,

	/// Logging level override (falls back to `[logging] level` then `RUST_LOG`).
	#[arg(long, env = "CHAINWATCH_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the listener with full orchestration.
	Start,
	/// Load and validate the configuration file without connecting to any chain.
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let config = ConfigLoader::from_env_and_file(cli.config.as_deref()).context("failed to load configuration")?;

	logging::setup_tracing(&config.logging, cli.log_level.as_deref())?;

	let result = match cli.command {
		Some(Commands::Validate) => validate_config(&config),
		Some(Commands::Start) | None => start_service(config).await,
	};

	if let Err(err) = &result {
		error!(error = %err, "chainwatch exited with an error");
	}
	result
}

fn validate_config(config: &chainwatch_config::ListenerConfig) -> Result<()> {
	info!("configuration is valid");
	info!(chains = config.chains.len(), "chains configured");
	info!(
		watch_addresses = config.targets.addresses.watch_addresses.len(),
		enhanced_targets = config.targets.enhanced_targets.len(),
		"targets configured"
	);
	for channel in &config.notifications.channels {
		info!(channel = ?channel, "notification channel enabled");
	}
	Ok(())
}

async fn start_service(config: chainwatch_config::ListenerConfig) -> Result<()> {
	info!("starting chainwatch listener");

	let facade = wiring::build_facade(&config)
		.await
		.context("failed to wire listener components")?;

	facade.start().await.context("failed to start listener")?;
	info!("chainwatch listener started");

	signals::wait_for_shutdown_signal().await;
	info!("shutdown signal received, stopping listener");

	facade.stop().await;
	info!("chainwatch listener stopped");
	Ok(())
}
