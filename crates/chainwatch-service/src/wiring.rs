//! Translates a loaded `ListenerConfig` into a running `ListenerFacade`:
//! registers adapters per configured chain, seeds the pipeline's standard
//! filters and configured notifiers, and loads every declared target. One
//! function that walks the config and wires concrete components behind the
//! traits the rest of the system only knows by interface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chainwatch_adapters::{BitcoinAdapter, EvmAdapter, EvmVariant, SolanaAdapter, SuiAdapter, TronAdapter};
use chainwatch_config::{ListenerConfig, NotificationChannel};
use chainwatch_manager::{ChainManager, ListenerFacade, ManagerConfig, TargetResolver};
use chainwatch_pipeline::{
	enrich::standard_enrichers,
	filters::standard_filters,
	notifier::{PubSubNotifier, StructuredLogNotifier, WebhookNotifier},
	processor::standard_processors,
	Pipeline,
};
use chainwatch_types::{ChainAdapter, ChainKind};
use tracing::info;

pub async fn build_facade(config: &ListenerConfig) -> Result<ListenerFacade> {
	let pipeline = Arc::new(build_pipeline(config).await?);
	let resolver = Arc::new(TargetResolver::new(config.filters.clone()));

	let manager_config = ManagerConfig {
		health_check_interval: Duration::from_millis(config.monitoring.transfers.polling_interval_ms.max(1000) * 30),
		reconnect_delay: Duration::from_secs(5),
		auto_reconnect: true,
	};
	let manager = ChainManager::new(pipeline, resolver, manager_config);

	for (chain_name, chain_config) in &config.chains {
		let chain: ChainKind = chain_name
			.parse()
			.with_context(|| format!("unknown chain '{chain_name}' in [chains] table"))?;
		let adapter = build_adapter(chain, chain_config)?;
		manager
			.register(adapter)
			.with_context(|| format!("registering adapter for chain '{chain_name}'"))?;
	}

	let facade = ListenerFacade::new(manager);
	load_targets(&facade, config).await?;
	Ok(facade)
}

fn build_adapter(chain: ChainKind, config: &chainwatch_config::ChainConfig) -> Result<Box<dyn ChainAdapter>> {
	let adapter: Box<dyn ChainAdapter> = match chain {
		ChainKind::Ethereum => {
			let mut adapter = EvmAdapter::new(EvmVariant::Ethereum, config.rpc_url.clone());
			if let Some(confirmations) = config.block_confirmation_count {
				adapter = adapter.with_confirmations(confirmations);
			}
			Box::new(adapter)
		}
		ChainKind::Bsc => {
			let mut adapter = EvmAdapter::new(EvmVariant::Bsc, config.rpc_url.clone());
			if let Some(confirmations) = config.block_confirmation_count {
				adapter = adapter.with_confirmations(confirmations);
			}
			Box::new(adapter)
		}
		ChainKind::TronEvm => {
			let mut adapter = EvmAdapter::new(EvmVariant::TronEvm, config.rpc_url.clone());
			if let Some(confirmations) = config.block_confirmation_count {
				adapter = adapter.with_confirmations(confirmations);
			}
			Box::new(adapter)
		}
		ChainKind::Solana => Box::new(SolanaAdapter::new(config.rpc_url.clone())),
		ChainKind::Sui => Box::new(SuiAdapter::new(config.rpc_url.clone())),
		ChainKind::Tron => Box::new(TronAdapter::new(config.rpc_url.clone())),
		ChainKind::Bitcoin => Box::new(BitcoinAdapter::new(config.rpc_url.clone())),
	};
	Ok(adapter)
}

async fn build_pipeline(config: &ListenerConfig) -> Result<Pipeline> {
	let pipeline = Pipeline::new();
	for filter in standard_filters() {
		pipeline
			.add_filter(filter)
			.await
			.context("registering a standard filter")?;
	}
	for enricher in standard_enrichers() {
		pipeline
			.add_enricher(enricher)
			.await
			.context("registering a standard enricher")?;
	}
	for processor in standard_processors() {
		pipeline
			.add_processor(processor)
			.await
			.context("registering a standard processor")?;
	}

	if config.notifications.enabled {
		for channel in &config.notifications.channels {
			match channel {
				NotificationChannel::Webhook => {
					let url = config
						.notifications
						.webhook_url
						.clone()
						.context("webhook channel enabled without webhook_url")?;
					pipeline
						.add_notifier(Arc::new(WebhookNotifier::new("webhook", url)))
						.await
						.context("registering webhook notifier")?;
				}
				NotificationChannel::RedisPubsub => {
					let redis_channel = config
						.notifications
						.redis_channel
						.clone()
						.context("redis_pubsub channel enabled without redis_channel")?;
					let notifier = PubSubNotifier::new("redis_pubsub", &config.database.redis_url, redis_channel)
						.context("constructing redis pub/sub notifier")?;
					pipeline
						.add_notifier(Arc::new(notifier))
						.await
						.context("registering redis pub/sub notifier")?;
				}
			}
		}
	}

	let structured_log = StructuredLogNotifier::new("structured_log", &config.logging)
		.context("opening structured log notifier's event log file")?;
	pipeline
		.add_notifier(Arc::new(structured_log))
		.await
		.context("registering structured log notifier")?;

	Ok(pipeline)
}

async fn load_targets(facade: &ListenerFacade, config: &ListenerConfig) -> Result<()> {
	for address in &config.targets.addresses.watch_addresses {
		facade
			.add_wallet_address(address.clone(), None)
			.await
			.with_context(|| format!("registering watched address '{address}'"))?;
	}

	let contract_lists: [(&[String], &str); 5] = [
		(&config.targets.contracts.erc20_contracts, "erc20"),
		(&config.targets.contracts.erc721_contracts, "erc721"),
		(&config.targets.contracts.trc20_contracts, "trc20"),
		(&config.targets.contracts.trc721_contracts, "trc721"),
		(&config.targets.contracts.spl_token_programs, "spl_token"),
	];
	for (addresses, label) in contract_lists {
		for address in addresses {
			facade
				.add_token_contract(address.clone(), None)
				.await
				.with_context(|| format!("registering {label} contract '{address}'"))?;
		}
	}

	for enhanced in config.targets.enhanced_targets.clone() {
		let id = enhanced.id.clone();
		let chains = enhanced.chains.clone();
		let target = enhanced
			.into_target()
			.with_context(|| format!("invalid enhanced target '{id}'"))?;
		facade
			.add_enhanced_target(target, chains)
			.await
			.with_context(|| format!("registering enhanced target '{id}'"))?;
	}

	info!(
		count = config.targets.addresses.watch_addresses.len()
			+ config.targets.enhanced_targets.len(),
		"targets loaded"
	);
	Ok(())
}
