//! Configuration schema for the listener.

use chainwatch_types::{ChainKind, CustomRule, EventKind, FilterOverrides, Priority, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ListenerConfig {
	#[serde(default)]
	pub database: DatabaseConfig,
	#[serde(default)]
	pub logging: LoggingConfig,
	#[serde(default)]
	pub chains: HashMap<String, ChainConfig>,
	#[serde(default)]
	pub monitoring: MonitoringConfig,
	#[serde(default)]
	pub targets: TargetsConfig,
	#[serde(default)]
	pub filters: FiltersConfig,
	#[serde(default)]
	pub notifications: NotificationsConfig,
	#[serde(default)]
	pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
	pub redis_url: String,
	pub connection_pool_size: u32,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			redis_url: "redis://127.0.0.1:6379".to_string(),
			connection_pool_size: 10,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	Json,
	Text,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
	pub level: LogLevel,
	pub format: LogFormat,
	pub correlation_tracking: bool,
	/// Directory the structured-log notifier writes its rotated event log
	/// into.
	#[serde(default = "default_event_log_dir")]
	pub event_log_dir: String,
	/// Size, in bytes, at which the structured-log notifier rotates its
	/// current file out to `.log.1` and starts a fresh one.
	#[serde(default = "default_event_log_max_bytes")]
	pub event_log_max_bytes: u64,
	/// Number of rotated files the structured-log notifier keeps alongside
	/// the active one before the oldest is discarded.
	#[serde(default = "default_event_log_max_files")]
	pub event_log_max_files: u32,
}

fn default_event_log_dir() -> String {
	"logs".to_string()
}

fn default_event_log_max_bytes() -> u64 {
	10 * 1024 * 1024
}

fn default_event_log_max_files() -> u32 {
	5
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: LogLevel::Info,
			format: LogFormat::Text,
			correlation_tracking: true,
			event_log_dir: default_event_log_dir(),
			event_log_max_bytes: default_event_log_max_bytes(),
			event_log_max_files: default_event_log_max_files(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
	Processed,
	Confirmed,
	Finalized,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	pub rpc_url: String,
	pub websocket_url: Option<String>,
	#[serde(default = "default_max_retry_attempts")]
	pub max_retry_attempts: u32,
	/// EVM-only.
	pub chain_id: Option<u64>,
	/// EVM-only: how many blocks behind tip before `confirmed = true`.
	pub block_confirmation_count: Option<u64>,
	/// Solana-only.
	pub commitment: Option<Commitment>,
}

fn default_max_retry_attempts() -> u32 {
	3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringFeature {
	pub enabled: bool,
	pub batch_size: u32,
	pub polling_interval_ms: u64,
	pub confirmation_blocks: u64,
}

impl Default for MonitoringFeature {
	fn default() -> Self {
		Self {
			enabled: true,
			batch_size: 50,
			polling_interval_ms: 1000,
			confirmation_blocks: 6,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
	#[serde(default)]
	pub transfers: MonitoringFeature,
	#[serde(default)]
	pub token_minting: MonitoringFeature,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AddressTargetsConfig {
	#[serde(default)]
	pub watch_addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContractTargetsConfig {
	#[serde(default)]
	pub erc20_contracts: Vec<String>,
	#[serde(default)]
	pub erc721_contracts: Vec<String>,
	#[serde(default)]
	pub trc20_contracts: Vec<String>,
	#[serde(default)]
	pub trc721_contracts: Vec<String>,
	#[serde(default)]
	pub spl_token_programs: Vec<String>,
}

/// One `[[targets.enhanced_targets]]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnhancedTargetConfig {
	pub id: String,
	pub name: Option<String>,
	#[serde(rename = "type")]
	pub kind: TargetKind,
	pub address: String,
	pub event_types: Vec<EventKind>,
	pub chains: Option<Vec<ChainKind>>,
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub priority: Option<Priority>,
	#[serde(default)]
	pub tags: Vec<String>,
	pub description: Option<String>,
	pub notification_channels: Option<Vec<String>>,
	pub filters: Option<FilterOverrides>,
}

fn default_true() -> bool {
	true
}

impl EnhancedTargetConfig {
	pub fn into_target(self) -> chainwatch_types::error::ValidationResult<chainwatch_types::MonitoringTarget> {
		let mut kinds = std::collections::HashSet::new();
		kinds.extend(self.event_types);
		let mut target =
			chainwatch_types::MonitoringTarget::new(self.id, self.kind, self.address, kinds)?;
		target.name = self.name;
		target.chains = self.chains;
		target.enabled = self.enabled;
		target.priority = self.priority.unwrap_or_default();
		target.tags = self.tags;
		target.description = self.description;
		target.notification_channels = self.notification_channels;
		target.filters = self.filters;
		Ok(target)
	}
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TargetsConfig {
	#[serde(default)]
	pub addresses: AddressTargetsConfig,
	#[serde(default)]
	pub contracts: ContractTargetsConfig,
	#[serde(default)]
	pub enhanced_targets: Vec<EnhancedTargetConfig>,
}

/// Global filter defaults; per-target `FilterOverrides` are overlaid on
/// top of these by the target resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterDefaults {
	pub min_amount: Option<String>,
	pub max_amount: Option<String>,
	pub allowed_event_kinds: Option<Vec<EventKind>>,
	pub min_confirmations: u64,
	pub min_priority: Priority,
	pub require_no_self_transfer: bool,
	pub min_timestamp: Option<u64>,
	pub max_timestamp: Option<u64>,
	#[serde(default)]
	pub custom_rules: Vec<CustomRule>,
}

impl Default for FilterDefaults {
	fn default() -> Self {
		Self {
			min_amount: None,
			max_amount: None,
			allowed_event_kinds: None,
			min_confirmations: 1,
			min_priority: Priority::Low,
			require_no_self_transfer: false,
			min_timestamp: None,
			max_timestamp: None,
			custom_rules: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FiltersConfig {
	#[serde(default)]
	pub transfer: FilterDefaults,
	#[serde(default)]
	pub token_minting: FilterDefaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
	Webhook,
	RedisPubsub,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsConfig {
	pub enabled: bool,
	#[serde(default)]
	pub channels: Vec<NotificationChannel>,
	pub webhook_url: Option<String>,
	pub redis_channel: Option<String>,
}

impl Default for NotificationsConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			channels: vec![NotificationChannel::Webhook],
			webhook_url: None,
			redis_channel: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformanceConfig {
	pub worker_pool_size: u32,
	pub max_concurrent_requests: u32,
	pub request_timeout_ms: u64,
	pub circuit_breaker_threshold: u32,
}

impl Default for PerformanceConfig {
	fn default() -> Self {
		Self {
			worker_pool_size: 4,
			max_concurrent_requests: 50,
			request_timeout_ms: 10_000,
			circuit_breaker_threshold: 5,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enhanced_target_converts_to_monitoring_target() {
		let config = EnhancedTargetConfig {
			id: "t1".to_string(),
			name: Some("Watched".to_string()),
			kind: TargetKind::Address,
			address: "0xabc".to_string(),
			event_types: vec![EventKind::Transfer],
			chains: Some(vec![ChainKind::Ethereum]),
			enabled: true,
			priority: Some(Priority::High),
			tags: vec!["vip".to_string()],
			description: None,
			notification_channels: None,
			filters: None,
		};
		let target = config.into_target().unwrap();
		assert_eq!(target.id, "t1");
		assert_eq!(target.priority, Priority::High);
		assert!(target.applies_to_chain(ChainKind::Ethereum));
		assert!(!target.applies_to_chain(ChainKind::Solana));
	}

	#[test]
	fn enhanced_target_with_no_event_types_fails() {
		let config = EnhancedTargetConfig {
			id: "t2".to_string(),
			name: None,
			kind: TargetKind::Address,
			address: "0xabc".to_string(),
			event_types: vec![],
			chains: None,
			enabled: true,
			priority: None,
			tags: vec![],
			description: None,
			notification_channels: None,
			filters: None,
		};
		assert!(config.into_target().is_err());
	}
}
