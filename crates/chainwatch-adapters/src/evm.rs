//! EVM-family adapter (Ethereum, BSC, and TRX routed through an
//! EVM-compatible full node). A block-range polling loop behind
//! `chainwatch_types::ChainAdapter`: native-value transfers are detected
//! by scanning each block's transaction list rather than subscribing to
//! logs, since an EVM node never emits logs for plain value transfers.
//!
//! ERC-20 `Transfer(address,address,uint256)` events are read from
//! `eth_getLogs`, scoped per block and per tracked token address, and
//! classified as a mint or burn when either side is the zero address.

use async_trait::async_trait;
use chainwatch_types::{
	Amount, AdapterError, AdapterResult, AdapterSink, CanonicalEvent, ChainAdapter, ChainKind,
	ConnectionStatus, EventData, EventKind, MonitoringTarget, RetryConfig, TargetKind, with_retry,
};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::dedup::DedupSet;
use crate::rpc::JsonRpcClient;

/// `keccak256("Transfer(address,address,uint256)")`, the standard ERC-20
/// transfer log topic.
const ERC20_TRANSFER_TOPIC: &str =
	"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmVariant {
	Ethereum,
	Bsc,
	/// TRX routed through an EVM-compatible full node instead of Tron's
	/// native REST API (see `TronAdapter` in `tron.rs` for that path).
	TronEvm,
}

impl EvmVariant {
	fn chain_kind(self) -> ChainKind {
		match self {
			EvmVariant::Ethereum => ChainKind::Ethereum,
			EvmVariant::Bsc => ChainKind::Bsc,
			EvmVariant::TronEvm => ChainKind::TronEvm,
		}
	}
}

/// Base58 Tron address: 34 characters, `T` prefix, Base58 alphabet (no
/// `0`, `O`, `I`, `l`). Matches the validator `TronAdapter` uses for its
/// own native addresses.
fn is_base58_tron_address(address: &str) -> bool {
	address.len() == 34
		&& address.starts_with('T')
		&& address
			.chars()
			.all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
}

#[derive(Debug)]
struct SharedState {
	status: Mutex<ConnectionStatus>,
	last_heartbeat_ms: AtomicU64,
	last_block_seen: AtomicU64,
	dedup: DedupSet,
}

impl SharedState {
	fn new() -> Self {
		Self {
			status: Mutex::new(ConnectionStatus::Disconnected),
			last_heartbeat_ms: AtomicU64::new(0),
			last_block_seen: AtomicU64::new(0),
			dedup: DedupSet::new(),
		}
	}

	fn set_status(&self, status: ConnectionStatus) {
		*self.status.lock().unwrap() = status;
	}

	fn touch_heartbeat(&self) {
		let now = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_millis() as u64;
		self.last_heartbeat_ms.store(now, Ordering::Relaxed);
	}
}

#[derive(Debug)]
pub struct EvmAdapter {
	variant: EvmVariant,
	rpc_url: String,
	retry: RetryConfig,
	block_confirmation_count: u64,
	poll_interval: Duration,
	rpc: Option<Arc<JsonRpcClient>>,
	targets: Arc<DashMap<String, MonitoringTarget>>,
	state: Arc<SharedState>,
	sink: Option<AdapterSink>,
	monitor_handle: Option<JoinHandle<()>>,
	heartbeat_handle: Option<JoinHandle<()>>,
}

impl EvmAdapter {
	pub fn new(variant: EvmVariant, rpc_url: impl Into<String>) -> Self {
		Self {
			variant,
			rpc_url: rpc_url.into(),
			retry: RetryConfig::default(),
			block_confirmation_count: 6,
			poll_interval: Duration::from_millis(1000),
			rpc: None,
			targets: Arc::new(DashMap::new()),
			state: Arc::new(SharedState::new()),
			sink: None,
			monitor_handle: None,
			heartbeat_handle: None,
		}
	}

	pub fn with_confirmations(mut self, count: u64) -> Self {
		self.block_confirmation_count = count;
		self
	}

	pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
		self.poll_interval = Duration::from_millis(ms);
		self
	}

	fn rpc(&self) -> AdapterResult<Arc<JsonRpcClient>> {
		self.rpc.clone().ok_or(AdapterError::NotConnected)
	}
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
	fn chain_kind(&self) -> ChainKind {
		self.variant.chain_kind()
	}

	async fn connect(&mut self, sink: AdapterSink) -> AdapterResult<()> {
		if self.rpc.is_some() {
			return Ok(());
		}
		let client = Arc::new(JsonRpcClient::new(self.rpc_url.clone(), self.retry.clone()));
		let tip = fetch_block_number(&client, &self.retry).await?;
		self.state.last_block_seen.store(tip, Ordering::Relaxed);
		self.state.set_status(ConnectionStatus::Connected);
		self.state.touch_heartbeat();
		self.rpc = Some(client.clone());
		self.sink = Some(sink.clone());

		let state = self.state.clone();
		let heartbeat_sink = sink.clone();
		self.heartbeat_handle = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
			loop {
				ticker.tick().await;
				match client.call("eth_blockNumber", json!([])).await {
					Ok(value) => {
						if let Some(block) = value.as_str().and_then(|s| hex_to_u64(s).ok()) {
							state.last_block_seen.store(block, Ordering::Relaxed);
						}
						state.touch_heartbeat();
					}
					Err(err) => {
						state.set_status(ConnectionStatus::Error(err.to_string()));
						let _ = heartbeat_sink.emit_status(ConnectionStatus::Error(err.to_string()));
					}
				}
			}
		}));

		sink.emit_status(ConnectionStatus::Connected)?;
		Ok(())
	}

	async fn disconnect(&mut self) -> AdapterResult<()> {
		if let Some(handle) = self.heartbeat_handle.take() {
			handle.abort();
		}
		if let Some(handle) = self.monitor_handle.take() {
			handle.abort();
		}
		self.rpc = None;
		self.state.set_status(ConnectionStatus::Disconnected);
		Ok(())
	}

	async fn start_monitoring(&mut self) -> AdapterResult<()> {
		let rpc = self.rpc()?;
		let sink = self.sink.clone().ok_or(AdapterError::NotConnected)?;
		self.state.set_status(ConnectionStatus::Monitoring);

		let state = self.state.clone();
		let targets = self.targets.clone();
		let chain = self.chain_kind();
		let confirmations = self.block_confirmation_count;
		let poll_interval = self.poll_interval;

		// Start from the current tip minus one so the first tick scans the
		// block we just connected against instead of replaying history.
		let tip_now = state.last_block_seen.load(Ordering::Relaxed);
		state
			.last_block_seen
			.store(tip_now.saturating_sub(1), Ordering::Relaxed);

		self.monitor_handle = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(poll_interval);
			loop {
				ticker.tick().await;
				if let Err(err) =
					poll_once(&rpc, &state, &targets, &sink, chain, confirmations).await
				{
					tracing::warn!(chain = %chain, error = %err, "evm poll iteration failed");
				}
			}
		}));

		Ok(())
	}

	async fn stop_monitoring(&mut self) -> AdapterResult<()> {
		if let Some(handle) = self.monitor_handle.take() {
			handle.abort();
		}
		self.state.set_status(ConnectionStatus::Connected);
		Ok(())
	}

	async fn add_monitoring_target(&mut self, target: MonitoringTarget) -> AdapterResult<()> {
		if !self.validate_address(&target.address) {
			return Err(AdapterError::Protocol(format!(
				"invalid {} address: {}",
				self.chain_kind(),
				target.address
			)));
		}
		self.targets
			.insert(target.address.to_lowercase(), target);
		Ok(())
	}

	async fn remove_monitoring_target(&mut self, address: &str) -> AdapterResult<()> {
		self.targets.remove(&address.to_lowercase());
		Ok(())
	}

	async fn current_block_number(&self) -> AdapterResult<u64> {
		fetch_block_number(&*self.rpc()?, &self.retry).await
	}

	fn connection_status(&self) -> ConnectionStatus {
		self.state.status.lock().unwrap().clone()
	}

	fn validate_address(&self, address: &str) -> bool {
		if let Some(stripped) = address.strip_prefix("0x") {
			return stripped.len() == 40 && stripped.chars().all(|c| c.is_ascii_hexdigit());
		}
		self.variant == EvmVariant::TronEvm && is_base58_tron_address(address)
	}

	async fn estimate_fee(&self) -> AdapterResult<Amount> {
		let rpc = self.rpc()?;
		let retry = self.retry.clone();
		let value = with_retry(&retry, || async { rpc.call("eth_gasPrice", json!([])).await }).await?;
		let gas_price = value
			.as_str()
			.and_then(|s| hex_to_u128(s).ok())
			.ok_or_else(|| AdapterError::Protocol("eth_gasPrice returned non-hex result".into()))?;
		Ok(Amount::from_u128(gas_price))
	}

	fn last_heartbeat(&self) -> u64 {
		self.state.last_heartbeat_ms.load(Ordering::Relaxed)
	}
}

async fn fetch_block_number(rpc: &JsonRpcClient, retry: &RetryConfig) -> AdapterResult<u64> {
	let value = with_retry(retry, || async { rpc.call("eth_blockNumber", json!([])).await }).await?;
	value
		.as_str()
		.and_then(|s| hex_to_u64(s).ok())
		.ok_or_else(|| AdapterError::Protocol("eth_blockNumber returned non-hex result".into()))
}

async fn poll_once(
	rpc: &JsonRpcClient,
	state: &SharedState,
	targets: &DashMap<String, MonitoringTarget>,
	sink: &AdapterSink,
	chain: ChainKind,
	confirmations: u64,
) -> AdapterResult<()> {
	if targets.is_empty() {
		return Ok(());
	}
	let tip = fetch_block_number(rpc, &RetryConfig::default()).await?;
	let from = state.last_block_seen.load(Ordering::Relaxed) + 1;
	if from > tip {
		return Ok(());
	}
	// Bound a single tick's backlog so a long adapter outage cannot make one
	// poll iteration scan an unbounded number of blocks.
	let to = tip.min(from + 50);

	for block_number in from..=to {
		scan_block(
			rpc,
			targets,
			sink,
			chain,
			block_number,
			tip,
			confirmations,
			&state.dedup,
		)
		.await?;
	}
	state.last_block_seen.store(to, Ordering::Relaxed);
	Ok(())
}

async fn scan_block(
	rpc: &JsonRpcClient,
	targets: &DashMap<String, MonitoringTarget>,
	sink: &AdapterSink,
	chain: ChainKind,
	block_number: u64,
	tip: u64,
	confirmations: u64,
	dedup: &DedupSet,
) -> AdapterResult<()> {
	let block = rpc
		.call(
			"eth_getBlockByNumber",
			json!([format!("0x{:x}", block_number), true]),
		)
		.await?;
	if block.is_null() {
		return Ok(());
	}
	let timestamp = block
		.get("timestamp")
		.and_then(Value::as_str)
		.and_then(|s| hex_to_u64(s).ok())
		.unwrap_or(0)
		* 1000;
	let confirmation_count = tip.saturating_sub(block_number);
	let confirmed = confirmation_count >= confirmations;

	if let Some(transactions) = block.get("transactions").and_then(Value::as_array) {
		for tx in transactions {
			if tx.get("to").map(Value::is_null).unwrap_or(true) {
				emit_contract_creation_if_tracked(
					rpc,
					tx,
					targets,
					sink,
					chain,
					block_number,
					timestamp,
					confirmation_count,
					confirmed,
					dedup,
				)
				.await;
			} else {
				emit_native_transfer_if_tracked(
					tx,
					targets,
					sink,
					chain,
					block_number,
					timestamp,
					confirmation_count,
					confirmed,
					dedup,
				)
				.await;
			}
		}
	}

	// Snapshot the targets of interest before issuing any RPC call so we
	// never hold a DashMap shard guard across an await point.
	let token_targets: Vec<MonitoringTarget> = targets
		.iter()
		.filter(|t| t.kind == TargetKind::Contract || t.kind == TargetKind::Token)
		.filter(|t| {
			t.event_kinds
				.iter()
				.any(|k| matches!(k, EventKind::Transfer | EventKind::TokenMint | EventKind::TokenBurn))
		})
		.map(|t| t.clone())
		.collect();

	for target in &token_targets {
		let logs = rpc
			.call(
				"eth_getLogs",
				json!([{
					"fromBlock": format!("0x{:x}", block_number),
					"toBlock": format!("0x{:x}", block_number),
					"address": target.address,
					"topics": [ERC20_TRANSFER_TOPIC],
				}]),
			)
			.await?;
		if let Some(logs) = logs.as_array() {
			for (index, log) in logs.iter().enumerate() {
				emit_token_transfer(
					log,
					target,
					sink,
					chain,
					block_number,
					timestamp,
					confirmation_count,
					confirmed,
					index,
					dedup,
				)
				.await;
			}
		}
	}

	Ok(())
}

async fn emit_contract_creation_if_tracked(
	rpc: &JsonRpcClient,
	tx: &Value,
	targets: &DashMap<String, MonitoringTarget>,
	sink: &AdapterSink,
	chain: ChainKind,
	block_number: u64,
	timestamp: u64,
	confirmation_count: u64,
	confirmed: bool,
	dedup: &DedupSet,
) {
	let from = match tx.get("from").and_then(Value::as_str) {
		Some(f) => f.to_lowercase(),
		None => return,
	};
	let tx_hash = match tx.get("hash").and_then(Value::as_str) {
		Some(h) => h.to_string(),
		None => return,
	};
	let wants_contract_creation = targets
		.get(&from)
		.map(|t| t.event_kinds.contains(&EventKind::ContractCreation))
		.unwrap_or(false);
	if !wants_contract_creation {
		return;
	}

	let id = CanonicalEvent::build_id(chain, &tx_hash, None);
	if dedup.check_and_insert(&id).await {
		return;
	}

	let receipt = match rpc
		.call("eth_getTransactionReceipt", json!([tx_hash]))
		.await
	{
		Ok(r) => r,
		Err(err) => {
			tracing::debug!(tx_hash, error = %err, "eth_getTransactionReceipt failed");
			return;
		}
	};
	let Some(contract_address) = receipt.get("contractAddress").and_then(Value::as_str) else {
		return;
	};

	let event = CanonicalEvent {
		id,
		chain,
		kind: EventKind::ContractCreation,
		block_number,
		tx_hash,
		timestamp,
		confirmed,
		confirmation_count,
		data: EventData::ContractCreation {
			contract_address: contract_address.to_string(),
			creator: Some(from),
		},
		metadata: Default::default(),
	};
	if let Err(err) = sink.emit_event(event) {
		tracing::warn!(chain = %chain, error = %err, "failed to emit contract creation event");
	}
}

async fn emit_native_transfer_if_tracked(
	tx: &Value,
	targets: &DashMap<String, MonitoringTarget>,
	sink: &AdapterSink,
	chain: ChainKind,
	block_number: u64,
	timestamp: u64,
	confirmation_count: u64,
	confirmed: bool,
	dedup: &DedupSet,
) {
	let from = tx.get("from").and_then(Value::as_str).map(str::to_lowercase);
	let to = tx.get("to").and_then(Value::as_str).map(str::to_lowercase);
	let tx_hash = match tx.get("hash").and_then(Value::as_str) {
		Some(h) => h.to_string(),
		None => return,
	};
	let value = tx
		.get("value")
		.and_then(Value::as_str)
		.and_then(|s| hex_to_u128(s).ok())
		.unwrap_or(0);
	if value == 0 {
		return;
	}

	let wants_native_transfer = {
		let matched = from
			.as_deref()
			.and_then(|a| targets.get(a))
			.or_else(|| to.as_deref().and_then(|a| targets.get(a)));
		match matched {
			Some(target) => target.event_kinds.contains(&EventKind::NativeTransfer),
			None => false,
		}
	};
	if !wants_native_transfer {
		return;
	}

	let id = CanonicalEvent::build_id(chain, &tx_hash, None);
	if dedup.check_and_insert(&id).await {
		return;
	}

	let gas_used = tx
		.get("gas")
		.and_then(Value::as_str)
		.and_then(|s| hex_to_u64(s).ok());
	let gas_price = tx
		.get("gasPrice")
		.and_then(Value::as_str)
		.and_then(|s| hex_to_u128(s).ok())
		.map(Amount::from_u128);

	let event = CanonicalEvent {
		id,
		chain,
		kind: EventKind::NativeTransfer,
		block_number,
		tx_hash,
		timestamp,
		confirmed,
		confirmation_count,
		data: EventData::NativeTransfer {
			from,
			to,
			amount: Amount::from_u128(value),
			fee: None,
			gas_used,
			gas_price,
		},
		metadata: Default::default(),
	};
	if let Err(err) = sink.emit_event(event) {
		tracing::warn!(chain = %chain, error = %err, "failed to emit native transfer event");
	}
}

async fn emit_token_transfer(
	log: &Value,
	target: &MonitoringTarget,
	sink: &AdapterSink,
	chain: ChainKind,
	block_number: u64,
	timestamp: u64,
	confirmation_count: u64,
	confirmed: bool,
	log_index: usize,
	dedup: &DedupSet,
) {
	let Some(topics) = log.get("topics").and_then(Value::as_array) else {
		return;
	};
	if topics.len() < 3 {
		return;
	}
	let tx_hash = match log.get("transactionHash").and_then(Value::as_str) {
		Some(h) => h.to_string(),
		None => return,
	};
	let from = topic_to_address(topics[1].as_str().unwrap_or(""));
	let to = topic_to_address(topics[2].as_str().unwrap_or(""));
	let amount = log
		.get("data")
		.and_then(Value::as_str)
		.and_then(|s| hex_to_u128(s).ok())
		.unwrap_or(0);

	let kind = if is_zero_address(&from) {
		EventKind::TokenMint
	} else if is_zero_address(&to) {
		EventKind::TokenBurn
	} else {
		EventKind::Transfer
	};
	if !target.event_kinds.contains(&kind) {
		return;
	}

	let id = CanonicalEvent::build_id(chain, &tx_hash, Some(log_index as u64));
	if dedup.check_and_insert(&id).await {
		return;
	}

	let data = match kind {
		EventKind::TokenMint => EventData::TokenMint {
			to,
			amount: Amount::from_u128(amount),
			token_address: Some(target.address.clone()),
			token_symbol: None,
			minter: None,
		},
		EventKind::TokenBurn => EventData::TokenBurn {
			from,
			amount: Amount::from_u128(amount),
			token_address: Some(target.address.clone()),
			token_symbol: None,
		},
		_ => EventData::Transfer {
			from,
			to,
			amount: Amount::from_u128(amount),
			token_address: Some(target.address.clone()),
			token_symbol: None,
			gas_used: None,
			gas_price: None,
		},
	};

	let event = CanonicalEvent {
		id,
		chain,
		kind,
		block_number,
		tx_hash,
		timestamp,
		confirmed,
		confirmation_count,
		data,
		metadata: Default::default(),
	};
	if let Err(err) = sink.emit_event(event) {
		tracing::warn!(chain = %chain, error = %err, "failed to emit token transfer event");
	}
}

fn topic_to_address(topic: &str) -> String {
	let stripped = topic.strip_prefix("0x").unwrap_or(topic);
	if stripped.len() < 40 {
		return format!("0x{}", stripped);
	}
	format!("0x{}", &stripped[stripped.len() - 40..])
}

fn is_zero_address(address: &str) -> bool {
	address
		.trim_start_matches("0x")
		.chars()
		.all(|c| c == '0')
}

fn hex_to_u64(s: &str) -> AdapterResult<u64> {
	u64::from_str_radix(s.trim_start_matches("0x"), 16)
		.map_err(|e| AdapterError::Protocol(format!("invalid hex integer {}: {}", s, e)))
}

fn hex_to_u128(s: &str) -> AdapterResult<u128> {
	u128::from_str_radix(s.trim_start_matches("0x"), 16)
		.map_err(|e| AdapterError::Protocol(format!("invalid hex integer {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validate_address_requires_hex_40() {
		let adapter = EvmAdapter::new(EvmVariant::Ethereum, "http://localhost:8545");
		assert!(adapter.validate_address("0x0000000000000000000000000000000000000001"));
		assert!(!adapter.validate_address("not-an-address"));
		assert!(!adapter.validate_address("0x123"));
	}

	#[test]
	fn tron_evm_accepts_hex_and_base58() {
		let adapter = EvmAdapter::new(EvmVariant::TronEvm, "http://localhost:8545");
		assert!(adapter.validate_address("0x0000000000000000000000000000000000000001"));
		assert!(adapter.validate_address("TN3W4H6rK2ce4vX9YnFQHwKENnHjoxb3m9"));
		assert!(!adapter.validate_address("TshortAddress"));
	}

	#[test]
	fn non_tron_variant_rejects_base58() {
		let adapter = EvmAdapter::new(EvmVariant::Ethereum, "http://localhost:8545");
		assert!(!adapter.validate_address("TN3W4H6rK2ce4vX9YnFQHwKENnHjoxb3m9"));
	}

	#[test]
	fn topic_to_address_strips_padding() {
		let topic = "0x000000000000000000000000abcabcabcabcabcabcabcabcabcabcabcabcab";
		assert_eq!(topic_to_address(topic), "0xabcabcabcabcabcabcabcabcabcabcabcabcabc");
	}

	#[test]
	fn zero_address_detection() {
		assert!(is_zero_address("0x0000000000000000000000000000000000000000"));
		assert!(!is_zero_address("0x0000000000000000000000000000000000000001"));
	}

	#[test]
	fn hex_decoding_round_trips() {
		assert_eq!(hex_to_u64("0x10").unwrap(), 16);
		assert_eq!(hex_to_u128("0xff").unwrap(), 255);
	}
}
