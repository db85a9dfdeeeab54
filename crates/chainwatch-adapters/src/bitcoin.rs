//! Bitcoin adapter: per-transaction polling against an Esplora-compatible
//! REST API (`/address/{addr}/txs`, `/blocks/tip/height`). Bitcoin has no
//! native "transfer event", so each tick fetches the address's recent
//! transactions, keeps the ones that reference it in either an input's
//! `prevout` or an output, and emits a `native_transfer` per transaction
//! with the net value delta, direction, and the API's own `fee`/`status`
//! fields. A newly tracked address has its current transaction history
//! seeded into the dedup set so startup does not replay it as new.

use async_trait::async_trait;
use chainwatch_types::{
	Amount, AdapterError, AdapterResult, AdapterSink, CanonicalEvent, ChainAdapter, ChainKind,
	ConnectionStatus, EventData, EventKind, MonitoringTarget, RetryConfig, with_retry,
};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::dedup::DedupSet;
use crate::rpc::JsonRpcClient;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const LAST_MINUTE_WINDOW_SECS: u64 = 60;

#[derive(Debug)]
struct TrackedAddress {
	target: MonitoringTarget,
}

#[derive(Debug)]
struct SharedState {
	status: Mutex<ConnectionStatus>,
	last_heartbeat_ms: AtomicU64,
	last_height_seen: AtomicU64,
	height_cursor: AtomicU64,
	dedup: DedupSet,
}

impl SharedState {
	fn new() -> Self {
		Self {
			status: Mutex::new(ConnectionStatus::Disconnected),
			last_heartbeat_ms: AtomicU64::new(0),
			last_height_seen: AtomicU64::new(0),
			height_cursor: AtomicU64::new(0),
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
pub struct BitcoinAdapter {
	rest_url: String,
	retry: RetryConfig,
	poll_interval: Duration,
	rpc: Option<Arc<JsonRpcClient>>,
	addresses: Arc<DashMap<String, TrackedAddress>>,
	state: Arc<SharedState>,
	sink: Option<AdapterSink>,
	monitor_handle: Option<JoinHandle<()>>,
	heartbeat_handle: Option<JoinHandle<()>>,
}

impl BitcoinAdapter {
	pub fn new(rest_url: impl Into<String>) -> Self {
		Self {
			rest_url: rest_url.into(),
			retry: RetryConfig::default(),
			poll_interval: Duration::from_millis(5000),
			rpc: None,
			addresses: Arc::new(DashMap::new()),
			state: Arc::new(SharedState::new()),
			sink: None,
			monitor_handle: None,
			heartbeat_handle: None,
		}
	}

	fn rpc(&self) -> AdapterResult<Arc<JsonRpcClient>> {
		self.rpc.clone().ok_or(AdapterError::NotConnected)
	}
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
	fn chain_kind(&self) -> ChainKind {
		ChainKind::Bitcoin
	}

	async fn connect(&mut self, sink: AdapterSink) -> AdapterResult<()> {
		if self.rpc.is_some() {
			return Ok(());
		}
		let client = Arc::new(JsonRpcClient::new(self.rest_url.clone(), self.retry.clone()));
		let height = fetch_tip_height(&client, &self.retry).await?;
		self.state.last_height_seen.store(height, Ordering::Relaxed);
		self.state.height_cursor.store(height, Ordering::Relaxed);
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
				match client.get("/blocks/tip/height").await {
					Ok(value) => {
						if let Some(h) = value.as_u64() {
							state.last_height_seen.store(h, Ordering::Relaxed);
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
		let addresses = self.addresses.clone();
		let poll_interval = self.poll_interval;

		self.monitor_handle = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(poll_interval);
			loop {
				ticker.tick().await;
				if let Err(err) = poll_once(&rpc, &state, &addresses, &sink).await {
					tracing::warn!(chain = "bitcoin", error = %err, "bitcoin poll iteration failed");
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
				"invalid bitcoin address: {}",
				target.address
			)));
		}
		let key = target.address.clone();
		if let Ok(rpc) = self.rpc() {
			seed_dedup_from_history(&rpc, &key, &self.state.dedup).await;
		}
		self.addresses.insert(key, TrackedAddress { target });
		Ok(())
	}

	async fn remove_monitoring_target(&mut self, address: &str) -> AdapterResult<()> {
		self.addresses.remove(address);
		Ok(())
	}

	async fn current_block_number(&self) -> AdapterResult<u64> {
		fetch_tip_height(&*self.rpc()?, &self.retry).await
	}

	fn connection_status(&self) -> ConnectionStatus {
		self.state.status.lock().unwrap().clone()
	}

	fn validate_address(&self, address: &str) -> bool {
		let len_ok = (25..=62).contains(&address.len());
		let prefix_ok = address.starts_with('1')
			|| address.starts_with('3')
			|| address.starts_with("bc1");
		len_ok && prefix_ok
	}

	async fn estimate_fee(&self) -> AdapterResult<Amount> {
		let rpc = self.rpc()?;
		let retry = self.retry.clone();
		let estimates = with_retry(&retry, || async { rpc.get("/fee-estimates").await }).await?;
		let sat_per_vbyte = estimates
			.get("6")
			.and_then(Value::as_f64)
			.unwrap_or(10.0);
		Ok(Amount::from_u64(sat_per_vbyte.round() as u64))
	}

	fn last_heartbeat(&self) -> u64 {
		self.state.last_heartbeat_ms.load(Ordering::Relaxed)
	}
}

async fn fetch_tip_height(rpc: &JsonRpcClient, retry: &RetryConfig) -> AdapterResult<u64> {
	let value = with_retry(retry, || async { rpc.get("/blocks/tip/height").await }).await?;
	value
		.as_u64()
		.ok_or_else(|| AdapterError::Protocol("tip height response was not an integer".into()))
}

async fn poll_once(
	rpc: &JsonRpcClient,
	state: &SharedState,
	addresses: &DashMap<String, TrackedAddress>,
	sink: &AdapterSink,
) -> AdapterResult<()> {
	if addresses.is_empty() {
		return Ok(());
	}
	let height = fetch_tip_height(rpc, &RetryConfig::default()).await?;
	state.last_height_seen.store(height, Ordering::Relaxed);
	let previous_cursor = state.height_cursor.swap(height, Ordering::Relaxed);
	let blocks_advanced = height.saturating_sub(previous_cursor);
	tracing::debug!(height, blocks_advanced, "bitcoin cursor advanced");

	let keys: Vec<String> = addresses.iter().map(|e| e.key().clone()).collect();
	for address in keys {
		let Some(entry) = addresses.get(&address) else { continue };
		let target = entry.target.clone();
		drop(entry);
		if !target.event_kinds.contains(&EventKind::NativeTransfer) {
			continue;
		}
		poll_address_transactions(rpc, &address, height, sink, &state.dedup).await;
	}
	Ok(())
}

async fn seed_dedup_from_history(rpc: &JsonRpcClient, address: &str, dedup: &DedupSet) {
	let response = match rpc.get(&format!("/address/{}/txs", address)).await {
		Ok(v) => v,
		Err(err) => {
			tracing::debug!(address, error = %err, "bitcoin history seed poll failed");
			return;
		}
	};
	let Some(txs) = response.as_array() else { return };
	for tx in txs {
		if let Some(txid) = tx.get("txid").and_then(Value::as_str) {
			let id = CanonicalEvent::build_id(ChainKind::Bitcoin, txid, None);
			dedup.check_and_insert(&id).await;
		}
	}
}

/// One tick's worth of recent transactions for `address`: every transaction
/// referencing the address in an input's `prevout` or an output is a
/// candidate; one with equal input and output value at the address has no
/// net effect on it and is skipped.
async fn poll_address_transactions(
	rpc: &JsonRpcClient,
	address: &str,
	height: u64,
	sink: &AdapterSink,
	dedup: &DedupSet,
) {
	let response = match rpc.get(&format!("/address/{}/txs", address)).await {
		Ok(v) => v,
		Err(err) => {
			tracing::debug!(address, error = %err, "bitcoin address poll failed");
			return;
		}
	};
	let Some(txs) = response.as_array() else { return };

	for tx in txs {
		let Some(txid) = tx.get("txid").and_then(Value::as_str) else { continue };
		let inputs = tx.get("vin").and_then(Value::as_array).cloned().unwrap_or_default();
		let outputs = tx.get("vout").and_then(Value::as_array).cloned().unwrap_or_default();

		let input_value: u64 = inputs
			.iter()
			.filter(|i| prevout_address(i) == Some(address))
			.filter_map(|i| i.get("prevout").and_then(|p| p.get("value")).and_then(Value::as_u64))
			.sum();
		let output_value: u64 = outputs
			.iter()
			.filter(|o| o.get("scriptpubkey_address").and_then(Value::as_str) == Some(address))
			.filter_map(|o| o.get("value").and_then(Value::as_u64))
			.sum();

		let references_address =
			inputs.iter().any(|i| prevout_address(i) == Some(address)) || output_value > 0 || input_value > 0;
		if !references_address || input_value == output_value {
			continue;
		}

		let id = CanonicalEvent::build_id(ChainKind::Bitcoin, txid, None);
		if dedup.check_and_insert(&id).await {
			continue;
		}

		let incoming = output_value > input_value;
		let delta = if incoming {
			output_value - input_value
		} else {
			input_value - output_value
		};
		let confirmed = tx
			.get("status")
			.and_then(|s| s.get("confirmed"))
			.and_then(Value::as_bool)
			.unwrap_or(false);
		let confirmation_count = if confirmed { 6 } else { 0 };
		let fee = tx.get("fee").and_then(Value::as_u64).map(Amount::from_u64);
		let vsize = tx
			.get("vsize")
			.and_then(Value::as_u64)
			.or_else(|| tx.get("weight").and_then(Value::as_u64).map(|w| w.div_ceil(4)));

		let mut metadata = HashMap::new();
		metadata.insert("is_incoming".to_string(), incoming.to_string());
		metadata.insert("input_count".to_string(), inputs.len().to_string());
		metadata.insert("output_count".to_string(), outputs.len().to_string());
		if let Some(vsize) = vsize {
			metadata.insert("vsize".to_string(), vsize.to_string());
		}

		let event = CanonicalEvent {
			id,
			chain: ChainKind::Bitcoin,
			kind: EventKind::NativeTransfer,
			block_number: height,
			tx_hash: txid.to_string(),
			timestamp: now_ms(),
			confirmed,
			confirmation_count,
			data: EventData::NativeTransfer {
				from: if incoming { None } else { Some(address.to_string()) },
				to: if incoming { Some(address.to_string()) } else { None },
				amount: Amount::from_u64(delta),
				fee,
				gas_used: None,
				gas_price: None,
			},
			metadata,
		};
		if let Err(err) = sink.emit_event(event) {
			tracing::warn!(address, error = %err, txid, "failed to emit bitcoin native transfer");
		}
	}
}

fn prevout_address(input: &Value) -> Option<&str> {
	input.get("prevout").and_then(|p| p.get("scriptpubkey_address")).and_then(Value::as_str)
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validate_address_accepts_legacy_and_segwit() {
		let adapter = BitcoinAdapter::new("https://blockstream.info/api");
		assert!(adapter.validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
		assert!(adapter.validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
		assert!(!adapter.validate_address("not-an-address"));
	}

	#[test]
	fn prevout_address_reads_nested_field() {
		let input = serde_json::json!({"prevout": {"scriptpubkey_address": "A"}});
		assert_eq!(prevout_address(&input), Some("A"));
		assert_eq!(prevout_address(&serde_json::json!({})), None);
	}

	#[test]
	fn incoming_transaction_delta_and_confirmations_match_esplora_fields() {
		let address = "A";
		let tx = serde_json::json!({
			"txid": "deadbeef",
			"fee": 1000,
			"weight": 560,
			"status": {"confirmed": true},
			"vin": [{"prevout": {"scriptpubkey_address": "other", "value": 0}}],
			"vout": [{"scriptpubkey_address": address, "value": 50_000}],
		});
		let inputs = tx.get("vin").and_then(Value::as_array).cloned().unwrap_or_default();
		let outputs = tx.get("vout").and_then(Value::as_array).cloned().unwrap_or_default();
		let input_value: u64 = inputs
			.iter()
			.filter(|i| prevout_address(i) == Some(address))
			.filter_map(|i| i.get("prevout").and_then(|p| p.get("value")).and_then(Value::as_u64))
			.sum();
		let output_value: u64 = outputs
			.iter()
			.filter(|o| o.get("scriptpubkey_address").and_then(Value::as_str) == Some(address))
			.filter_map(|o| o.get("value").and_then(Value::as_u64))
			.sum();
		assert_eq!(input_value, 0);
		assert_eq!(output_value, 50_000);
		let fee = tx.get("fee").and_then(Value::as_u64).map(Amount::from_u64);
		assert_eq!(fee.map(|a| a.render()), Some("1000".to_string()));
		let confirmed = tx.get("status").and_then(|s| s.get("confirmed")).and_then(Value::as_bool).unwrap_or(false);
		assert!(confirmed);
	}
}
