//! The abstract chain adapter contract and the signals it emits upward to
//! the chain manager: a chain-agnostic trait covering connect/disconnect,
//! start/stop monitoring, target registration, and a push-events-to-a-sink
//! lifecycle, rather than a single EVM-flavored RPC surface.

use crate::amount::Amount;
use crate::chain::ChainKind;
use crate::error::{AdapterError, AdapterResult};
use crate::event::CanonicalEvent;
use crate::target::MonitoringTarget;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc;

/// One of the three signals an adapter emits upward through its sink.
#[derive(Debug, Clone)]
pub enum AdapterSignal {
	BlockchainEvent(CanonicalEvent),
	ConnectionStatus(ConnectionStatus),
	Error(String),
}

/// An adapter's self-reported connection state, independent of the chain
/// manager's own per-adapter state machine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
	Disconnected,
	Connecting,
	Connected,
	Monitoring,
	Error(String),
}

/// Sink adapters push signals into; the chain manager holds the receiving
/// end. A thin wrapper around an `mpsc::UnboundedSender`.
#[derive(Debug, Clone)]
pub struct AdapterSink {
	sender: mpsc::UnboundedSender<AdapterSignal>,
}

impl AdapterSink {
	pub fn new(sender: mpsc::UnboundedSender<AdapterSignal>) -> Self {
		Self { sender }
	}

	pub fn send(&self, signal: AdapterSignal) -> AdapterResult<()> {
		self.sender
			.send(signal)
			.map_err(|_| AdapterError::Transport("event sink closed".to_string()))
	}

	pub fn emit_event(&self, event: CanonicalEvent) -> AdapterResult<()> {
		self.send(AdapterSignal::BlockchainEvent(event))
	}

	pub fn emit_status(&self, status: ConnectionStatus) -> AdapterResult<()> {
		self.send(AdapterSignal::ConnectionStatus(status))
	}

	pub fn emit_error(&self, error: impl Into<String>) -> AdapterResult<()> {
		self.send(AdapterSignal::Error(error.into()))
	}
}

/// Retry policy shared by adapters' RPC calls and notifiers' deliveries —
/// one routine, not duplicated per caller. Default backoff is
/// `min(1000 * 2^attempt, 30000)` milliseconds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub initial_delay_ms: u64,
	pub max_delay_ms: u64,
	pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			initial_delay_ms: 1000,
			max_delay_ms: 30000,
			backoff_multiplier: 2.0,
		}
	}
}

impl RetryConfig {
	/// Delay before the given zero-indexed attempt, per
	/// `min(initial * multiplier^attempt, max)`.
	pub fn delay_ms(&self, attempt: u32) -> u64 {
		let scaled = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
		scaled.min(self.max_delay_ms as f64) as u64
	}
}

/// Per-chain lifecycle, target registry, and event emission contract.
#[async_trait]
pub trait ChainAdapter: Send + Sync + Debug {
	fn chain_kind(&self) -> ChainKind;

	/// Establish transport, fetch current tip, start the 30s heartbeat.
	/// Idempotent: calling on an already-connected adapter is a no-op.
	async fn connect(&mut self, sink: AdapterSink) -> AdapterResult<()>;

	/// Idempotent teardown; stops the heartbeat before releasing the
	/// transport handle.
	async fn disconnect(&mut self) -> AdapterResult<()>;

	/// May only run after `connect`. Sets up subscriptions/polling for
	/// every currently registered target.
	async fn start_monitoring(&mut self) -> AdapterResult<()>;

	async fn stop_monitoring(&mut self) -> AdapterResult<()>;

	/// Validates the target's address, updates the local target map, and
	/// wires a subscription/poll entry for it.
	async fn add_monitoring_target(&mut self, target: MonitoringTarget) -> AdapterResult<()>;

	async fn remove_monitoring_target(&mut self, address: &str) -> AdapterResult<()>;

	async fn current_block_number(&self) -> AdapterResult<u64>;

	fn connection_status(&self) -> ConnectionStatus;

	fn validate_address(&self, address: &str) -> bool;

	async fn estimate_fee(&self) -> AdapterResult<Amount>;

	/// Unix-millis timestamp of the adapter's last successful heartbeat,
	/// used by the manager's health sweep to compute staleness.
	fn last_heartbeat(&self) -> u64;
}
