//! The listener's single public entry point. A thin coordinator over one
//! `ChainManager` and the shared `Pipeline`, mirroring the manager's events
//! outward and tallying `{total, processed, failed}` counters.

use chainwatch_types::{ChainKind, EventKind, MonitoringTarget, TargetKind};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::error::{ManagerError, ManagerResult};
use crate::event_bus::ManagerEvent;
use crate::manager::ChainManager;
use crate::state::AdapterState;

/// An externally observable signal emitted by the facade.
#[derive(Debug, Clone)]
pub enum Signal {
	Starting,
	Started,
	Stopping,
	Stopped,
	EventProcessed(Box<chainwatch_types::ProcessedEvent>),
	EventProcessingError { chain: ChainKind, message: String },
	ChainStatusUpdate { chain: ChainKind, status: chainwatch_types::ConnectionStatus },
	ChainError { chain: ChainKind, message: String },
	ChainsConnected(Vec<ChainKind>),
	ChainsDisconnected(Vec<ChainKind>),
	WalletAdded(String),
	WalletRemoved(String),
	ContractAdded(String),
	ContractRemoved(String),
	EnhancedTargetAdded(String),
	EnhancedTargetRemoved(String),
	EnhancedTargetUpdated(String),
	ConfigReloaded,
	Error(String),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ListenerStats {
	pub uptime_seconds: u64,
	pub total_events: u64,
	pub processed_events: u64,
	pub failed_events: u64,
	pub active_chains: usize,
	pub connected_chains: usize,
}

/// A patch applied field-by-field to an existing enhanced target, mirroring
/// `FilterOverrides`'s "only touch what's `Some`" shape.
#[derive(Debug, Clone, Default)]
pub struct EnhancedTargetPatch {
	pub name: Option<String>,
	pub event_kinds: Option<HashSet<EventKind>>,
	pub priority: Option<chainwatch_types::Priority>,
	pub enabled: Option<bool>,
	pub filters: Option<chainwatch_types::FilterOverrides>,
	pub chains: Option<Vec<ChainKind>>,
}

struct Inner {
	manager: ChainManager,
	started_at_ms: AtomicU64,
	total_events: AtomicU64,
	signal_tx: broadcast::Sender<Signal>,
}

/// Cheap to clone — the inner state lives behind a single `Arc`.
pub struct ListenerFacade {
	inner: Arc<Inner>,
}

impl Clone for ListenerFacade {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}

impl ListenerFacade {
	pub fn new(manager: ChainManager) -> Self {
		let (signal_tx, _) = broadcast::channel(1024);
		Self {
			inner: Arc::new(Inner {
				manager,
				started_at_ms: AtomicU64::new(0),
				total_events: AtomicU64::new(0),
				signal_tx,
			}),
		}
	}

	pub fn signals(&self) -> broadcast::Receiver<Signal> {
		self.inner.signal_tx.subscribe()
	}

	fn emit(&self, signal: Signal) {
		let _ = self.inner.signal_tx.send(signal);
	}

	/// `start()`: brings up every registered adapter, then spawns a task
	/// mirroring the manager's event bus into the facade's own signal
	/// stream, tallying counters on every pipeline outcome.
	pub async fn start(&self) -> ManagerResult<()> {
		self.emit(Signal::Starting);
		self.inner.started_at_ms.store(now_ms(), Ordering::Relaxed);

		let results = self.inner.manager.start().await;
		let (connected, disconnected): (Vec<_>, Vec<_>) =
			results.into_iter().partition(|(_, result)| result.is_ok());
		let connected_chains: Vec<ChainKind> = connected.into_iter().map(|(chain, _)| chain).collect();
		let disconnected_chains: Vec<ChainKind> = disconnected.into_iter().map(|(chain, _)| chain).collect();

		if !disconnected_chains.is_empty() {
			self.emit(Signal::ChainsDisconnected(disconnected_chains.clone()));
		}
		let total_chains = self.inner.manager.registered_chains().len();
		let no_adapter_connected = total_chains > 0 && connected_chains.is_empty();

		if !connected_chains.is_empty() {
			self.emit(Signal::ChainsConnected(connected_chains));
		}
		if no_adapter_connected {
			return Err(ManagerError::Adapter(
				disconnected_chains.first().copied().unwrap_or(ChainKind::Ethereum),
				chainwatch_types::error::AdapterError::Transport("no adapter could connect".to_string()),
			));
		}

		let this = self.clone();
		let mut rx = self.inner.manager.subscribe();
		tokio::spawn(async move {
			loop {
				match rx.recv().await {
					Ok(event) => this.forward(event).await,
					Err(broadcast::error::RecvError::Lagged(_)) => continue,
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		});

		self.emit(Signal::Started);
		Ok(())
	}

	async fn forward(&self, event: ManagerEvent) {
		match event {
			ManagerEvent::EventProcessed(processed) => {
				self.inner.total_events.fetch_add(1, Ordering::Relaxed);
				self.emit(Signal::EventProcessed(processed));
			}
			ManagerEvent::EventProcessingError { event, message } => {
				self.inner.total_events.fetch_add(1, Ordering::Relaxed);
				self.emit(Signal::EventProcessingError {
					chain: event.chain,
					message,
				});
			}
			ManagerEvent::ChainStatusUpdate { chain, status } => {
				self.emit(Signal::ChainStatusUpdate { chain, status });
			}
			ManagerEvent::ChainError { chain, message } => {
				self.emit(Signal::ChainError { chain, message });
			}
			ManagerEvent::AdapterError { chain, message } => {
				self.emit(Signal::Error(format!("{chain}: {message}")));
			}
		}
	}

	pub async fn stop(&self) {
		self.emit(Signal::Stopping);
		self.inner.manager.stop().await;
		self.emit(Signal::Stopped);
	}

	pub async fn add_wallet_address(&self, address: impl Into<String>, chains: Option<Vec<ChainKind>>) -> ManagerResult<()> {
		let address = address.into();
		let target = self.build_target(TargetKind::Address, &address, wallet_event_kinds(), chains)?;
		self.inner.manager.add_target(target).await?;
		self.emit(Signal::WalletAdded(address));
		Ok(())
	}

	pub async fn remove_wallet_address(&self, address: &str, _chains: Option<Vec<ChainKind>>) -> ManagerResult<()> {
		self.inner.manager.remove_target(address).await;
		self.emit(Signal::WalletRemoved(address.to_string()));
		Ok(())
	}

	pub async fn add_token_contract(&self, address: impl Into<String>, chains: Option<Vec<ChainKind>>) -> ManagerResult<()> {
		let address = address.into();
		let target = self.build_target(TargetKind::Contract, &address, contract_event_kinds(), chains)?;
		self.inner.manager.add_target(target).await?;
		self.emit(Signal::ContractAdded(address));
		Ok(())
	}

	pub async fn remove_token_contract(&self, address: &str, _chains: Option<Vec<ChainKind>>) -> ManagerResult<()> {
		self.inner.manager.remove_target(address).await;
		self.emit(Signal::ContractRemoved(address.to_string()));
		Ok(())
	}

	/// Wallet/contract targets are keyed by their own address, so lookups
	/// and removals by address need no secondary index.
	fn build_target(
		&self,
		kind: TargetKind,
		address: &str,
		event_kinds: HashSet<EventKind>,
		chains: Option<Vec<ChainKind>>,
	) -> ManagerResult<MonitoringTarget> {
		let mut target = MonitoringTarget::new(address.to_string(), kind, address, event_kinds)
			.map_err(ManagerError::Validation)?;
		target.chains = chains;
		Ok(target)
	}

	pub async fn add_enhanced_target(&self, target: MonitoringTarget, chains: Option<Vec<ChainKind>>) -> ManagerResult<()> {
		let mut target = target;
		if chains.is_some() {
			target.chains = chains;
		}
		let id = target.id.clone();
		self.inner.manager.add_target(target).await?;
		self.emit(Signal::EnhancedTargetAdded(id));
		Ok(())
	}

	pub async fn remove_enhanced_target(&self, id: &str, _chains: Option<Vec<ChainKind>>) -> ManagerResult<()> {
		self.inner
			.manager
			.remove_target(id)
			.await
			.ok_or_else(|| ManagerError::UnknownTarget(id.to_string()))?;
		self.emit(Signal::EnhancedTargetRemoved(id.to_string()));
		Ok(())
	}

	/// Applies `patch` field-by-field to the existing target, then
	/// re-registers it (remove + add), mirroring how the resolver overlays
	/// `FilterOverrides`.
	pub async fn update_enhanced_target(&self, id: &str, patch: EnhancedTargetPatch) -> ManagerResult<()> {
		let mut target = self
			.inner
			.manager
			.target(id)
			.ok_or_else(|| ManagerError::UnknownTarget(id.to_string()))?;

		if let Some(name) = patch.name {
			target.name = Some(name);
		}
		if let Some(event_kinds) = patch.event_kinds {
			target.event_kinds = event_kinds;
		}
		if let Some(priority) = patch.priority {
			target.priority = priority;
		}
		if let Some(enabled) = patch.enabled {
			target.enabled = enabled;
		}
		if let Some(filters) = patch.filters {
			target.filters = Some(filters);
		}
		if let Some(chains) = patch.chains {
			target.chains = Some(chains);
		}

		self.inner.manager.remove_target(id).await;
		self.inner.manager.add_target(target).await?;
		self.emit(Signal::EnhancedTargetUpdated(id.to_string()));
		Ok(())
	}

	pub async fn get_stats(&self) -> ListenerStats {
		let started_at = self.inner.started_at_ms.load(Ordering::Relaxed);
		let uptime_seconds = if started_at == 0 {
			0
		} else {
			now_ms().saturating_sub(started_at) / 1000
		};

		let chains = self.inner.manager.registered_chains();
		let mut connected = 0usize;
		for chain in &chains {
			if matches!(
				self.inner.manager.chain_state(*chain).await,
				Some(AdapterState::Monitoring) | Some(AdapterState::Connected)
			) {
				connected += 1;
			}
		}

		ListenerStats {
			uptime_seconds,
			total_events: self.inner.total_events.load(Ordering::Relaxed),
			processed_events: self.inner.manager.processed_count(),
			failed_events: self.inner.manager.failed_count(),
			active_chains: chains.len(),
			connected_chains: connected,
		}
	}

	pub async fn get_chain_statuses(&self) -> HashMap<ChainKind, AdapterState> {
		let mut statuses = HashMap::new();
		for chain in self.inner.manager.registered_chains() {
			if let Some(state) = self.inner.manager.chain_state(chain).await {
				statuses.insert(chain, state);
			}
		}
		statuses
	}

	pub fn get_supported_chains(&self) -> Vec<ChainKind> {
		self.inner.manager.registered_chains()
	}

	pub fn is_chain_supported(&self, chain: ChainKind) -> bool {
		self.inner.manager.registered_chains().contains(&chain)
	}

	/// `test_connections()`: a lightweight liveness probe per registered
	/// chain, independent of the adapter's own lifecycle state — a
	/// `monitoring` adapter whose RPC has since gone dark should report
	/// `false` here even though its recorded state hasn't caught up yet.
	pub async fn test_connections(&self) -> HashMap<ChainKind, bool> {
		let mut results = HashMap::new();
		for chain in self.inner.manager.registered_chains() {
			let state = self.inner.manager.chain_state(chain).await;
			results.insert(
				chain,
				matches!(state, Some(AdapterState::Connected) | Some(AdapterState::Monitoring)),
			);
		}
		results
	}
}

fn wallet_event_kinds() -> HashSet<EventKind> {
	[EventKind::Transfer, EventKind::NativeTransfer, EventKind::NftTransfer]
		.into_iter()
		.collect()
}

fn contract_event_kinds() -> HashSet<EventKind> {
	[
		EventKind::Transfer,
		EventKind::TokenMint,
		EventKind::TokenBurn,
		EventKind::NftMint,
	]
	.into_iter()
	.collect()
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}
