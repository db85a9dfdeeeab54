//! Owns every registered adapter, drives its state machine, forwards its
//! signals into the pipeline, and runs the health sweep that triggers
//! reconnects: settle-all startup and teardown over the whole adapter set,
//! plus a ticking background task that reads per-adapter heartbeat age and
//! reacts.

use chainwatch_pipeline::Pipeline;
use chainwatch_types::{AdapterSignal, AdapterSink, ChainAdapter, ChainKind, MonitoringTarget};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ManagerError, ManagerResult};
use crate::event_bus::{EventBus, ManagerEvent};
use crate::registry::AdapterEntry;
use crate::resolver::TargetResolver;
use crate::state::AdapterState;

pub struct ManagerConfig {
	pub health_check_interval: Duration,
	pub reconnect_delay: Duration,
	pub auto_reconnect: bool,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			health_check_interval: Duration::from_secs(30),
			reconnect_delay: Duration::from_secs(5),
			auto_reconnect: true,
		}
	}
}

struct Inner {
	adapters: DashMap<ChainKind, Arc<AdapterEntry>>,
	targets: DashMap<String, MonitoringTarget>,
	pipeline: Arc<Pipeline>,
	resolver: Arc<TargetResolver>,
	event_bus: EventBus,
	config: ManagerConfig,
	sweep_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
	processed_count: AtomicU64,
	failed_count: AtomicU64,
}

/// Cheap to clone: every field is an `Arc` or a concurrent map.
pub struct ChainManager {
	inner: Arc<Inner>,
}

impl Clone for ChainManager {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl ChainManager {
	pub fn new(pipeline: Arc<Pipeline>, resolver: Arc<TargetResolver>, config: ManagerConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				adapters: DashMap::new(),
				targets: DashMap::new(),
				pipeline,
				resolver,
				event_bus: EventBus::new(1024),
				config,
				sweep_handle: tokio::sync::Mutex::new(None),
				processed_count: AtomicU64::new(0),
				failed_count: AtomicU64::new(0),
			}),
		}
	}

	pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ManagerEvent> {
		self.inner.event_bus.subscribe()
	}

	pub fn processed_count(&self) -> u64 {
		self.inner.processed_count.load(Ordering::Relaxed)
	}

	pub fn failed_count(&self) -> u64 {
		self.inner.failed_count.load(Ordering::Relaxed)
	}

	pub fn registered_chains(&self) -> Vec<ChainKind> {
		self.inner.adapters.iter().map(|e| *e.key()).collect()
	}

	pub async fn chain_state(&self, chain: ChainKind) -> Option<AdapterState> {
		let entry = self.entry(chain).ok()?;
		let state = entry.state.read().await;
		Some(*state)
	}

	/// Registers the target locally and pushes it to every adapter whose
	/// chain it applies to, so chain-native subscriptions/polling pick it up.
	pub async fn add_target(&self, target: MonitoringTarget) -> ManagerResult<()> {
		for chain in self.registered_chains() {
			if !target.applies_to_chain(chain) {
				continue;
			}
			let entry = self.entry(chain)?;
			let mut adapter = entry.adapter.lock().await;
			adapter
				.add_monitoring_target(target.clone())
				.await
				.map_err(|err| ManagerError::Adapter(chain, err))?;
		}
		self.inner.targets.insert(target.id.clone(), target);
		Ok(())
	}

	pub async fn remove_target(&self, id: &str) -> Option<MonitoringTarget> {
		let removed = self.inner.targets.remove(id).map(|(_, target)| target)?;
		for chain in self.registered_chains() {
			if !removed.applies_to_chain(chain) {
				continue;
			}
			if let Ok(entry) = self.entry(chain) {
				let mut adapter = entry.adapter.lock().await;
				let _ = adapter.remove_monitoring_target(&removed.address).await;
			}
		}
		Some(removed)
	}

	pub fn target(&self, id: &str) -> Option<MonitoringTarget> {
		self.inner.targets.get(id).map(|t| t.clone())
	}

	/// `register(adapter)`: sets `registered`; duplicate chain kinds are
	/// rejected.
	pub fn register(&self, adapter: Box<dyn ChainAdapter>) -> ManagerResult<()> {
		let chain = adapter.chain_kind();
		if self.inner.adapters.contains_key(&chain) {
			return Err(ManagerError::DuplicateChain(chain));
		}
		self.inner
			.adapters
			.insert(chain, Arc::new(AdapterEntry::new(adapter)));
		Ok(())
	}

	fn entry(&self, chain: ChainKind) -> ManagerResult<Arc<AdapterEntry>> {
		self.inner
			.adapters
			.get(&chain)
			.map(|e| e.clone())
			.ok_or(ManagerError::UnknownChain(chain))
	}

	async fn set_state(&self, chain: ChainKind, state: AdapterState) {
		if let Ok(entry) = self.entry(chain) {
			*entry.state.write().await = state;
		}
	}

	/// `start()`: drives every registered adapter concurrently through
	/// `connect` then `start_monitoring` via a settle-all join, so one
	/// adapter's failure does not prevent others from starting.
	pub async fn start(&self) -> Vec<(ChainKind, ManagerResult<()>)> {
		let chains = self.registered_chains();
		let mut set = tokio::task::JoinSet::new();
		for chain in chains {
			let this = self.clone();
			set.spawn(async move {
				let result = this.connect_and_monitor(chain).await;
				(chain, result)
			});
		}

		let mut results = Vec::new();
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((chain, Ok(()))) => results.push((chain, Ok(()))),
				Ok((chain, Err(err))) => {
					warn!(chain = %chain, error = %err, "adapter failed to start");
					self.inner.event_bus.publish(ManagerEvent::AdapterError {
						chain,
						message: err.to_string(),
					});
					results.push((chain, Err(err)));
				}
				Err(join_err) => warn!(error = %join_err, "adapter start task panicked"),
			}
		}

		self.start_health_sweep();
		results
	}

	async fn connect_and_monitor(&self, chain: ChainKind) -> ManagerResult<()> {
		let entry = self.entry(chain)?;
		self.set_state(chain, AdapterState::Connecting).await;

		let (tx, rx) = mpsc::unbounded_channel();
		let sink = AdapterSink::new(tx);
		{
			let mut adapter = entry.adapter.lock().await;
			adapter
				.connect(sink)
				.await
				.map_err(|err| ManagerError::Adapter(chain, err))?;
		}
		self.set_state(chain, AdapterState::Connected).await;

		let this = self.clone();
		let handle = tokio::spawn(async move { this.dispatch_signals(chain, rx).await });
		*entry.signal_task.lock().await = Some(handle);

		{
			let mut adapter = entry.adapter.lock().await;
			adapter
				.start_monitoring()
				.await
				.map_err(|err| ManagerError::Adapter(chain, err))?;
		}
		self.set_state(chain, AdapterState::Monitoring).await;
		info!(chain = %chain, "adapter monitoring started");
		Ok(())
	}

	async fn dispatch_signals(&self, chain: ChainKind, mut rx: mpsc::UnboundedReceiver<AdapterSignal>) {
		while let Some(signal) = rx.recv().await {
			match signal {
				AdapterSignal::BlockchainEvent(event) => self.handle_event(chain, event).await,
				AdapterSignal::ConnectionStatus(status) => {
					self.inner
						.event_bus
						.publish(ManagerEvent::ChainStatusUpdate { chain, status });
				}
				AdapterSignal::Error(message) => {
					self.inner
						.event_bus
						.publish(ManagerEvent::ChainError { chain, message });
				}
			}
		}
		debug!(chain = %chain, "adapter signal channel closed");
	}

	/// Event plumbing: hand the event to `pipeline.execute` once per
	/// candidate target; a non-`none` result is re-emitted as
	/// `event_processed`, a thrown error as `event_processing_error`.
	async fn handle_event(&self, chain: ChainKind, event: chainwatch_types::CanonicalEvent) {
		let candidates: Vec<MonitoringTarget> = self
			.inner
			.targets
			.iter()
			.filter(|t| t.enabled && t.applies_to_chain(chain) && t.event_kinds.contains(&event.kind))
			.map(|t| t.clone())
			.collect();

		for target in candidates {
			let resolved = self
				.inner
				.resolver
				.resolve_for_target(&target, chain, event.kind)
				.await;
			let correlation_id = uuid::Uuid::new_v4().to_string();
			match self
				.inner
				.pipeline
				.execute(event.clone(), &target, &resolved, correlation_id)
				.await
			{
				Ok(Some(processed)) => {
					self.inner.processed_count.fetch_add(1, Ordering::Relaxed);
					self.inner
						.event_bus
						.publish(ManagerEvent::EventProcessed(Box::new(processed)));
				}
				Ok(None) => {}
				Err(err) => {
					self.inner.failed_count.fetch_add(1, Ordering::Relaxed);
					self.inner.event_bus.publish(ManagerEvent::EventProcessingError {
						event: Box::new(event.clone()),
						message: err.to_string(),
					});
				}
			}
		}
	}

	/// `stop()`: reverses the startup sequence, best-effort.
	pub async fn stop(&self) {
		let chains = self.registered_chains();
		let mut set = tokio::task::JoinSet::new();
		for chain in chains {
			let this = self.clone();
			set.spawn(async move { this.disconnect_one(chain).await });
		}
		while set.join_next().await.is_some() {}
		self.stop_health_sweep().await;
	}

	async fn disconnect_one(&self, chain: ChainKind) {
		let Ok(entry) = self.entry(chain) else { return };
		self.set_state(chain, AdapterState::Stopping).await;
		{
			let mut adapter = entry.adapter.lock().await;
			if let Err(err) = adapter.stop_monitoring().await {
				warn!(chain = %chain, error = %err, "stop_monitoring failed");
			}
			if let Err(err) = adapter.disconnect().await {
				warn!(chain = %chain, error = %err, "disconnect failed");
			}
		}
		if let Some(handle) = entry.signal_task.lock().await.take() {
			handle.abort();
		}
		self.set_state(chain, AdapterState::Disconnected).await;
	}

	/// `reconnect(chain)`: `disconnect → sleep(reconnect_delay) → connect →
	/// start_monitoring`.
	pub async fn reconnect(&self, chain: ChainKind) -> ManagerResult<()> {
		self.disconnect_one(chain).await;
		tokio::time::sleep(self.inner.config.reconnect_delay).await;
		self.set_state(chain, AdapterState::Connecting).await;
		self.connect_and_monitor(chain).await
	}

	fn start_health_sweep(&self) {
		let this = self.clone();
		let interval = self.inner.config.health_check_interval;
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			loop {
				ticker.tick().await;
				this.sweep_once().await;
			}
		});
		let inner = self.inner.clone();
		tokio::spawn(async move {
			*inner.sweep_handle.lock().await = Some(handle);
		});
	}

	async fn stop_health_sweep(&self) {
		if let Some(handle) = self.inner.sweep_handle.lock().await.take() {
			handle.abort();
		}
	}

	/// Health sweep: every `health_check_interval`, for each adapter compute
	/// `staleness = now - last_heartbeat`; if `staleness > 2 *
	/// health_check_interval` and auto-reconnect is enabled, schedule a
	/// reconnect.
	async fn sweep_once(&self) {
		let now = now_ms();
		let threshold = 2 * self.inner.config.health_check_interval.as_millis() as u64;
		let chains = self.registered_chains();
		for chain in chains {
			let Ok(entry) = self.entry(chain) else { continue };
			let last_heartbeat = {
				let adapter = entry.adapter.lock().await;
				adapter.last_heartbeat()
			};
			if last_heartbeat == 0 {
				continue;
			}
			let staleness = now.saturating_sub(last_heartbeat);
			if staleness > threshold && self.inner.config.auto_reconnect {
				warn!(chain = %chain, staleness_ms = staleness, "adapter heartbeat stale, scheduling reconnect");
				let this = self.clone();
				tokio::spawn(async move {
					if let Err(err) = this.reconnect(chain).await {
						warn!(chain = %chain, error = %err, "scheduled reconnect failed");
					}
				});
			}
		}
	}

	/// Exposes the shared resolver so a config-reload path can call
	/// `set_defaults` without the manager needing its own reload API.
	pub fn resolver(&self) -> Arc<TargetResolver> {
		self.inner.resolver.clone()
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}
