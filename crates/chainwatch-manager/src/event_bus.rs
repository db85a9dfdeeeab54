//! A thin broadcast-channel wrapper the chain manager publishes internal
//! lifecycle and processing events on.

use tokio::sync::broadcast;

/// One of the signals the chain manager emits upward as it registers,
/// connects, and drives adapters.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
	ChainStatusUpdate {
		chain: chainwatch_types::ChainKind,
		status: chainwatch_types::ConnectionStatus,
	},
	ChainError {
		chain: chainwatch_types::ChainKind,
		message: String,
	},
	AdapterError {
		chain: chainwatch_types::ChainKind,
		message: String,
	},
	EventProcessed(Box<chainwatch_types::ProcessedEvent>),
	EventProcessingError {
		event: Box<chainwatch_types::CanonicalEvent>,
		message: String,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<ManagerEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
		self.sender.subscribe()
	}

	/// A no-subscribers send failure is not an error here: the manager
	/// keeps running whether or not anyone is listening.
	pub fn publish(&self, event: ManagerEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
