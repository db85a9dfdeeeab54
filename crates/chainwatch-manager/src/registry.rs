//! A chain-keyed registry entry: the boxed adapter alongside its lifecycle
//! state and its signal-dispatch task handle.

use chainwatch_types::ChainAdapter;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::state::AdapterState;

pub struct AdapterEntry {
	pub adapter: Mutex<Box<dyn ChainAdapter>>,
	pub state: RwLock<AdapterState>,
	pub signal_task: Mutex<Option<JoinHandle<()>>>,
}

impl AdapterEntry {
	pub fn new(adapter: Box<dyn ChainAdapter>) -> Self {
		Self {
			adapter: Mutex::new(adapter),
			state: RwLock::new(AdapterState::Registered),
			signal_task: Mutex::new(None),
		}
	}
}
