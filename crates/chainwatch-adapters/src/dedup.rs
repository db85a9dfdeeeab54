//! Bounded per-adapter de-duplication set: recently observed event ids
//! evict by count once the set exceeds a ceiling (order of 10^4 entries).
//! Single-writer, so this holds a plain `HashSet` + `VecDeque` behind a
//! `Mutex` rather than reaching for `dashmap` (that's reserved for the
//! hot, multi-reader target registry elsewhere in the workspace).

use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;

const DEFAULT_CEILING: usize = 10_000;

#[derive(Debug)]
pub struct DedupSet {
	ceiling: usize,
	inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
	seen: HashSet<String>,
	order: VecDeque<String>,
}

impl DedupSet {
	pub fn new() -> Self {
		Self::with_ceiling(DEFAULT_CEILING)
	}

	pub fn with_ceiling(ceiling: usize) -> Self {
		Self {
			ceiling,
			inner: Mutex::new(Inner {
				seen: HashSet::new(),
				order: VecDeque::new(),
			}),
		}
	}

	/// Returns `true` if `id` was already seen (and should be suppressed).
	/// Otherwise records it, evicting the oldest entry if the ceiling is
	/// exceeded, and returns `false`.
	pub async fn check_and_insert(&self, id: &str) -> bool {
		let mut inner = self.inner.lock().await;
		if inner.seen.contains(id) {
			return true;
		}
		inner.seen.insert(id.to_string());
		inner.order.push_back(id.to_string());
		if inner.order.len() > self.ceiling {
			if let Some(oldest) = inner.order.pop_front() {
				inner.seen.remove(&oldest);
			}
		}
		false
	}

	pub async fn len(&self) -> usize {
		self.inner.lock().await.order.len()
	}
}

impl Default for DedupSet {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn first_observation_is_not_a_duplicate() {
		let set = DedupSet::new();
		assert!(!set.check_and_insert("id-1").await);
		assert!(set.check_and_insert("id-1").await);
	}

	#[tokio::test]
	async fn evicts_oldest_past_ceiling() {
		let set = DedupSet::with_ceiling(2);
		assert!(!set.check_and_insert("a").await);
		assert!(!set.check_and_insert("b").await);
		assert!(!set.check_and_insert("c").await); // evicts "a"
		assert_eq!(set.len().await, 2);
		assert!(!set.check_and_insert("a").await); // "a" was evicted, so it's fresh again
	}
}
