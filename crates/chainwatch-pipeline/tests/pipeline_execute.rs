//! Cross-module pipeline behavior, exercised as an integration test
//! against the crate's public API rather than a `#[cfg(test)]` module.

use async_trait::async_trait;
use chainwatch_pipeline::{standard_filters, NotifierError, Pipeline, ResolvedFilters};
use chainwatch_types::{
	Amount, CanonicalEvent, ChainKind, EventData, EventKind, MonitoringTarget, ProcessedEvent,
	TargetKind,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn transfer_event(from: &str, to: &str, amount: u64, confirmations: u64) -> CanonicalEvent {
	CanonicalEvent {
		id: format!("ethereum_{}", amount),
		chain: ChainKind::Ethereum,
		kind: EventKind::Transfer,
		block_number: 100,
		tx_hash: format!("0x{:064x}", amount),
		timestamp: 1_700_000_000,
		confirmed: confirmations >= 6,
		confirmation_count: confirmations,
		data: EventData::Transfer {
			from: from.to_string(),
			to: to.to_string(),
			amount: Amount::from_u64(amount),
			token_address: None,
			token_symbol: None,
			gas_used: None,
			gas_price: None,
		},
		metadata: Default::default(),
	}
}

fn address_target(address: &str) -> MonitoringTarget {
	let mut kinds = HashSet::new();
	kinds.insert(EventKind::Transfer);
	MonitoringTarget::new("watch-1", TargetKind::Address, address, kinds).unwrap()
}

struct CountingNotifier {
	count: Arc<AtomicUsize>,
}

#[async_trait]
impl chainwatch_pipeline::Notifier for CountingNotifier {
	fn channel_name(&self) -> &str {
		"counting"
	}

	async fn notify(&self, _event: &ProcessedEvent) -> Result<(), NotifierError> {
		self.count.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

struct FailingNotifier;

#[async_trait]
impl chainwatch_pipeline::Notifier for FailingNotifier {
	fn channel_name(&self) -> &str {
		"failing"
	}

	async fn notify(&self, _event: &ProcessedEvent) -> Result<(), NotifierError> {
		Err(NotifierError {
			channel: "failing".to_string(),
			message: "simulated delivery failure".to_string(),
			retry_count: 0,
		})
	}
}

async fn pipeline_with_standard_filters() -> Pipeline {
	let pipeline = Pipeline::new();
	for filter in standard_filters() {
		pipeline.add_filter(filter).await.unwrap();
	}
	pipeline
}

#[tokio::test]
async fn matching_event_is_processed_and_notified() {
	let pipeline = pipeline_with_standard_filters().await;
	let count = Arc::new(AtomicUsize::new(0));
	pipeline
		.add_notifier(Arc::new(CountingNotifier { count: count.clone() }))
		.await
		.unwrap();

	let target = address_target("0xaaa");
	let event = transfer_event("0xaaa", "0xbbb", 500, 6);
	let resolved = ResolvedFilters::default();

	let processed = pipeline
		.execute(event, &target, &resolved, "corr-1")
		.await
		.unwrap();

	let processed = processed.expect("event should pass all standard filters");
	assert_eq!(processed.notifications.len(), 1);
	assert!(processed.notifications[0].success);
	assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn event_below_confirmation_threshold_is_rejected() {
	let pipeline = pipeline_with_standard_filters().await;
	let target = address_target("0xaaa");
	let event = transfer_event("0xaaa", "0xbbb", 500, 1);
	let mut resolved = ResolvedFilters::default();
	resolved.min_confirmations = 6;

	let processed = pipeline
		.execute(event, &target, &resolved, "corr-2")
		.await
		.unwrap();

	assert!(processed.is_none());
}

#[tokio::test]
async fn notifier_failure_does_not_abort_other_notifiers() {
	let pipeline = pipeline_with_standard_filters().await;
	let count = Arc::new(AtomicUsize::new(0));
	pipeline.add_notifier(Arc::new(FailingNotifier)).await.unwrap();
	pipeline
		.add_notifier(Arc::new(CountingNotifier { count: count.clone() }))
		.await
		.unwrap();

	let target = address_target("0xaaa");
	let event = transfer_event("0xaaa", "0xbbb", 500, 6);
	let resolved = ResolvedFilters::default();

	let processed = pipeline
		.execute(event, &target, &resolved, "corr-3")
		.await
		.unwrap()
		.expect("event should pass all standard filters");

	assert_eq!(processed.notifications.len(), 2);
	assert_eq!(count.load(Ordering::SeqCst), 1);
	let failing_record = processed
		.notifications
		.iter()
		.find(|record| record.channel == "failing")
		.unwrap();
	assert!(!failing_record.success);
	assert!(failing_record.error.is_some());
}

#[tokio::test]
async fn duplicate_filter_registration_is_rejected() {
	let pipeline = Pipeline::new();
	let filters = standard_filters();
	pipeline.add_filter(filters[0].clone()).await.unwrap();
	assert!(pipeline.add_filter(filters[0].clone()).await.is_err());
}
