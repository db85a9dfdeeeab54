//! The pipeline itself: filter → enrich → process → notify, run once per
//! canonical event against one matched target. Registered stages run in
//! order and a per-stage failure never aborts the whole event — a failing
//! enricher is logged and skipped, a failing notifier is reported, not
//! propagated. Only a filter that cannot evaluate the event at all (as
//! opposed to evaluating it and rejecting it) aborts `execute` early.

use chainwatch_types::{
	CanonicalEvent, Classification, CustomRule, EventKind, MonitoringTarget, NotificationRecord,
	Priority, ProcessedEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::enrich::Enricher;
use crate::error::{PipelineError, Result};
use crate::filters::Filter;
use crate::notifier::Notifier;
use crate::processor::Processor;

/// Global filter defaults overlaid with a target's `FilterOverrides`,
/// computed by the target resolver in `chainwatch-manager` and handed to
/// `Pipeline::execute` by reference — never read from a global singleton.
#[derive(Debug, Clone)]
pub struct ResolvedFilters {
	pub min_amount: Option<String>,
	pub max_amount: Option<String>,
	pub allowed_event_kinds: Option<HashSet<EventKind>>,
	pub min_confirmations: u64,
	pub min_priority: Priority,
	pub require_no_self_transfer: bool,
	pub min_timestamp: Option<u64>,
	pub max_timestamp: Option<u64>,
	pub custom_rules: Vec<CustomRule>,
}

impl Default for ResolvedFilters {
	fn default() -> Self {
		Self {
			min_amount: None,
			max_amount: None,
			allowed_event_kinds: None,
			min_confirmations: 1,
			min_priority: Priority::Low,
			require_no_self_transfer: false,
			min_timestamp: None,
			max_timestamp: None,
			custom_rules: Vec::new(),
		}
	}
}

pub struct Pipeline {
	/// Insertion-ordered, unlike `notifiers`: once the highest-priority
	/// enabled filter rejects an event, lower-priority filters must never
	/// run, which only holds if iteration order is deterministic.
	filters: RwLock<Vec<Arc<dyn Filter>>>,
	/// Insertion-ordered: each enricher sees the event the previous one
	/// produced.
	enrichers: RwLock<Vec<Arc<dyn Enricher>>>,
	/// Insertion-ordered: the first processor that classifies the event
	/// wins, so later processors must never run once one has.
	processors: RwLock<Vec<Arc<dyn Processor>>>,
	notifiers: RwLock<HashMap<String, Arc<dyn Notifier>>>,
}

impl Pipeline {
	pub fn new() -> Self {
		Self {
			filters: RwLock::new(Vec::new()),
			enrichers: RwLock::new(Vec::new()),
			processors: RwLock::new(Vec::new()),
			notifiers: RwLock::new(HashMap::new()),
		}
	}

	pub async fn add_filter(&self, filter: Arc<dyn Filter>) -> Result<()> {
		let mut filters = self.filters.write().await;
		if filters.iter().any(|f| f.name() == filter.name()) {
			return Err(PipelineError::Registry(format!(
				"filter '{}' is already registered",
				filter.name()
			)));
		}
		filters.push(filter);
		Ok(())
	}

	pub async fn add_enricher(&self, enricher: Arc<dyn Enricher>) -> Result<()> {
		let mut enrichers = self.enrichers.write().await;
		if enrichers.iter().any(|e| e.name() == enricher.name()) {
			return Err(PipelineError::Registry(format!(
				"enricher '{}' is already registered",
				enricher.name()
			)));
		}
		enrichers.push(enricher);
		Ok(())
	}

	pub async fn add_processor(&self, processor: Arc<dyn Processor>) -> Result<()> {
		let mut processors = self.processors.write().await;
		if processors.iter().any(|p| p.name() == processor.name()) {
			return Err(PipelineError::Registry(format!(
				"processor '{}' is already registered",
				processor.name()
			)));
		}
		processors.push(processor);
		Ok(())
	}

	pub async fn add_notifier(&self, notifier: Arc<dyn Notifier>) -> Result<()> {
		let mut notifiers = self.notifiers.write().await;
		if notifiers.contains_key(notifier.channel_name()) {
			return Err(PipelineError::Registry(format!(
				"notifier '{}' is already registered",
				notifier.channel_name()
			)));
		}
		notifiers.insert(notifier.channel_name().to_string(), notifier);
		Ok(())
	}

	/// Run the full pipeline for one event matched against one target.
	/// Returns `Ok(None)` when any filter rejects the event — rejection is
	/// not an error, it is the expected common case.
	pub async fn execute(
		&self,
		event: CanonicalEvent,
		target: &MonitoringTarget,
		resolved: &ResolvedFilters,
		correlation_id: impl Into<String>,
	) -> Result<Option<ProcessedEvent>> {
		let filters = self.filters.read().await;
		for filter in filters.iter() {
			match filter.apply(&event, target, resolved) {
				Ok(true) => {}
				Ok(false) => {
					tracing::trace!(filter = filter.name(), event_id = %event.id, "event rejected by filter");
					return Ok(None);
				}
				Err(message) => {
					return Err(PipelineError::Filter(filter.name().to_string(), message));
				}
			}
		}
		let filters_applied: Vec<String> = filters.iter().map(|f| f.name().to_string()).collect();
		drop(filters);

		let mut event = event;
		let enrichers = self.enrichers.read().await;
		for enricher in enrichers.iter() {
			event = match enricher.enrich(event.clone()) {
				Ok(enriched) => enriched,
				Err(message) => {
					tracing::warn!(
						enricher = enricher.name(),
						event_id = %event.id,
						error = %message,
						"enricher failed, passing event through unchanged"
					);
					event
				}
			};
		}
		drop(enrichers);

		let processors = self.processors.read().await;
		let classification = processors
			.iter()
			.find_map(|processor| processor.process(&event))
			.unwrap_or_else(Classification::default_medium);
		drop(processors);

		let correlation_id = correlation_id.into();
		let processed_at = event.timestamp;
		let enrichment = event.metadata.clone();
		let mut processed = ProcessedEvent::new(event, correlation_id, processed_at);
		processed.metadata.filters_applied = filters_applied;
		processed.metadata.enrichment = enrichment;
		processed.metadata.classification = Some(classification);

		let channels = target
			.notification_channels
			.clone()
			.unwrap_or_default();
		let notifiers = self.notifiers.read().await;
		let selected: Vec<&Arc<dyn Notifier>> = if channels.is_empty() {
			notifiers.values().collect()
		} else {
			channels
				.iter()
				.filter_map(|name| notifiers.get(name))
				.collect()
		};

		for notifier in selected {
			let outcome = notifier.notify(&processed).await;
			processed.notifications.push(match outcome {
				Ok(()) => NotificationRecord {
					channel: notifier.channel_name().to_string(),
					success: true,
					timestamp: processed_at,
					error: None,
					retry_count: 0,
				},
				Err(err) => NotificationRecord {
					channel: notifier.channel_name().to_string(),
					success: false,
					timestamp: processed_at,
					error: Some(err.message.clone()),
					retry_count: err.retry_count,
				},
			});
		}

		Ok(Some(processed))
	}
}

impl Default for Pipeline {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::enrich::Enricher;
	use crate::filters::Filter;
	use crate::processor::Processor;
	use chainwatch_types::{Amount, ChainKind, EventData, TargetKind, ValueClassification};

	fn sample_event() -> CanonicalEvent {
		CanonicalEvent {
			id: "ethereum_0xabc".to_string(),
			chain: ChainKind::Ethereum,
			kind: EventKind::Transfer,
			block_number: 100,
			tx_hash: "0xabc".to_string(),
			timestamp: 1000,
			confirmed: true,
			confirmation_count: 6,
			data: EventData::Transfer {
				from: "0xaaa".to_string(),
				to: "0xbbb".to_string(),
				amount: Amount::from_u64(500),
				token_address: None,
				token_symbol: None,
				gas_used: None,
				gas_price: None,
			},
			metadata: Default::default(),
		}
	}

	fn sample_target() -> MonitoringTarget {
		let mut kinds = HashSet::new();
		kinds.insert(EventKind::Transfer);
		MonitoringTarget::new("t1", TargetKind::Address, "0xaaa", kinds).unwrap()
	}

	struct AlwaysErrorsFilter;
	impl Filter for AlwaysErrorsFilter {
		fn name(&self) -> &str {
			"always_errors"
		}
		fn apply(&self, _event: &CanonicalEvent, _target: &MonitoringTarget, _resolved: &ResolvedFilters) -> std::result::Result<bool, String> {
			Err("boom".to_string())
		}
	}

	struct TagEnricher;
	impl Enricher for TagEnricher {
		fn name(&self) -> &str {
			"tag"
		}
		fn enrich(&self, mut event: CanonicalEvent) -> std::result::Result<CanonicalEvent, String> {
			event.metadata.insert("tag".to_string(), "yes".to_string());
			Ok(event)
		}
	}

	struct FailingEnricher;
	impl Enricher for FailingEnricher {
		fn name(&self) -> &str {
			"failing"
		}
		fn enrich(&self, _event: CanonicalEvent) -> std::result::Result<CanonicalEvent, String> {
			Err("enrichment unavailable".to_string())
		}
	}

	struct DecliningProcessor;
	impl Processor for DecliningProcessor {
		fn name(&self) -> &str {
			"declining"
		}
		fn process(&self, _event: &CanonicalEvent) -> Option<Classification> {
			None
		}
	}

	#[tokio::test]
	async fn filter_error_aborts_execute_with_pipeline_error() {
		let pipeline = Pipeline::new();
		pipeline.add_filter(Arc::new(AlwaysErrorsFilter)).await.unwrap();
		let result = pipeline
			.execute(sample_event(), &sample_target(), &ResolvedFilters::default(), "corr-1")
			.await;
		assert!(matches!(result, Err(PipelineError::Filter(name, _)) if name == "always_errors"));
	}

	#[tokio::test]
	async fn failing_enricher_passes_event_through_unchanged() {
		let pipeline = Pipeline::new();
		pipeline.add_enricher(Arc::new(FailingEnricher)).await.unwrap();
		pipeline.add_enricher(Arc::new(TagEnricher)).await.unwrap();
		let processed = pipeline
			.execute(sample_event(), &sample_target(), &ResolvedFilters::default(), "corr-1")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(processed.metadata.enrichment.get("tag"), Some(&"yes".to_string()));
	}

	#[tokio::test]
	async fn no_processors_synthesizes_default_medium_classification() {
		let pipeline = Pipeline::new();
		let processed = pipeline
			.execute(sample_event(), &sample_target(), &ResolvedFilters::default(), "corr-1")
			.await
			.unwrap()
			.unwrap();
		let classification = processed.metadata.classification.unwrap();
		assert_eq!(classification.category, ValueClassification::MediumValue);
		assert_eq!(classification.confidence, 0.5);
	}

	#[tokio::test]
	async fn declining_processor_falls_through_to_default() {
		let pipeline = Pipeline::new();
		pipeline.add_processor(Arc::new(DecliningProcessor)).await.unwrap();
		let processed = pipeline
			.execute(sample_event(), &sample_target(), &ResolvedFilters::default(), "corr-1")
			.await
			.unwrap()
			.unwrap();
		let classification = processed.metadata.classification.unwrap();
		assert_eq!(classification.confidence, 0.5);
	}

	#[tokio::test]
	async fn duplicate_enricher_name_is_rejected() {
		let pipeline = Pipeline::new();
		pipeline.add_enricher(Arc::new(TagEnricher)).await.unwrap();
		let err = pipeline.add_enricher(Arc::new(TagEnricher)).await.unwrap_err();
		assert!(matches!(err, PipelineError::Registry(_)));
	}
}
