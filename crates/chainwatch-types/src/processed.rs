//! Pipeline output: the record that leaves the last notifier.

use crate::event::CanonicalEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueClassification {
	HighValue,
	MediumValue,
	LowValue,
	Spam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
	pub category: ValueClassification,
	pub confidence: f64,
}

impl Classification {
	pub fn default_medium() -> Self {
		Self {
			category: ValueClassification::MediumValue,
			confidence: 0.5,
		}
	}
}

/// One notifier's delivery outcome, recorded regardless of success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
	pub channel: String,
	pub success: bool,
	pub timestamp: u64,
	pub error: Option<String>,
	pub retry_count: u32,
}

/// A stage-local failure recorded without aborting the rest of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
	pub stage: String,
	pub error: String,
	pub timestamp: u64,
	pub recoverable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedMetadata {
	pub correlation_id: String,
	/// Names of filters that ran, in evaluation order.
	pub filters_applied: Vec<String>,
	#[serde(default)]
	pub enrichment: HashMap<String, String>,
	pub classification: Option<Classification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
	pub id: String,
	pub original: CanonicalEvent,
	pub processed_at: u64,
	/// Milliseconds from pipeline entry to this record's construction.
	pub processing_duration_ms: u64,
	pub notifications: Vec<NotificationRecord>,
	pub metadata: ProcessedMetadata,
	#[serde(default)]
	pub errors: Vec<StageError>,
}

impl ProcessedEvent {
	pub fn new(original: CanonicalEvent, correlation_id: String, processed_at: u64) -> Self {
		let id = format!("processed_{}", original.id);
		Self {
			id,
			original,
			processed_at,
			processing_duration_ms: 0,
			notifications: Vec::new(),
			metadata: ProcessedMetadata {
				correlation_id,
				..Default::default()
			},
			errors: Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::amount::Amount;
	use crate::chain::ChainKind;
	use crate::event::{EventData, EventKind};

	fn sample_event() -> CanonicalEvent {
		CanonicalEvent {
			id: "ethereum_0xabc".to_string(),
			chain: ChainKind::Ethereum,
			kind: EventKind::Transfer,
			block_number: 100,
			tx_hash: "0xabc".to_string(),
			timestamp: 0,
			confirmed: true,
			confirmation_count: 6,
			data: EventData::Transfer {
				from: "0xa".to_string(),
				to: "0xb".to_string(),
				amount: Amount::from_u64(1),
				token_address: None,
				token_symbol: None,
				gas_used: None,
				gas_price: None,
			},
			metadata: HashMap::new(),
		}
	}

	#[test]
	fn id_is_prefixed() {
		let processed = ProcessedEvent::new(sample_event(), "corr-1".to_string(), 0);
		assert_eq!(processed.id, "processed_ethereum_0xabc");
	}
}
