//! Processors run in insertion order after enrichment; the first one that
//! classifies the event wins and later processors never run. If every
//! processor declines (or none are registered) the pipeline falls back to
//! `Classification::default_medium()`.

use chainwatch_types::{CanonicalEvent, Classification, ValueClassification};

pub trait Processor: Send + Sync {
	fn name(&self) -> &str;
	fn process(&self, event: &CanonicalEvent) -> Option<Classification>;
}

/// A value-based heuristic: high-value transfers above a flat threshold,
/// spam for zero-amount events, medium otherwise. A real deployment would
/// plug in a per-chain USD-valuation processor ahead of this one; this
/// implementation keeps the contract (some classification always wins)
/// without depending on an external price feed, and so never declines.
pub struct ValueHeuristicProcessor;

impl Processor for ValueHeuristicProcessor {
	fn name(&self) -> &str {
		"value_heuristic"
	}

	fn process(&self, event: &CanonicalEvent) -> Option<Classification> {
		let Some(amount) = event.data.amount() else {
			return Some(Classification {
				category: ValueClassification::MediumValue,
				confidence: 0.3,
			});
		};
		if amount.is_zero() {
			return Some(Classification {
				category: ValueClassification::Spam,
				confidence: 0.9,
			});
		}
		let magnitude: f64 = amount.render().parse().unwrap_or(0.0);
		let category = if magnitude > 1_000_000.0 {
			ValueClassification::HighValue
		} else if magnitude > 1.0 {
			ValueClassification::MediumValue
		} else {
			ValueClassification::LowValue
		};
		Some(Classification {
			category,
			confidence: 0.6,
		})
	}
}

/// The standard processor list, run in this order.
pub fn standard_processors() -> Vec<std::sync::Arc<dyn Processor>> {
	vec![std::sync::Arc::new(ValueHeuristicProcessor)]
}

#[cfg(test)]
mod tests {
	use super::*;
	use chainwatch_types::{Amount, ChainKind, EventData, EventKind};

	fn event_with_amount(amount: u64) -> CanonicalEvent {
		CanonicalEvent {
			id: "id".to_string(),
			chain: ChainKind::Ethereum,
			kind: EventKind::Transfer,
			block_number: 1,
			tx_hash: "0xabc".to_string(),
			timestamp: 0,
			confirmed: true,
			confirmation_count: 1,
			data: EventData::Transfer {
				from: "0xa".to_string(),
				to: "0xb".to_string(),
				amount: Amount::from_u64(amount),
				token_address: None,
				token_symbol: None,
				gas_used: None,
				gas_price: None,
			},
			metadata: Default::default(),
		}
	}

	#[test]
	fn zero_amount_is_spam() {
		let processor = ValueHeuristicProcessor;
		let classification = processor.process(&event_with_amount(0)).unwrap();
		assert_eq!(classification.category, ValueClassification::Spam);
	}

	#[test]
	fn large_amount_is_high_value() {
		let processor = ValueHeuristicProcessor;
		let classification = processor.process(&event_with_amount(2_000_000)).unwrap();
		assert_eq!(classification.category, ValueClassification::HighValue);
	}

	#[test]
	fn never_declines() {
		let processor = ValueHeuristicProcessor;
		assert!(processor.process(&event_with_amount(5)).is_some());
	}
}
