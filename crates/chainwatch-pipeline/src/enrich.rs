//! Enrichers run in insertion order between the filter and processor
//! stages, each taking the event produced by the previous one and handing
//! back a (possibly mutated) event. A failing enricher never aborts the
//! pipeline — its error is logged and the event it was given passes
//! through unchanged to the next stage.

use chainwatch_types::CanonicalEvent;

pub trait Enricher: Send + Sync {
	fn name(&self) -> &str;
	fn enrich(&self, event: CanonicalEvent) -> Result<CanonicalEvent, String>;
}

/// Tags every event with which chain family it came from, so downstream
/// custom rules and notifiers can key off `metadata.chain_family` without
/// re-deriving it from `ChainKind` themselves.
pub struct ChainFamilyEnricher;

impl Enricher for ChainFamilyEnricher {
	fn name(&self) -> &str {
		"chain_family"
	}

	fn enrich(&self, mut event: CanonicalEvent) -> Result<CanonicalEvent, String> {
		let family = if event.chain.is_evm_like() { "evm" } else { "native" };
		event
			.metadata
			.insert("chain_family".to_string(), family.to_string());
		Ok(event)
	}
}

/// The standard enricher list, run in this order.
pub fn standard_enrichers() -> Vec<std::sync::Arc<dyn Enricher>> {
	vec![std::sync::Arc::new(ChainFamilyEnricher)]
}

#[cfg(test)]
mod tests {
	use super::*;
	use chainwatch_types::{Amount, ChainKind, EventData, EventKind};

	fn sample_event(chain: ChainKind) -> CanonicalEvent {
		CanonicalEvent {
			id: "id".to_string(),
			chain,
			kind: EventKind::Transfer,
			block_number: 1,
			tx_hash: "0xabc".to_string(),
			timestamp: 0,
			confirmed: true,
			confirmation_count: 1,
			data: EventData::Transfer {
				from: "0xa".to_string(),
				to: "0xb".to_string(),
				amount: Amount::from_u64(1),
				token_address: None,
				token_symbol: None,
				gas_used: None,
				gas_price: None,
			},
			metadata: Default::default(),
		}
	}

	#[test]
	fn tags_evm_chains_as_evm() {
		let enricher = ChainFamilyEnricher;
		let event = enricher.enrich(sample_event(ChainKind::Ethereum)).unwrap();
		assert_eq!(event.metadata.get("chain_family"), Some(&"evm".to_string()));
	}

	#[test]
	fn tags_solana_as_native() {
		let enricher = ChainFamilyEnricher;
		let event = enricher.enrich(sample_event(ChainKind::Solana)).unwrap();
		assert_eq!(event.metadata.get("chain_family"), Some(&"native".to_string()));
	}
}
