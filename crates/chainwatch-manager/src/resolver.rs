//! Per-target `FilterOverrides` overlaid field-by-field on the global
//! `[filters.transfer]`/`[filters.token_minting]` defaults. If the target
//! restricts chains and the requested chain is not in that list, the
//! global view is returned untouched.
//!
//! A plain struct handed to the pipeline by reference, never a global
//! singleton accessor.

use chainwatch_config::{FilterDefaults, FiltersConfig};
use chainwatch_pipeline::ResolvedFilters;
use chainwatch_types::{ChainKind, EventKind, FilterOverrides, MonitoringTarget};
use tokio::sync::RwLock;

pub struct TargetResolver {
	filters: RwLock<FiltersConfig>,
}

impl TargetResolver {
	pub fn new(filters: FiltersConfig) -> Self {
		Self {
			filters: RwLock::new(filters),
		}
	}

	/// Replace the global filter defaults wholesale, e.g. on a
	/// `config_reloaded` signal.
	pub async fn set_defaults(&self, filters: FiltersConfig) {
		*self.filters.write().await = filters;
	}

	/// Resolve the filter view a given target should be evaluated under for
	/// an event of `event_kind` observed on `chain`.
	pub async fn resolve_for_target(
		&self,
		target: &MonitoringTarget,
		chain: ChainKind,
		event_kind: EventKind,
	) -> ResolvedFilters {
		let filters = self.filters.read().await;
		let defaults = from_config(bucket_for(&filters, event_kind));
		if !target.applies_to_chain(chain) {
			return defaults;
		}
		match &target.filters {
			Some(overrides) => overlay(defaults, overrides),
			None => defaults,
		}
	}
}

fn bucket_for(filters: &FiltersConfig, kind: EventKind) -> &FilterDefaults {
	match kind {
		EventKind::Transfer | EventKind::NativeTransfer | EventKind::NftTransfer => &filters.transfer,
		EventKind::TokenMint | EventKind::TokenBurn | EventKind::NftMint | EventKind::ContractCreation => {
			&filters.token_minting
		}
	}
}

fn from_config(config: &FilterDefaults) -> ResolvedFilters {
	ResolvedFilters {
		min_amount: config.min_amount.clone(),
		max_amount: config.max_amount.clone(),
		allowed_event_kinds: config
			.allowed_event_kinds
			.clone()
			.map(|kinds| kinds.into_iter().collect()),
		min_confirmations: config.min_confirmations,
		min_priority: config.min_priority,
		require_no_self_transfer: config.require_no_self_transfer,
		min_timestamp: config.min_timestamp,
		max_timestamp: config.max_timestamp,
		custom_rules: config.custom_rules.clone(),
	}
}

fn overlay(defaults: ResolvedFilters, overrides: &FilterOverrides) -> ResolvedFilters {
	ResolvedFilters {
		min_amount: overrides.min_amount.clone().or(defaults.min_amount),
		max_amount: overrides.max_amount.clone().or(defaults.max_amount),
		allowed_event_kinds: overrides
			.allowed_event_kinds
			.clone()
			.map(|kinds| kinds.into_iter().collect())
			.or(defaults.allowed_event_kinds),
		min_confirmations: overrides.min_confirmations.unwrap_or(defaults.min_confirmations),
		min_priority: overrides.min_priority.unwrap_or(defaults.min_priority),
		require_no_self_transfer: overrides
			.require_no_self_transfer
			.unwrap_or(defaults.require_no_self_transfer),
		min_timestamp: overrides.min_timestamp.or(defaults.min_timestamp),
		max_timestamp: overrides.max_timestamp.or(defaults.max_timestamp),
		custom_rules: if overrides.custom_rules.is_empty() {
			defaults.custom_rules
		} else {
			overrides.custom_rules.clone()
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chainwatch_types::{Priority, TargetKind};
	use std::collections::HashSet;

	#[tokio::test]
	async fn override_min_amount_wins_over_default() {
		let mut config = FiltersConfig::default();
		config.transfer.min_amount = Some("1".to_string());
		let resolver = TargetResolver::new(config);

		let mut kinds = HashSet::new();
		kinds.insert(EventKind::Transfer);
		let mut target = MonitoringTarget::new("t1", TargetKind::Address, "0xabc", kinds).unwrap();
		target.filters = Some(FilterOverrides {
			min_amount: Some("500".to_string()),
			..Default::default()
		});

		let resolved = resolver
			.resolve_for_target(&target, ChainKind::Ethereum, EventKind::Transfer)
			.await;
		assert_eq!(resolved.min_amount, Some("500".to_string()));
	}

	#[tokio::test]
	async fn chain_restricted_target_outside_restriction_gets_global_defaults() {
		let mut config = FiltersConfig::default();
		config.transfer.min_priority = Priority::High;
		let resolver = TargetResolver::new(config);

		let mut kinds = HashSet::new();
		kinds.insert(EventKind::Transfer);
		let mut target = MonitoringTarget::new("t1", TargetKind::Address, "0xabc", kinds).unwrap();
		target.chains = Some(vec![ChainKind::Solana]);
		target.filters = Some(FilterOverrides {
			min_priority: Some(Priority::Low),
			..Default::default()
		});

		let resolved = resolver
			.resolve_for_target(&target, ChainKind::Ethereum, EventKind::Transfer)
			.await;
		assert_eq!(resolved.min_priority, Priority::High);
	}
}
