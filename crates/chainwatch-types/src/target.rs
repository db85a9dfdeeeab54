//! User-declared objects of monitoring interest and their overrides.

use crate::chain::ChainKind;
use crate::error::{ValidationError, ValidationResult};
use crate::event::EventKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
	Address,
	Contract,
	Token,
}

/// Target priority, also used by the priority filter's `min_priority` gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
	Low,
	Medium,
	High,
}

impl Default for Priority {
	fn default() -> Self {
		Priority::Medium
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
	Equals,
	NotEquals,
	GreaterThan,
	LessThan,
	Contains,
	Regex,
}

/// One entry of a target's `[[filters.custom_rules]]` list. `field`
/// supports one level of dot notation into `metadata.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRule {
	pub field: String,
	pub operator: RuleOperator,
	pub value: String,
	pub description: Option<String>,
}

/// Per-target filter overrides, overlaid field-by-field on the global
/// defaults by the target resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOverrides {
	pub min_amount: Option<String>,
	pub max_amount: Option<String>,
	pub allowed_event_kinds: Option<Vec<EventKind>>,
	pub min_confirmations: Option<u64>,
	pub min_priority: Option<Priority>,
	pub require_no_self_transfer: Option<bool>,
	pub min_timestamp: Option<u64>,
	pub max_timestamp: Option<u64>,
	#[serde(default)]
	pub custom_rules: Vec<CustomRule>,
}

/// The user's declaration of interest in an address, contract, or token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringTarget {
	pub id: String,
	pub name: Option<String>,
	pub kind: TargetKind,
	/// Chain-native textual form. Never lowercased at storage time — only
	/// comparisons on EVM chains are case-insensitive (see
	/// `ChainKind::case_insensitive_addresses`).
	pub address: String,
	pub event_kinds: HashSet<EventKind>,
	pub priority: Priority,
	#[serde(default)]
	pub tags: Vec<String>,
	pub filters: Option<FilterOverrides>,
	pub notification_channels: Option<Vec<String>>,
	/// If set, this target is only active on the listed chains.
	pub chains: Option<Vec<ChainKind>>,
	pub description: Option<String>,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}

fn default_enabled() -> bool {
	true
}

impl MonitoringTarget {
	pub fn new(
		id: impl Into<String>,
		kind: TargetKind,
		address: impl Into<String>,
		event_kinds: HashSet<EventKind>,
	) -> ValidationResult<Self> {
		if event_kinds.is_empty() {
			return Err(ValidationError::EmptyEventKinds);
		}
		Ok(Self {
			id: id.into(),
			name: None,
			kind,
			address: address.into(),
			event_kinds,
			priority: Priority::default(),
			tags: Vec::new(),
			filters: None,
			notification_channels: None,
			chains: None,
			description: None,
			enabled: true,
		})
	}

	/// Whether this target restricts which chains it applies to, and if so,
	/// whether `chain` is in that restriction. Targets with no restriction
	/// apply to any chain they are registered against.
	pub fn applies_to_chain(&self, chain: ChainKind) -> bool {
		match &self.chains {
			Some(chains) => chains.contains(&chain),
			None => true,
		}
	}

	/// Compares `address` against this target's address using the
	/// comparison rule appropriate for `chain` (case-insensitive for EVM,
	/// exact otherwise).
	pub fn matches_address(&self, chain: ChainKind, address: &str) -> bool {
		if chain.case_insensitive_addresses() {
			self.address.eq_ignore_ascii_case(address)
		} else {
			self.address == address
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_empty_event_kinds() {
		let result = MonitoringTarget::new("t1", TargetKind::Address, "0xabc", HashSet::new());
		assert_eq!(result.unwrap_err(), ValidationError::EmptyEventKinds);
	}

	#[test]
	fn chain_restriction_defaults_to_any_chain() {
		let mut kinds = HashSet::new();
		kinds.insert(EventKind::Transfer);
		let target = MonitoringTarget::new("t1", TargetKind::Address, "0xabc", kinds).unwrap();
		assert!(target.applies_to_chain(ChainKind::Ethereum));
		assert!(target.applies_to_chain(ChainKind::Solana));
	}

	#[test]
	fn address_match_is_case_insensitive_on_evm_only() {
		let mut kinds = HashSet::new();
		kinds.insert(EventKind::Transfer);
        let mut target = MonitoringTarget::new("t1", TargetKind::Address, "0xABC", kinds).unwrap();
        target.address = "0xABC".to_string();
		assert!(target.matches_address(ChainKind::Ethereum, "0xabc"));
		assert!(!target.matches_address(ChainKind::Solana, "0xabc"));
	}
}
