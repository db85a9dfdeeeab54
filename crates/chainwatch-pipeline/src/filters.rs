//! The nine standard filters, each a small predicate over one canonical
//! event plus its resolved (global-defaults-overlaid-by-target) filter
//! settings. Each is a named, stateless predicate over
//! `(event, target, resolved)` — no plugin lifecycle to manage. `apply`
//! returns `Err` only for a filter that cannot decide (e.g. an invalid
//! regex in a custom rule), never for an ordinary no-match.

use chainwatch_types::{CanonicalEvent, EventKind, MonitoringTarget, RuleOperator};
use regex::Regex;

use crate::pipeline::ResolvedFilters;

pub trait Filter: Send + Sync {
	fn name(&self) -> &str;
	fn apply(
		&self,
		event: &CanonicalEvent,
		target: &MonitoringTarget,
		resolved: &ResolvedFilters,
	) -> Result<bool, String>;
}

/// Matches if the event's from/to address equals the target's tracked
/// address, using the chain-appropriate case rule.
pub struct AddressFilter;

impl Filter for AddressFilter {
	fn name(&self) -> &str {
		"address"
	}

	fn apply(&self, event: &CanonicalEvent, target: &MonitoringTarget, _resolved: &ResolvedFilters) -> Result<bool, String> {
		if target.kind != chainwatch_types::TargetKind::Address {
			return Ok(true);
		}
		let from_match = event
			.data
			.from_address()
			.map(|a| target.matches_address(event.chain, a))
			.unwrap_or(false);
		let to_match = event
			.data
			.to_address()
			.map(|a| target.matches_address(event.chain, a))
			.unwrap_or(false);
		Ok(from_match || to_match)
	}
}

/// Matches if the event's contract/token address equals the target's
/// tracked contract address.
pub struct ContractFilter;

impl Filter for ContractFilter {
	fn name(&self) -> &str {
		"contract"
	}

	fn apply(&self, event: &CanonicalEvent, target: &MonitoringTarget, _resolved: &ResolvedFilters) -> Result<bool, String> {
		if target.kind != chainwatch_types::TargetKind::Contract
			&& target.kind != chainwatch_types::TargetKind::Token
		{
			return Ok(true);
		}
		Ok(event
			.data
			.contract_address()
			.map(|a| target.matches_address(event.chain, a))
			.unwrap_or(false))
	}
}

/// Rejects events whose amount falls outside `[min_amount, max_amount]`.
/// Thresholds and the event amount are compared as `f64` — the filter
/// boundary does not need the full base-unit precision `Amount` otherwise
/// preserves end to end.
pub struct AmountFilter;

impl Filter for AmountFilter {
	fn name(&self) -> &str {
		"amount"
	}

	fn apply(&self, event: &CanonicalEvent, _target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		let Some(amount) = event.data.amount() else {
			return Ok(true);
		};
		let Ok(value) = amount.render().parse::<f64>() else {
			return Ok(true);
		};
		if let Some(min) = &resolved.min_amount {
			if let Ok(min) = min.parse::<f64>() {
				if value < min {
					return Ok(false);
				}
			}
		}
		if let Some(max) = &resolved.max_amount {
			if let Ok(max) = max.parse::<f64>() {
				if value > max {
					return Ok(false);
				}
			}
		}
		Ok(true)
	}
}

/// Rejects events whose kind is not in the resolved allow-list, when one
/// is configured.
pub struct EventKindFilter;

impl Filter for EventKindFilter {
	fn name(&self) -> &str {
		"event_kind"
	}

	fn apply(&self, event: &CanonicalEvent, _target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		Ok(match &resolved.allowed_event_kinds {
			Some(allowed) => allowed.contains(&event.kind),
			None => true,
		})
	}
}

/// Rejects a transfer whose sender and recipient are the same address,
/// when `require_no_self_transfer` is set.
pub struct SelfTransferFilter;

impl Filter for SelfTransferFilter {
	fn name(&self) -> &str {
		"self_transfer"
	}

	fn apply(&self, event: &CanonicalEvent, _target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		if !resolved.require_no_self_transfer {
			return Ok(true);
		}
		Ok(match (event.data.from_address(), event.data.to_address()) {
			(Some(from), Some(to)) => {
				if event.chain.case_insensitive_addresses() {
					!from.eq_ignore_ascii_case(to)
				} else {
					from != to
				}
			}
			_ => true,
		})
	}
}

/// Rejects events below the resolved confirmation threshold.
pub struct ConfirmationFilter;

impl Filter for ConfirmationFilter {
	fn name(&self) -> &str {
		"confirmation"
	}

	fn apply(&self, event: &CanonicalEvent, _target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		Ok(event.confirmation_count >= resolved.min_confirmations)
	}
}

/// Rejects events outside the resolved `[min_timestamp, max_timestamp]`
/// window, when configured.
pub struct TimestampRangeFilter;

impl Filter for TimestampRangeFilter {
	fn name(&self) -> &str {
		"timestamp_range"
	}

	fn apply(&self, event: &CanonicalEvent, _target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		if let Some(min) = resolved.min_timestamp {
			if event.timestamp < min {
				return Ok(false);
			}
		}
		if let Some(max) = resolved.max_timestamp {
			if event.timestamp > max {
				return Ok(false);
			}
		}
		Ok(true)
	}
}

/// Rejects a target whose priority is below the resolved minimum.
pub struct PriorityFilter;

impl Filter for PriorityFilter {
	fn name(&self) -> &str {
		"priority"
	}

	fn apply(&self, _event: &CanonicalEvent, target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		Ok(target.priority >= resolved.min_priority)
	}
}

/// Evaluates the resolved custom rule list against the event's metadata
/// map (and, for a one-level `metadata.*` dotted field, the corresponding
/// entry). All rules must pass; an invalid regex in a `Regex` rule is an
/// error, not a silent no-match.
pub struct CustomRuleFilter;

impl Filter for CustomRuleFilter {
	fn name(&self) -> &str {
		"custom_rules"
	}

	fn apply(&self, event: &CanonicalEvent, _target: &MonitoringTarget, resolved: &ResolvedFilters) -> Result<bool, String> {
		for rule in &resolved.custom_rules {
			if !evaluate_rule(event, rule)? {
				return Ok(false);
			}
		}
		Ok(true)
	}
}

fn evaluate_rule(event: &CanonicalEvent, rule: &chainwatch_types::CustomRule) -> Result<bool, String> {
	let field_value = field_value(event, &rule.field);
	let Some(field_value) = field_value else {
		return Ok(false);
	};
	Ok(match rule.operator {
		RuleOperator::Equals => field_value == rule.value,
		RuleOperator::NotEquals => field_value != rule.value,
		RuleOperator::Contains => field_value.contains(&rule.value),
		RuleOperator::Regex => {
			let re = Regex::new(&rule.value)
				.map_err(|err| format!("invalid regex '{}' in custom rule: {err}", rule.value))?;
			re.is_match(&field_value)
		}
		RuleOperator::GreaterThan => compare_numeric(&field_value, &rule.value, |a, b| a > b),
		RuleOperator::LessThan => compare_numeric(&field_value, &rule.value, |a, b| a < b),
	})
}

fn compare_numeric(field_value: &str, rule_value: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
	match (field_value.parse::<f64>(), rule_value.parse::<f64>()) {
		(Ok(a), Ok(b)) => cmp(a, b),
		_ => false,
	}
}

fn field_value(event: &CanonicalEvent, field: &str) -> Option<String> {
	if let Some(key) = field.strip_prefix("metadata.") {
		return event.metadata.get(key).cloned();
	}
	match field {
		"kind" => Some(event.kind.as_str().to_string()),
		"chain" => Some(event.chain.as_str().to_string()),
		"tx_hash" => Some(event.tx_hash.clone()),
		"from" => event.data.from_address().map(str::to_string),
		"to" => event.data.to_address().map(str::to_string),
		_ => None,
	}
}

/// All nine standard filters, in fixed priority order: the earliest
/// rejection in this list short-circuits the rest deterministically.
pub fn standard_filters() -> Vec<std::sync::Arc<dyn Filter>> {
	vec![
		std::sync::Arc::new(AddressFilter),
		std::sync::Arc::new(ContractFilter),
		std::sync::Arc::new(AmountFilter),
		std::sync::Arc::new(EventKindFilter),
		std::sync::Arc::new(SelfTransferFilter),
		std::sync::Arc::new(ConfirmationFilter),
		std::sync::Arc::new(TimestampRangeFilter),
		std::sync::Arc::new(PriorityFilter),
		std::sync::Arc::new(CustomRuleFilter),
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use chainwatch_types::{Amount, ChainKind, CustomRule, EventData, MonitoringTarget, TargetKind};
	use std::collections::HashSet;

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

	#[test]
	fn address_filter_matches_from_or_to() {
		let filter = AddressFilter;
		let event = sample_event();
		let target = sample_target();
		let resolved = ResolvedFilters::default();
		assert!(filter.apply(&event, &target, &resolved).unwrap());
	}

	#[test]
	fn confirmation_filter_enforces_minimum() {
		let filter = ConfirmationFilter;
		let event = sample_event();
		let target = sample_target();
		let mut resolved = ResolvedFilters::default();
		resolved.min_confirmations = 10;
		assert!(!filter.apply(&event, &target, &resolved).unwrap());
	}

	#[test]
	fn amount_filter_rejects_below_minimum() {
		let filter = AmountFilter;
		let event = sample_event();
		let target = sample_target();
		let mut resolved = ResolvedFilters::default();
		resolved.min_amount = Some("501".to_string());
		assert!(!filter.apply(&event, &target, &resolved).unwrap());
	}

	#[test]
	fn self_transfer_filter_rejects_matching_addresses() {
		let filter = SelfTransferFilter;
		let mut event = sample_event();
		event.data = EventData::Transfer {
			from: "0xaaa".to_string(),
			to: "0xAAA".to_string(),
			amount: Amount::from_u64(1),
			token_address: None,
			token_symbol: None,
			gas_used: None,
			gas_price: None,
		};
		let target = sample_target();
		let mut resolved = ResolvedFilters::default();
		resolved.require_no_self_transfer = true;
		assert!(!filter.apply(&event, &target, &resolved).unwrap());
	}

	#[test]
	fn regex_rule_matches_pattern_not_just_substring() {
		let filter = CustomRuleFilter;
		let event = sample_event();
		let target = sample_target();
		let mut resolved = ResolvedFilters::default();
		resolved.custom_rules.push(CustomRule {
			field: "tx_hash".to_string(),
			operator: RuleOperator::Regex,
			value: r"^0x[a-f0-9]+$".to_string(),
			description: None,
		});
		assert!(filter.apply(&event, &target, &resolved).unwrap());

		resolved.custom_rules[0].value = r"^zz.*$".to_string();
		assert!(!filter.apply(&event, &target, &resolved).unwrap());
	}

	#[test]
	fn invalid_regex_rule_errors_instead_of_silently_matching() {
		let filter = CustomRuleFilter;
		let event = sample_event();
		let target = sample_target();
		let mut resolved = ResolvedFilters::default();
		resolved.custom_rules.push(CustomRule {
			field: "tx_hash".to_string(),
			operator: RuleOperator::Regex,
			value: "(unclosed".to_string(),
			description: None,
		});
		assert!(filter.apply(&event, &target, &resolved).is_err());
	}
}
