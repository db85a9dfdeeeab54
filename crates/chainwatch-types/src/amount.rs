//! Arbitrary-precision base-unit amounts.
//!
//! Every adapter observes amounts in a chain's smallest unit (wei, lamports,
//! satoshis, sun, MIST). Per spec: the canonical `amount` is the base-10
//! integer in base units unless a `token_decimals` is known, in which case
//! it is the formatted decimal with trailing zeros trimmed. We keep the
//! magnitude as a decimal-digit string rather than a fixed-width integer so
//! a 256-bit EVM amount and a 64-bit lamport amount share one type without
//! either adapter worrying about overflow.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
	/// Magnitude in base units, as an unsigned decimal-digit string.
	base_units: String,
	/// Token decimals, if known at emission time. `None` means "render as
	/// raw base units" per the canonical event contract.
	decimals: Option<u32>,
}

impl Amount {
	/// Construct from a base-unit integer already rendered as digits (e.g.
	/// from a big-endian byte decode of an EVM log's `data`).
	pub fn from_base_units(digits: impl Into<String>) -> Self {
		Self {
			base_units: normalize_digits(&digits.into()),
			decimals: None,
		}
	}

	pub fn from_u64(value: u64) -> Self {
		Self::from_base_units(value.to_string())
	}

	pub fn from_u128(value: u128) -> Self {
		Self::from_base_units(value.to_string())
	}

	/// Attach known token decimals, switching the rendered form to a
	/// trimmed decimal.
	pub fn with_decimals(mut self, decimals: u32) -> Self {
		self.decimals = Some(decimals);
		self
	}

	pub fn decimals(&self) -> Option<u32> {
		self.decimals
	}

	pub fn base_units(&self) -> &str {
		&self.base_units
	}

	/// Absolute difference `|new - old|` of two base-unit magnitudes,
	/// formatted with the given decimals. Used by the Solana mint-supply
	/// diff and the Bitcoin UTXO delta, both of which only ever compare
	/// `u64` magnitudes in practice.
	pub fn diff_u64(new: u64, old: u64, decimals: Option<u32>) -> Self {
		let diff = new.abs_diff(old);
		let mut amount = Self::from_u64(diff);
		if let Some(d) = decimals {
			amount = amount.with_decimals(d);
		}
		amount
	}

	/// Render per the canonical contract: base-units integer if decimals
	/// are unknown, else a trimmed fixed-point decimal.
	pub fn render(&self) -> String {
		match self.decimals {
			None => self.base_units.clone(),
			Some(0) => self.base_units.clone(),
			Some(decimals) => format_with_decimals(&self.base_units, decimals),
		}
	}

	pub fn is_zero(&self) -> bool {
		self.base_units.chars().all(|c| c == '0')
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.render())
	}
}

fn normalize_digits(raw: &str) -> String {
	let trimmed = raw.trim_start_matches('0');
	if trimmed.is_empty() {
		"0".to_string()
	} else {
		trimmed.to_string()
	}
}

/// Insert a decimal point `decimals` places from the right and trim
/// trailing zeros (and a bare trailing '.') from the fractional part.
fn format_with_decimals(base_units: &str, decimals: u32) -> String {
	let decimals = decimals as usize;
	let padded = if base_units.len() <= decimals {
		format!("{:0>width$}", base_units, width = decimals + 1)
	} else {
		base_units.to_string()
	};
	let split_at = padded.len() - decimals;
	let (int_part, frac_part) = padded.split_at(split_at);
	let int_part = normalize_digits(int_part);
	let frac_trimmed = frac_part.trim_end_matches('0');
	if frac_trimmed.is_empty() {
		int_part
	} else {
		format!("{}.{}", int_part, frac_trimmed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base_units_render_without_decimals() {
		let amount = Amount::from_u128(1_000_000_000_000_000_000u128);
		assert_eq!(amount.render(), "1000000000000000000");
	}

	#[test]
	fn decimal_rendering_trims_trailing_zeros() {
		let amount = Amount::from_u64(500).with_decimals(2);
		assert_eq!(amount.render(), "5");

		let amount = Amount::from_u64(550).with_decimals(2);
		assert_eq!(amount.render(), "5.5");

		let amount = Amount::from_u64(1).with_decimals(6);
		assert_eq!(amount.render(), "0.000001");
	}

	#[test]
	fn mint_supply_diff_matches_spec_scenario() {
		// cache {supply: 1000, decimals: 2}; new supply 1500 -> amount "5"
		let diff = Amount::diff_u64(1500, 1000, Some(2));
		assert_eq!(diff.render(), "5");
	}

	#[test]
	fn zero_detection() {
		assert!(Amount::from_u64(0).is_zero());
		assert!(!Amount::from_u64(1).is_zero());
	}
}
