//! The closed set of blockchain networks this listener understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying which chain family an adapter, target, or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
	Ethereum,
	Bsc,
	Solana,
	Sui,
	Bitcoin,
	Tron,
	/// TRX routed through an EVM-compatible full node rather than Tron's
	/// native REST API — same adapter logic as Ethereum/BSC, with an
	/// address validator that additionally accepts Base58 `T…` addresses.
	TronEvm,
}

impl ChainKind {
	/// The prefix used in a `CanonicalEvent::id` and in the TOML
	/// `[chains.<name>]` table key.
	pub fn as_str(&self) -> &'static str {
		match self {
			ChainKind::Ethereum => "ethereum",
			ChainKind::Bsc => "bsc",
			ChainKind::Solana => "solana",
			ChainKind::Sui => "sui",
			ChainKind::Bitcoin => "bitcoin",
			ChainKind::Tron => "tron",
			ChainKind::TronEvm => "tron_evm",
		}
	}

	/// Whether this chain is EVM-compatible (shares the Transfer topic,
	/// lowercased address comparisons, and the log-subscription strategy).
	/// Native Tron polls its own REST API and is not EVM-like even though
	/// it shares a network; `TronEvm` is the variant that is.
	pub fn is_evm_like(&self) -> bool {
		matches!(self, ChainKind::Ethereum | ChainKind::Bsc | ChainKind::Tron | ChainKind::TronEvm)
	}

	/// Whether addresses on this chain should be compared case-insensitively.
	/// EVM chains and TRX-as-EVM both lowercase for comparison; native
	/// Tron (Base58) addresses, Solana, Sui, and Bitcoin compare exactly.
	pub fn case_insensitive_addresses(&self) -> bool {
		matches!(self, ChainKind::Ethereum | ChainKind::Bsc | ChainKind::TronEvm)
	}
}

impl fmt::Display for ChainKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl std::str::FromStr for ChainKind {
	type Err = crate::error::ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ethereum" => Ok(ChainKind::Ethereum),
			"bsc" => Ok(ChainKind::Bsc),
			"solana" => Ok(ChainKind::Solana),
			"sui" => Ok(ChainKind::Sui),
			"bitcoin" => Ok(ChainKind::Bitcoin),
			"tron" => Ok(ChainKind::Tron),
			"tron_evm" => Ok(ChainKind::TronEvm),
			other => Err(crate::error::ValidationError::InvalidEnumValue {
				field: "chain".to_string(),
				value: other.to_string(),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_matches_config_key() {
		assert_eq!(ChainKind::Ethereum.to_string(), "ethereum");
		assert_eq!(ChainKind::Bsc.as_str(), "bsc");
	}

	#[test]
	fn evm_like_includes_tron_and_tron_evm() {
		assert!(ChainKind::Tron.is_evm_like());
		assert!(ChainKind::TronEvm.is_evm_like());
		assert!(!ChainKind::Solana.is_evm_like());
	}

	#[test]
	fn case_insensitivity_is_evm_and_tron_evm_only() {
		assert!(ChainKind::Ethereum.case_insensitive_addresses());
		assert!(ChainKind::TronEvm.case_insensitive_addresses());
		assert!(!ChainKind::Tron.case_insensitive_addresses());
		assert!(!ChainKind::Solana.case_insensitive_addresses());
	}

	#[test]
	fn round_trips_through_from_str() {
		for kind in [
			ChainKind::Ethereum,
			ChainKind::Bsc,
			ChainKind::Solana,
			ChainKind::Sui,
			ChainKind::Bitcoin,
			ChainKind::Tron,
			ChainKind::TronEvm,
		] {
			assert_eq!(kind.as_str().parse::<ChainKind>().unwrap(), kind);
		}
	}
}
