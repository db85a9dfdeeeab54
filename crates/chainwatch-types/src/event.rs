//! The canonical event model: the only type that crosses the
//! adapter → pipeline boundary.

use crate::amount::Amount;
use crate::chain::ChainKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed tag set of event kinds a canonical event can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	Transfer,
	NativeTransfer,
	TokenMint,
	TokenBurn,
	NftTransfer,
	NftMint,
	ContractCreation,
}

impl EventKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::Transfer => "transfer",
			EventKind::NativeTransfer => "native_transfer",
			EventKind::TokenMint => "token_mint",
			EventKind::TokenBurn => "token_burn",
			EventKind::NftTransfer => "nft_transfer",
			EventKind::NftMint => "nft_mint",
			EventKind::ContractCreation => "contract_creation",
		}
	}
}

impl std::fmt::Display for EventKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Per-kind payload, not a free-form `Any`-typed map: fields a kind does
/// not carry are simply absent from its variant rather than
/// present-but-null on a shared struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
	Transfer {
		from: String,
		to: String,
		amount: Amount,
		token_address: Option<String>,
		token_symbol: Option<String>,
		gas_used: Option<u64>,
		gas_price: Option<Amount>,
	},
	NativeTransfer {
		from: Option<String>,
		to: Option<String>,
		amount: Amount,
		fee: Option<Amount>,
		gas_used: Option<u64>,
		gas_price: Option<Amount>,
	},
	TokenMint {
		to: String,
		amount: Amount,
		token_address: Option<String>,
		token_symbol: Option<String>,
		minter: Option<String>,
	},
	TokenBurn {
		from: String,
		amount: Amount,
		token_address: Option<String>,
		token_symbol: Option<String>,
	},
	NftTransfer {
		from: String,
		to: String,
		token_address: String,
		token_id: String,
	},
	NftMint {
		to: String,
		token_address: String,
		token_id: String,
		minter: Option<String>,
	},
	ContractCreation {
		contract_address: String,
		creator: Option<String>,
	},
}

impl EventData {
	pub fn kind(&self) -> EventKind {
		match self {
			EventData::Transfer { .. } => EventKind::Transfer,
			EventData::NativeTransfer { .. } => EventKind::NativeTransfer,
			EventData::TokenMint { .. } => EventKind::TokenMint,
			EventData::TokenBurn { .. } => EventKind::TokenBurn,
			EventData::NftTransfer { .. } => EventKind::NftTransfer,
			EventData::NftMint { .. } => EventKind::NftMint,
			EventData::ContractCreation { .. } => EventKind::ContractCreation,
		}
	}

	/// The sender, when this kind has one. Used generically by the address
	/// and self-transfer filters, which do not need to match on variant.
	pub fn from_address(&self) -> Option<&str> {
		match self {
			EventData::Transfer { from, .. } => Some(from),
			EventData::NativeTransfer { from, .. } => from.as_deref(),
			EventData::TokenBurn { from, .. } => Some(from),
			EventData::NftTransfer { from, .. } => Some(from),
			_ => None,
		}
	}

	/// The recipient, when this kind has one.
	pub fn to_address(&self) -> Option<&str> {
		match self {
			EventData::Transfer { to, .. } => Some(to),
			EventData::NativeTransfer { to, .. } => to.as_deref(),
			EventData::TokenMint { to, .. } => Some(to),
			EventData::NftTransfer { to, .. } => Some(to),
			EventData::NftMint { to, .. } => Some(to),
			_ => None,
		}
	}

	pub fn amount(&self) -> Option<&Amount> {
		match self {
			EventData::Transfer { amount, .. } => Some(amount),
			EventData::NativeTransfer { amount, .. } => Some(amount),
			EventData::TokenMint { amount, .. } => Some(amount),
			EventData::TokenBurn { amount, .. } => Some(amount),
			_ => None,
		}
	}

	pub fn token_address(&self) -> Option<&str> {
		match self {
			EventData::Transfer { token_address, .. } => token_address.as_deref(),
			EventData::TokenMint { token_address, .. } => token_address.as_deref(),
			EventData::TokenBurn { token_address, .. } => token_address.as_deref(),
			EventData::NftTransfer { token_address, .. } => Some(token_address),
			EventData::NftMint { token_address, .. } => Some(token_address),
			_ => None,
		}
	}

	pub fn contract_address(&self) -> Option<&str> {
		match self {
			EventData::ContractCreation {
				contract_address, ..
			} => Some(contract_address),
			_ => self.token_address(),
		}
	}

	pub fn fee(&self) -> Option<&Amount> {
		match self {
			EventData::NativeTransfer { fee, .. } => fee.as_ref(),
			_ => None,
		}
	}
}

/// The chain-agnostic record every adapter emits and the pipeline consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
	/// `<chain>_<tx_hash>[_<sub_index>]`, unique per physical observation
	/// within a process lifetime.
	pub id: String,
	pub chain: ChainKind,
	pub kind: EventKind,
	/// Slot/checkpoint/height for non-EVM chains; block number for EVM.
	pub block_number: u64,
	pub tx_hash: String,
	/// Unix milliseconds.
	pub timestamp: u64,
	pub confirmed: bool,
	/// `current_tip - block_number` at emission time; never negative.
	pub confirmation_count: u64,
	pub data: EventData,
	/// Free-form additive context (e.g. Bitcoin's `is_incoming`/`vsize`)
	/// that does not fit a typed field on any `EventData` variant.
	#[serde(default)]
	pub metadata: HashMap<String, String>,
}

impl CanonicalEvent {
	/// Build the canonical event id, `<chain>_<tx_hash>[_<sub_index>]`.
	pub fn build_id(chain: ChainKind, tx_hash: &str, sub_index: Option<u64>) -> String {
		match sub_index {
			Some(idx) => format!("{}_{}_{}", chain.as_str(), tx_hash, idx),
			None => format!("{}_{}", chain.as_str(), tx_hash),
		}
	}

	/// Build a stable id for synthetic events with no transaction hash
	/// (e.g. an account-change push): `<kind>_<address>_<slot>`.
	pub fn build_synthetic_id(kind: EventKind, address: &str, slot: u64) -> String {
		format!("{}_{}_{}", kind.as_str(), address, slot)
	}

	/// Whether this event satisfies the non-negative confirmation invariant.
	/// Adapters should check this before emitting rather than clamping,
	/// since a negative count indicates the adapter read a stale tip.
	pub fn confirmation_count_is_valid(&self) -> bool {
		// confirmation_count is u64 so it cannot be negative by construction;
		// this guards against the tip having been read before the block.
		self.block_number <= self.block_number.saturating_add(self.confirmation_count)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_id_with_sub_index() {
		assert_eq!(
			CanonicalEvent::build_id(ChainKind::Ethereum, "0xabc", Some(2)),
			"ethereum_0xabc_2"
		);
		assert_eq!(
			CanonicalEvent::build_id(ChainKind::Ethereum, "0xabc", None),
			"ethereum_0xabc"
		);
	}

	#[test]
	fn synthetic_id_is_stable_for_same_observation() {
		let id1 = CanonicalEvent::build_synthetic_id(EventKind::Transfer, "addr1", 42);
		let id2 = CanonicalEvent::build_synthetic_id(EventKind::Transfer, "addr1", 42);
		assert_eq!(id1, id2);
	}

	#[test]
	fn event_data_accessors_are_kind_generic() {
		let data = EventData::Transfer {
			from: "0xa".to_string(),
			to: "0xb".to_string(),
			amount: Amount::from_u64(100),
			token_address: Some("0xtoken".to_string()),
			token_symbol: None,
			gas_used: None,
			gas_price: None,
		};
		assert_eq!(data.from_address(), Some("0xa"));
		assert_eq!(data.to_address(), Some("0xb"));
		assert_eq!(data.token_address(), Some("0xtoken"));

		let mint = EventData::ContractCreation {
			contract_address: "0xc".to_string(),
			creator: None,
		};
		assert_eq!(mint.from_address(), None);
		assert_eq!(mint.contract_address(), Some("0xc"));
	}
}
