//! # Chainwatch Adapters
//!
//! Concrete `ChainAdapter` implementations for the six supported chain
//! families, plus the shared plumbing every one of them needs: bounded
//! event de-duplication, a minimal JSON-RPC transport helper, and the
//! retry-with-backoff routine re-exported from `chainwatch_types`.

pub mod bitcoin;
pub mod dedup;
pub mod evm;
pub mod rpc;
pub mod solana;
pub mod sui;
pub mod tron;

pub use dedup::DedupSet;
pub use evm::{EvmAdapter, EvmVariant};
pub use rpc::JsonRpcClient;

pub use bitcoin::BitcoinAdapter;
pub use solana::SolanaAdapter;
pub use sui::SuiAdapter;
pub use tron::TronAdapter;
