//! Minimal JSON-RPC transport shared by the adapters that talk to a chain
//! over plain HTTP JSON-RPC (EVM's fallback provider, Tron, Bitcoin's
//! Esplora-style REST, Sui's JSON-RPC). No wire-exact client per chain —
//! this module only owns the "POST JSON, retry on transport failure,
//! return a `serde_json::Value`" plumbing every adapter needs.

use chainwatch_types::{with_retry, AdapterError, AdapterResult, RetryConfig};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct JsonRpcClient {
	http: reqwest::Client,
	url: String,
	retry: RetryConfig,
	next_id: AtomicU64,
}

impl JsonRpcClient {
	pub fn new(url: impl Into<String>, retry: RetryConfig) -> Self {
		Self {
			http: reqwest::Client::new(),
			url: url.into(),
			retry,
			next_id: AtomicU64::new(1),
		}
	}

	/// `POST` a JSON-RPC 2.0 request, retrying transport failures per the
	/// shared backoff routine. An RPC-level error (a non-null `error`
	/// field in the response) is not retried — it is a protocol-level
	/// rejection, not a transient transport failure.
	pub async fn call(&self, method: &str, params: Value) -> AdapterResult<Value> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let body = serde_json::json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		let response = with_retry(&self.retry, || async {
			self.http
				.post(&self.url)
				.json(&body)
				.send()
				.await
				.map_err(|e| AdapterError::Transport(e.to_string()))?
				.json::<Value>()
				.await
				.map_err(|e| AdapterError::Transport(e.to_string()))
		})
		.await?;

		if let Some(error) = response.get("error") {
			return Err(AdapterError::Protocol(format!(
				"{} returned an RPC error: {}",
				method, error
			)));
		}

		response
			.get("result")
			.cloned()
			.ok_or_else(|| AdapterError::Protocol(format!("{} response missing 'result'", method)))
	}

	/// `GET` against a REST-style endpoint (used by the Bitcoin adapter's
	/// Esplora-compatible UTXO/address-history API).
	pub async fn get(&self, path: &str) -> AdapterResult<Value> {
		let url = format!("{}{}", self.url, path);
		with_retry(&self.retry, || async {
			self.http
				.get(&url)
				.send()
				.await
				.map_err(|e| AdapterError::Transport(e.to_string()))?
				.json::<Value>()
				.await
				.map_err(|e| AdapterError::Transport(e.to_string()))
		})
		.await
	}
}
