//! One retry-with-backoff routine shared by adapters' RPC calls and
//! notifiers' deliveries, rather than each caller rolling its own loop.
//!
//! Built on the `backoff` crate's `ExponentialBackoff`/`Backoff` trait
//! rather than a hand-rolled loop.

use crate::adapter::RetryConfig;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;

/// Retries `operation` up to `config.max_attempts` times, sleeping
/// `config.delay_ms(attempt)` between attempts. Returns the last error if
/// every attempt fails. A thin wrapper over `with_retry_counted` for
/// callers that don't need the attempt count.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	with_retry_counted(config, operation)
		.await
		.map_err(|(error, _attempts)| error)
}

/// Same retry loop as `with_retry`, but returns the number of attempts
/// made alongside the last error on exhaustion — callers that record a
/// `retry_count` (notifiers) need this; plain RPC callers don't.
pub async fn with_retry_counted<T, E, F, Fut>(
	config: &RetryConfig,
	mut operation: F,
) -> Result<T, (E, u32)>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let mut backoff = ExponentialBackoff {
		initial_interval: Duration::from_millis(config.initial_delay_ms),
		max_interval: Duration::from_millis(config.max_delay_ms),
		multiplier: config.backoff_multiplier,
		max_elapsed_time: None,
		// The default of 0.5 would let successive delays shrink relative
		// to one another; delays must never decrease between attempts.
		randomization_factor: 0.0,
		..ExponentialBackoff::default()
	};

	let mut attempt: u32 = 0;
	loop {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(error) => {
				attempt += 1;
				if attempt >= config.max_attempts {
					return Err((error, attempt));
				}
				match backoff.next_backoff() {
					Some(delay) => tokio::time::sleep(delay).await,
					None => return Err((error, attempt)),
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test]
	async fn retries_up_to_max_attempts_then_returns_last_error() {
		let config = RetryConfig {
			max_attempts: 3,
			initial_delay_ms: 1,
			max_delay_ms: 5,
			backoff_multiplier: 2.0,
		};
		let calls = AtomicU32::new(0);
		let result: Result<(), &str> = with_retry(&config, || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err("always fails") }
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn succeeds_without_exhausting_attempts() {
		let config = RetryConfig::default();
		let calls = AtomicU32::new(0);
		let result = with_retry(&config, || {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			async move {
				if n < 1 {
					Err("not yet")
				} else {
					Ok(42)
				}
			}
		})
		.await;

		assert_eq!(result, Ok(42));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn with_retry_counted_reports_attempts_on_exhaustion() {
		let config = RetryConfig {
			max_attempts: 3,
			initial_delay_ms: 1,
			max_delay_ms: 5,
			backoff_multiplier: 2.0,
		};
		let result: Result<(), (&str, u32)> =
			with_retry_counted(&config, || async { Err("always fails") }).await;
		assert_eq!(result, Err(("always fails", 3)));
	}

	#[test]
	fn delay_is_exponential_and_capped() {
		let config = RetryConfig::default();
		assert_eq!(config.delay_ms(0), 1000);
		assert_eq!(config.delay_ms(1), 2000);
		assert_eq!(config.delay_ms(2), 4000);
		assert_eq!(config.delay_ms(10), 30000);
	}
}
