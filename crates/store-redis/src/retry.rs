//! Retry logic for transient Redis failures.
//!
//! [`with_retry_timeout`] wraps an async operation with automatic retry on
//! transient errors (connection failures, timeouts) and an overall
//! wall-clock bound. Non-transient errors (serialization, internal) are
//! returned immediately without retry.
//!
//! The engine never retries — retry lives here, in the store, and is only
//! applied to reads and idempotent writes. Counter updates run at most
//! once; see [`RedisStore`](crate::RedisStore).
//!
//! # Backoff Strategy
//!
//! Retries use exponential backoff with jitter:
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added to prevent
//!   thundering-herd effects across multiple clients

use std::{future::Future, time::Duration};

use rand::Rng;
use switchgear_store::{StoreError, StoreResult};

use crate::config::RetryConfig;

/// Executes `operation` with automatic retry on transient errors.
///
/// Returns the result of the first successful call, or the last error if
/// all retry attempts are exhausted.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut last_error: Option<StoreError> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            },
            Err(err) => return Err(err),
        }
    }

    // All retries exhausted — return the last transient error
    Err(last_error
        .unwrap_or_else(|| StoreError::internal("retry loop completed without result or error")))
}

/// Executes `operation` with retry **and** an overall timeout.
///
/// The timeout bounds the total wall-clock time of the operation including
/// all retry attempts and backoff sleeps. Returns [`StoreError::Timeout`]
/// when the deadline is exceeded.
pub(crate) async fn with_retry_timeout<F, Fut, T>(
    config: &RetryConfig,
    timeout: Duration,
    operation_name: &str,
    operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(timeout, with_retry(config, operation_name, operation))
        .await
        .unwrap_or(Err(StoreError::timeout()))
}

/// Executes a single, non-retried attempt under a timeout.
///
/// Used for counter updates, where a retried increment after an ambiguous
/// failure could double-count.
pub(crate) async fn with_timeout<Fut, T>(timeout: Duration, operation: Fut) -> StoreResult<T>
where
    Fut: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(timeout, operation).await.unwrap_or(Err(StoreError::timeout()))
}

fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential = config.initial_backoff.saturating_mul(2u32.saturating_pow(attempt));
    let capped = exponential.min(config.max_backoff);
    let jitter_ceiling = (capped.as_millis() as u64) / 2;
    let jitter = if jitter_ceiling > 0 {
        Duration::from_millis(rand::rng().random_range(0..=jitter_ceiling))
    } else {
        Duration::ZERO
    };
    capped + jitter
}
