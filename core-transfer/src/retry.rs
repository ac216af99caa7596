//! Bounded retry for idempotent remote calls.
//!
//! With the default single-attempt policy every failure surfaces immediately.

use crate::error::Result;
use bridge_traits::RetryPolicy;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Remote call failed, retrying"
                );
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
