//! Bounded retry with exponential backoff for infrastructure failures.

use std::{future::Future, time::Duration};
use tracing::warn;

/// Retry settings for store and vault operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for the doubled delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// Only errors for which `is_transient` returns true are retried. The last
/// error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
