//! Bounded retry loop with exponential backoff
//!
//! Used by the gateway for idempotent requests. The loop carries its own
//! attempt counter, so the bound is explicit and independently testable.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants;
use crate::error::ClientResult;

/// Configuration for retry attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "constants::max_retry_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (doubles each attempt)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay (0 disables it)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::max_retry_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries (non-idempotent requests)
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter.
    ///
    /// 500ms, 1000ms, 2000ms... capped at `max_delay_ms`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Backoff with random jitter in `[0, jitter_ms)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % self.jitter_ms
        };
        self.base_delay(retry) + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the
/// attempt budget is spent.
///
/// `should_retry` decides per error whether another attempt is allowed.
/// The last error is returned when the budget runs out.
///
/// # Example
/// ```ignore
/// let body = retry_with_backoff(&config, "GET /portfolio", |e| e.is_transient(), || async {
///     gateway.send_once(&request).await
/// }).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, P>(
    config: &RetryConfig,
    label: &str,
    should_retry: P,
    mut op: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
    P: Fn(&crate::error::ClientError) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = config.delay_for(attempt - 1);
                tracing::warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::warn!(label, attempt, error = %e, "Giving up after retries");
                }
                return Err(e);
            }
        }
    }
}
