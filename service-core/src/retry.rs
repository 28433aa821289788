//! Retry helper for calls to flaky or rate-limited upstreams.
//!
//! Exponential backoff with additive random jitter, bounded both by attempt
//! count and by the total time spent sleeping.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling for a single backoff (before jitter).
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform random delay added to every backoff.
    pub max_jitter: Duration,
    /// Upper bound of the summed sleeps across all retries.
    pub max_total_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_millis(25),
            max_total_wait: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A single attempt, never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter.
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(retry as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(backoff_ms)
    }

    fn jittered_backoff(&self, retry: u32) -> Duration {
        let base = self.backoff_duration(retry);
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        if max_jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
    }
}

/// Run `f` until it succeeds, fails with an error `is_retryable` rejects, or the
/// attempt/wait budget runs out. The last error is returned unchanged.
pub async fn retry_async<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut waited = Duration::ZERO;

    loop {
        attempt += 1;
        let err = match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt,
                        waited_ms = waited.as_millis() as u64,
                        "Call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            debug!(
                operation = operation_name,
                attempt,
                error = %err,
                "Call failed with non-retryable error"
            );
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!(
                operation = operation_name,
                attempt,
                error = %err,
                "Call failed after max attempts"
            );
            return Err(err);
        }

        let backoff = config.jittered_backoff(attempt - 1);
        if waited + backoff > config.max_total_wait {
            warn!(
                operation = operation_name,
                attempt,
                waited_ms = waited.as_millis() as u64,
                error = %err,
                "Retry wait budget exhausted"
            );
            return Err(err);
        }

        warn!(
            operation = operation_name,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Call failed, retrying after backoff"
        );

        sleep(backoff).await;
        waited += backoff;
    }
}
