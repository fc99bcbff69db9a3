//! Linear-backoff retry helper.
//!
//! Used by the result resolver to bridge the gap between a task leaving
//! the engine queue and its record appearing in history. Attempt `n`
//! waits `n × unit` before running, so the default schedule is 1 s, 2 s,
//! 3 s. Waiting is timer based and never blocks a runtime thread.

use std::future::Future;
use std::time::Duration;

/// Tunable parameters for the linear-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of attempts after the initial miss.
    pub attempts: u32,
    /// Base wait; attempt `n` waits `n` units.
    pub unit: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            unit: Duration::from_secs(1),
        }
    }
}

/// Wait before the given 1-based attempt.
pub fn delay_for(attempt: u32, config: &RetryConfig) -> Duration {
    config.unit * attempt
}

/// Run `op` up to `config.attempts` times, sleeping before each attempt.
///
/// Returns the first `Some` produced, or `None` once all attempts are
/// used up. `op` receives the 1-based attempt number.
pub async fn retry_linear<T, F, Fut>(config: &RetryConfig, mut op: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=config.attempts {
        let delay = delay_for(attempt, config);
        tracing::info!(
            attempt,
            max_attempts = config.attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after backoff",
        );
        tokio::time::sleep(delay).await;

        if let Some(value) = op(attempt).await {
            return Some(value);
        }
    }
    None
}
