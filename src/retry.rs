//! Retry policy for remote fetches
//!
//! Only the fetcher is re-invoked. Conversion and storage happen after a
//! successful attempt and are never retried.

use crate::error::BoxError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How the delay between attempts evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Same delay before every retry
    #[default]
    Interval,
    /// Delay grows geometrically with each retry
    Backoff,
}

/// Bounded or unbounded retry schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    /// Retries after the first attempt, `None` retries until success
    pub max_retries: Option<u32>,
    pub interval: Duration,
    pub backoff_base: Duration,
    pub backoff_factor: u32,
}

impl RetryPolicy {
    /// Fixed-delay policy with two retries
    pub fn interval(delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Interval,
            max_retries: Some(2),
            interval: delay,
            backoff_base: delay,
            backoff_factor: 1,
        }
    }

    /// Geometric policy with two retries
    pub fn backoff(base: Duration, factor: u32) -> Self {
        Self {
            strategy: RetryStrategy::Backoff,
            max_retries: Some(2),
            interval: base,
            backoff_base: base,
            backoff_factor: factor.max(1),
        }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Retry until the fetch succeeds
    pub fn unbounded(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.strategy {
            RetryStrategy::Interval => self.interval,
            RetryStrategy::Backoff => {
                let exponent = retry.saturating_sub(1);
                let factor = self.backoff_factor.max(1).saturating_pow(exponent);
                self.backoff_base.saturating_mul(factor)
            }
        }
    }

    fn allows(&self, retry: u32) -> bool {
        self.max_retries.is_none_or(|max| retry <= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::interval(Duration::from_secs(2))
    }
}

/// Run `operation` until it succeeds or the policy gives up.
///
/// Returns the outcome together with the number of attempts made. Without a
/// policy the operation runs exactly once.
pub async fn run_with_retry<F, Fut, T>(
    key: &str,
    policy: Option<&RetryPolicy>,
    mut operation: F,
) -> (Result<T, BoxError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BoxError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(key, attempt, "Fetch succeeded after retry");
                }
                return (Ok(value), attempt);
            }
            Err(e) => e,
        };

        let Some(policy) = policy else {
            return (Err(err), attempt);
        };

        let retry = attempt;
        if !policy.allows(retry) {
            warn!(key, attempt, "Fetch failed, retries exhausted: {}", err);
            return (Err(err), attempt);
        }

        let delay = policy.delay_for(retry);
        warn!(
            key,
            retry,
            delay_ms = delay.as_millis() as u64,
            "Fetch failed, retrying: {}",
            err
        );
        tokio::time::sleep(delay).await;
    }
}
