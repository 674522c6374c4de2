//! Retry and backoff for chain RPC calls
//!
//! Every chain call goes through an [`RpcEndpoint`]: a per-endpoint
//! concurrency cap plus exponential backoff on retryable failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use multichain_rs::ChainError;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::metrics;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.base_delay.as_secs_f64() * self.multiplier.powi(attempt.min(64) as i32);
        let capped = backoff_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Calculate the next retry time
    pub fn next_retry_after(&self, attempt: u32) -> DateTime<Utc> {
        let backoff = self.backoff_for_attempt(attempt);
        Utc::now() + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::seconds(60))
    }

    /// Check if an item is ready for retry based on retry_after
    pub fn is_ready_for_retry(&self, retry_after: Option<DateTime<Utc>>) -> bool {
        match retry_after {
            Some(time) => Utc::now() >= time,
            None => true,
        }
    }
}

/// A call that failed after exhausting retries, or failed permanently
#[derive(Debug, Clone, Error)]
#[error("{context}: {source} (after {attempts} attempt(s))")]
pub struct RetryError {
    pub context: String,
    pub attempts: u32,
    #[source]
    pub source: ChainError,
}

impl RetryError {
    pub fn is_permanent(&self) -> bool {
        !self.source.is_retryable()
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// Rate-limit failures take the same backoff path as other transient
/// failures but are logged separately.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    endpoint: &str,
    context: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(endpoint, context, attempts = attempt + 1, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;

                if !err.is_retryable() || !policy.should_retry(attempt) {
                    return Err(RetryError {
                        context: context.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }

                let backoff = policy.backoff_for_attempt(attempt - 1);
                metrics::record_rpc_retry(endpoint, err.class());

                if err.is_rate_limited() {
                    warn!(
                        endpoint,
                        context,
                        attempt,
                        max = policy.max_attempts,
                        ?backoff,
                        "Rate limited by RPC provider, backing off"
                    );
                } else {
                    warn!(
                        endpoint,
                        context,
                        attempt,
                        max = policy.max_attempts,
                        ?backoff,
                        error = %err,
                        "Retrying after backoff"
                    );
                }

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// A rate-limited chain RPC endpoint
///
/// Permits are held only while a call is in flight, not during backoff.
#[derive(Clone)]
pub struct RpcEndpoint {
    name: &'static str,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl RpcEndpoint {
    pub fn new(name: &'static str, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            name,
            policy,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call through the endpoint with retries
    pub async fn call<T, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let permits = self.permits.clone();
        retry_with_backoff(&self.policy, self.name, context, || {
            let permits = permits.clone();
            let fut = operation();
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ChainError::Permanent("endpoint closed".into()))?;
                fut.await
            }
        })
        .await
    }
}
