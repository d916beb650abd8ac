//! Bounded, cancellable polling used while waiting on remote state transitions.

use crate::error::FeatureStoreError;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: u32, max_interval: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Maximum number of observations. `None` waits forever.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl PollPolicy {
    pub fn fixed(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Fixed,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential {
                factor,
                max_interval,
            } => current.saturating_mul(factor).min(max_interval),
        }
    }
}

/// Calls `probe` until it yields a value, sleeping between attempts as `policy` dictates.
///
/// Errors from `probe` are returned as is. Running out of attempts yields
/// [`FeatureStoreError::PollTimedOut`] and a fired `cancellation` token yields
/// [`FeatureStoreError::Cancelled`], both naming `operation`.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancellation: &CancellationToken,
    operation: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut delay = policy.interval;
    let mut attempts = 0u32;
    loop {
        if cancellation.is_cancelled() {
            return Err(FeatureStoreError::cancelled(operation).into());
        }
        attempts += 1;
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(FeatureStoreError::poll_timed_out(operation, attempts).into());
        }
        debug!(
            "{} not ready after {} attempt(s), next check in {:?}",
            operation, attempts, delay
        );
        tokio::select! {
            _ = cancellation.cancelled() => {
                return Err(FeatureStoreError::cancelled(operation).into());
            }
            _ = tokio::time::sleep(delay) => {}
        }
        delay = policy.next_delay(delay);
    }
}
