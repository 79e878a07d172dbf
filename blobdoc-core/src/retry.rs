use crate::config::{ConflictRetryConfig, ThrottleConfig};
use crate::{DocError, Result};
use std::future::Future;
use std::time::Duration;

/// Bounded, fixed-delay retry around a single blob mutation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &ConflictRetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempt budget is spent. The attempt number (starting at 1) is
    /// passed to `op`; on exhaustion the last error is returned.
    pub async fn retry_when<T, F, Fut, P>(&self, retryable: P, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&DocError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if retryable(&error) && attempt < self.max_attempts => {
                    tracing::debug!(
                        "retrying after attempt {}/{}: {}",
                        attempt,
                        self.max_attempts,
                        error
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Retries `op` on version mismatches. `op` must resolve the current
    /// version of `path` itself on every attempt. Exhausting the budget
    /// yields [`DocError::Conflict`].
    pub async fn run_on_conflict<T, F, Fut>(&self, path: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.retry_when(DocError::is_version_mismatch, op).await {
            Err(DocError::VersionMismatch { .. }) => {
                tracing::warn!(
                    "giving up on {} after {} conflicting attempts",
                    path,
                    self.max_attempts
                );
                Err(DocError::Conflict {
                    path: path.to_string(),
                    attempts: self.max_attempts,
                })
            }
            other => other,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ConflictRetryConfig::default())
    }
}

/// Exponential backoff for throttled transport requests, capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct ThrottleBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
}

impl ThrottleBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_secs(config.max_delay_secs),
            config.max_retries,
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (0-based). A server hint wins when
    /// it is longer, but the cap always applies.
    pub fn delay_for(&self, retry: u32, server_hint: Option<Duration>) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let exponential = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        let delay = match server_hint {
            Some(hint) if hint > exponential => hint,
            _ => exponential,
        };
        delay.min(self.max_delay)
    }
}

impl Default for ThrottleBackoff {
    fn default() -> Self {
        Self::from_config(&ThrottleConfig::default())
    }
}
