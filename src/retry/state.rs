//! Retry configuration and per-key retry bookkeeping.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::cache::DEFAULT_TTL;

/// Settings for a [`RetryExecutor`](super::RetryExecutor).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// TTL of the cache the executor writes into
    pub ttl: Duration,
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
    /// Backoff unit; the n-th retry waits `retry_delay * n`
    pub retry_delay: Duration,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Ephemeral retry state for one key. Dropped on success or exhaustion.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Failed attempts so far
    pub attempts: u32,
    /// When the scheduled retry fires, if one is pending
    pub next_attempt_at: Option<Instant>,
    pub last_error: Option<String>,
}

impl RetryState {
    /// Diagnostics view of this state as of `now`.
    pub fn snapshot(&self, key: &str, now: Instant) -> PendingRetry {
        PendingRetry {
            key: key.to_string(),
            attempts: self.attempts,
            retry_in_ms: self
                .next_attempt_at
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            last_error: self.last_error.clone(),
        }
    }
}

/// A key waiting on its next retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRetry {
    pub key: String,
    pub attempts: u32,
    /// Time left before the next attempt fires
    pub retry_in_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_snapshot_reports_time_to_next_attempt() {
        let now = Instant::now();
        let state = RetryState {
            attempts: 2,
            next_attempt_at: Some(now + Duration::from_millis(400)),
            last_error: Some("connection reset".to_string()),
        };

        let pending = state.snapshot("balance", now + Duration::from_millis(150));
        assert_eq!(
            pending,
            PendingRetry {
                key: "balance".to_string(),
                attempts: 2,
                retry_in_ms: Some(250),
                last_error: Some("connection reset".to_string()),
            }
        );

        let overdue = state.snapshot("balance", now + Duration::from_secs(1));
        assert_eq!(overdue.retry_in_ms, Some(0));
    }

    #[test]
    fn test_linear_backoff() {
        let config = RetryConfig {
            retry_delay: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(250));
        assert_eq!(config.backoff(2), Duration::from_millis(500));
        assert_eq!(config.backoff(3), Duration::from_millis(750));
    }
}
