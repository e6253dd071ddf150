//! Configuration Module
//!
//! Loads daemon settings from environment variables and turns them into the
//! per-component configs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::epic::{EpicSettings, UiState};
use crate::prefetch::PrefetchConfig;
use crate::retry::RetryConfig;
use crate::stream::{ScrollConfig, StreamRetryPolicy};

/// Daemon configuration.
///
/// All values can be configured via environment variables; unparseable
/// values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// TTL in seconds for general cached data
    pub cache_ttl_secs: u64,
    /// TTL in seconds for prefetched reference data
    pub prefetch_ttl_secs: u64,
    pub max_retries: u32,
    /// Linear backoff unit for the retry executor
    pub retry_delay_ms: u64,
    /// Default time an item may wait in the prefetch queue
    pub prefetch_timeout_ms: u64,
    pub prefetch_tick_ms: u64,
    pub prefetch_item_pause_ms: u64,
    pub search_debounce_ms: u64,
    pub filter_debounce_ms: u64,
    pub autosave_debounce_ms: u64,
    /// Throttle on infinite-scroll load triggers
    pub scroll_throttle_ms: u64,
    /// Throttle on raw scroll samples
    pub scroll_sample_ms: u64,
    pub scroll_threshold: f64,
    /// Fixed delay for retryable streams and the fetch re-trigger
    pub stream_retry_delay_ms: u64,
    /// Seconds between expired-entry sweeps
    pub cleanup_interval: u64,
    pub server_port: u16,
    /// Account the demo UI state starts with
    pub account_id: String,
    pub page_size: usize,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_SECS` (300), `PREFETCH_TTL_SECS` (1800)
    /// - `MAX_RETRIES` (3), `RETRY_DELAY_MS` (1000)
    /// - `PREFETCH_TIMEOUT_MS` (5000), `PREFETCH_TICK_MS` (3000),
    ///   `PREFETCH_ITEM_PAUSE_MS` (50)
    /// - `SEARCH_DEBOUNCE_MS` (300), `FILTER_DEBOUNCE_MS` (500),
    ///   `AUTOSAVE_DEBOUNCE_MS` (2000)
    /// - `SCROLL_THROTTLE_MS` (1000), `SCROLL_SAMPLE_MS` (200),
    ///   `SCROLL_THRESHOLD` (0.8)
    /// - `STREAM_RETRY_DELAY_MS` (1000)
    /// - `CLEANUP_INTERVAL` (60), `SERVER_PORT` (3000)
    /// - `ACCOUNT_ID` (acc-1), `PAGE_SIZE` (20)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl_secs: env_or("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            prefetch_ttl_secs: env_or("PREFETCH_TTL_SECS", defaults.prefetch_ttl_secs),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", defaults.retry_delay_ms),
            prefetch_timeout_ms: env_or("PREFETCH_TIMEOUT_MS", defaults.prefetch_timeout_ms),
            prefetch_tick_ms: env_or("PREFETCH_TICK_MS", defaults.prefetch_tick_ms),
            prefetch_item_pause_ms: env_or(
                "PREFETCH_ITEM_PAUSE_MS",
                defaults.prefetch_item_pause_ms,
            ),
            search_debounce_ms: env_or("SEARCH_DEBOUNCE_MS", defaults.search_debounce_ms),
            filter_debounce_ms: env_or("FILTER_DEBOUNCE_MS", defaults.filter_debounce_ms),
            autosave_debounce_ms: env_or("AUTOSAVE_DEBOUNCE_MS", defaults.autosave_debounce_ms),
            scroll_throttle_ms: env_or("SCROLL_THROTTLE_MS", defaults.scroll_throttle_ms),
            scroll_sample_ms: env_or("SCROLL_SAMPLE_MS", defaults.scroll_sample_ms),
            scroll_threshold: env_or("SCROLL_THRESHOLD", defaults.scroll_threshold),
            stream_retry_delay_ms: env_or("STREAM_RETRY_DELAY_MS", defaults.stream_retry_delay_ms),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            account_id: env_or("ACCOUNT_ID", defaults.account_id),
            page_size: env_or("PAGE_SIZE", defaults.page_size),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cleanup_every(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            ttl: self.cache_ttl(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn prefetch(&self) -> PrefetchConfig {
        PrefetchConfig {
            ttl: Duration::from_secs(self.prefetch_ttl_secs),
            default_timeout: Duration::from_millis(self.prefetch_timeout_ms),
            item_pause: Duration::from_millis(self.prefetch_item_pause_ms),
            tick_interval: Duration::from_millis(self.prefetch_tick_ms.max(1)),
        }
    }

    pub fn epics(&self) -> EpicSettings {
        let stream_retry_delay = Duration::from_millis(self.stream_retry_delay_ms);
        EpicSettings {
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            filter_debounce: Duration::from_millis(self.filter_debounce_ms),
            autosave_debounce: Duration::from_millis(self.autosave_debounce_ms),
            scroll: ScrollConfig {
                threshold: self.scroll_threshold,
                sample_window: Duration::from_millis(self.scroll_sample_ms),
                trigger_window: Duration::from_millis(self.scroll_throttle_ms),
                ..Default::default()
            },
            fetch_retry_delay: stream_retry_delay,
            max_fetch_retries: self.max_retries,
            transfer_retry: StreamRetryPolicy {
                max_retries: self.max_retries,
                delay: stream_retry_delay,
                timeout: None,
            },
        }
    }

    pub fn initial_state(&self) -> UiState {
        UiState {
            account_id: self.account_id.clone(),
            page_size: self.page_size.max(1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            prefetch_ttl_secs: 1800,
            max_retries: 3,
            retry_delay_ms: 1000,
            prefetch_timeout_ms: 5000,
            prefetch_tick_ms: 3000,
            prefetch_item_pause_ms: 50,
            search_debounce_ms: 300,
            filter_debounce_ms: 500,
            autosave_debounce_ms: 2000,
            scroll_throttle_ms: 1000,
            scroll_sample_ms: 200,
            scroll_threshold: 0.8,
            stream_retry_delay_ms: 1000,
            cleanup_interval: 60,
            server_port: 3000,
            account_id: "acc-1".to_string(),
            page_size: 20,
        }
    }
}
