//! Retry Executor
//!
//! Runs an async producer until it succeeds or its retry budget is spent.
//! Concurrent calls for the same key share one in-flight run, so a key never
//! has two racing attempt counters.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{SharedCache, TtlCache};
use crate::error::{CacheError, Result};
use crate::retry::{PendingRetry, RetryConfig, RetryState};

type SharedOutcome<V> = Shared<BoxFuture<'static, Result<V>>>;
type StateMap = Arc<Mutex<HashMap<String, RetryState>>>;

struct InFlight<V> {
    outcome: SharedOutcome<V>,
    abort: AbortHandle,
}

type InFlightMap<V> = Arc<Mutex<HashMap<String, InFlight<V>>>>;

struct Inner<V> {
    cache: SharedCache<V>,
    config: RetryConfig,
    states: StateMap,
    in_flight: InFlightMap<V>,
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        // Last handle gone: no pending retry timer may outlive its owner.
        for (_, run) in self.in_flight.lock().drain() {
            run.abort.abort();
        }
    }
}

/// Observability snapshot of an executor.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RetryStats {
    /// Keys with a run in progress
    pub in_flight: usize,
    /// Keys that have failed at least once and are waiting on a retry
    pub retrying: usize,
    /// Per-key detail for `retrying`, sorted by key
    pub pending: Vec<PendingRetry>,
}

// == Retry Executor ==
/// Cheaply cloneable handle; all clones share the same cache and retry state.
pub struct RetryExecutor<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for RetryExecutor<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> RetryExecutor<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an executor with its own private cache built from `config.ttl`.
    pub fn new(config: RetryConfig) -> Self {
        let cache = TtlCache::shared(config.ttl);
        Self::with_cache(cache, config)
    }

    /// Creates an executor writing into a cache the caller already owns.
    pub fn with_cache(cache: SharedCache<V>, config: RetryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                config,
                states: Arc::new(Mutex::new(HashMap::new())),
                in_flight: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    pub fn cache(&self) -> &SharedCache<V> {
        &self.inner.cache
    }

    pub fn config(&self) -> &RetryConfig {
        &self.inner.config
    }

    // == Execute With Retry ==
    /// Runs `action` until it succeeds, retrying with linear backoff.
    ///
    /// On success the value is cached under `key` and the attempt counter
    /// for `key` is reset. After `max_retries` retries the last error is
    /// returned as [`CacheError::RetryExhausted`] and the key is abandoned.
    /// A call made while another run for `key` is in flight waits on that
    /// run instead of starting a second one.
    pub async fn execute_with_retry<F, Fut>(&self, key: &str, action: F) -> Result<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let outcome = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(key) {
                Some(run) => {
                    debug!(key, "joining in-flight fetch");
                    run.outcome.clone()
                }
                None => self.spawn_run(key, action, &mut in_flight),
            }
        };
        outcome.await
    }

    /// Returns the cached value for `key`, fetching through
    /// [`execute_with_retry`](Self::execute_with_retry) on a miss.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, action: F) -> Result<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        if let Some(value) = self.inner.cache.write().await.get(key) {
            debug!(key, "cache hit");
            return Ok(value);
        }
        self.execute_with_retry(key, action).await
    }

    fn spawn_run<F, Fut>(
        &self,
        key: &str,
        action: F,
        in_flight: &mut HashMap<String, InFlight<V>>,
    ) -> SharedOutcome<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let run = RetryRun {
            key: key.to_string(),
            cache: Arc::clone(&self.inner.cache),
            states: Arc::clone(&self.inner.states),
            config: self.inner.config.clone(),
        };
        let registry = Arc::clone(&self.inner.in_flight);
        let task_key = key.to_string();

        let handle = tokio::spawn(async move {
            let result = run.execute(action).await;
            registry.lock().remove(&task_key);
            result
        });
        let abort = handle.abort_handle();

        let waiter_key = key.to_string();
        let outcome = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(CacheError::Cancelled(waiter_key)),
                Err(err) => Err(CacheError::Fetch(format!("retry task failed: {}", err))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            key.to_string(),
            InFlight {
                outcome: outcome.clone(),
                abort,
            },
        );
        outcome
    }

    // == Introspection ==
    /// Failed attempts recorded for `key` since its last success.
    pub fn attempts(&self, key: &str) -> u32 {
        self.inner
            .states
            .lock()
            .get(key)
            .map_or(0, |state| state.attempts)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner.in_flight.lock().contains_key(key)
    }

    pub fn stats(&self) -> RetryStats {
        let now = Instant::now();
        let mut pending: Vec<PendingRetry> = self
            .inner
            .states
            .lock()
            .iter()
            .map(|(key, state)| state.snapshot(key, now))
            .collect();
        pending.sort_by(|a, b| a.key.cmp(&b.key));

        RetryStats {
            in_flight: self.inner.in_flight.lock().len(),
            retrying: pending.len(),
            pending,
        }
    }

    // == Shutdown ==
    /// Aborts every pending run and its retry timer.
    ///
    /// Callers still waiting receive [`CacheError::Cancelled`].
    pub fn shutdown(&self) {
        let runs: Vec<_> = self.inner.in_flight.lock().drain().collect();
        for (key, run) in &runs {
            debug!(key = %key, "aborting pending retry");
            run.abort.abort();
        }
        self.inner.states.lock().clear();
        if !runs.is_empty() {
            info!("Retry executor shut down, {} runs aborted", runs.len());
        }
    }
}

/// Everything one spawned run needs, detached from the executor handle so
/// that dropping the last handle can abort it.
struct RetryRun<V> {
    key: String,
    cache: SharedCache<V>,
    states: StateMap,
    config: RetryConfig,
}

impl<V: Clone> RetryRun<V> {
    async fn execute<F, Fut>(self, action: F) -> Result<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let key = self.key.as_str();
        loop {
            match action().await {
                Ok(value) => {
                    self.cache.write().await.set(key, value.clone());
                    self.states.lock().remove(key);
                    debug!(key, "fetch succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    let retry = self.record_failure(&err);
                    match retry {
                        Some(attempt) => {
                            let delay = self.config.backoff(attempt);
                            debug!(
                                key,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "fetch failed, scheduling retry"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            let attempts = self.config.max_retries + 1;
                            warn!(key, attempts, error = %err, "retries exhausted");
                            return Err(CacheError::RetryExhausted {
                                key: self.key.clone(),
                                attempts,
                                last_error: format!("{:#}", err),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Bumps the attempt counter, returning the retry number to schedule,
    /// or `None` (and clearing the state) once the budget is spent.
    fn record_failure(&self, err: &anyhow::Error) -> Option<u32> {
        let mut states = self.states.lock();
        let state = states.entry(self.key.clone()).or_default();
        if state.attempts < self.config.max_retries {
            state.attempts += 1;
            state.last_error = Some(err.to_string());
            state.next_attempt_at = Some(Instant::now() + self.config.backoff(state.attempts));
            Some(state.attempts)
        } else {
            states.remove(&self.key);
            None
        }
    }
}
