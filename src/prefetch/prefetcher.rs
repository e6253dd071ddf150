//! Prefetcher
//!
//! Drains a [`PrefetchQueue`] into a TTL cache with a single-flight worker.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{SharedCache, TtlCache, PREFETCH_TTL};
use crate::error::{CacheError, Result};
use crate::prefetch::stats::StateLog;
use crate::prefetch::{
    fetch_fn, Enqueued, FetchFn, PrefetchQueue, PrefetchQueueItem, PrefetchState, PrefetchStats,
    OUTCOME_HISTORY,
};

// == Configuration ==
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchConfig {
    /// TTL of the cache built by [`Prefetcher::new`]
    pub ttl: Duration,
    /// Timeout for items scheduled without an explicit one, and for
    /// [`Prefetcher::prefetch_now`]
    pub default_timeout: Duration,
    /// Pause between two item executions
    pub item_pause: Duration,
    /// Interval of the background drain tick
    pub tick_interval: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            ttl: PREFETCH_TTL,
            default_timeout: Duration::from_millis(5000),
            item_pause: Duration::from_millis(50),
            tick_interval: Duration::from_millis(3000),
        }
    }
}

/// Per-request scheduling options.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchOptions {
    pub priority: i32,
    /// Leave the item for the background tick instead of draining now
    pub background: bool,
    /// Falls back to [`PrefetchConfig::default_timeout`]
    pub timeout: Option<Duration>,
    /// Queue even when a valid entry is already cached
    pub auto_refetch: bool,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            background: true,
            timeout: None,
            auto_refetch: false,
        }
    }
}

impl PrefetchOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn foreground(mut self) -> Self {
        self.background = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn auto_refetch(mut self) -> Self {
        self.auto_refetch = true;
        self
    }
}

/// One entry of a [`Prefetcher::prefetch_batch`] call.
pub struct PrefetchRequest<V> {
    pub key: String,
    pub fetch_fn: FetchFn<V>,
    pub options: PrefetchOptions,
}

impl<V> PrefetchRequest<V> {
    pub fn new(key: impl Into<String>, fetch_fn: FetchFn<V>) -> Self {
        Self {
            key: key.into(),
            fetch_fn,
            options: PrefetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PrefetchOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: u64,
    failed: u64,
    timed_out: u64,
    skipped: u64,
}

struct Inner<V> {
    cache: SharedCache<V>,
    config: PrefetchConfig,
    queue: Mutex<PrefetchQueue<V>>,
    processing: AtomicBool,
    states: Mutex<StateLog>,
    counters: Mutex<Counters>,
}

/// Clears the single-flight flag even if the worker future is dropped.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// == Prefetcher ==
/// Cloneable handle over one queue, one worker flag and one cache.
pub struct Prefetcher<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Prefetcher<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Prefetcher<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a prefetcher with its own cache using `config.ttl`.
    pub fn new(config: PrefetchConfig) -> Self {
        let cache = TtlCache::shared(config.ttl);
        Self::with_cache(cache, config)
    }

    pub fn with_cache(cache: SharedCache<V>, config: PrefetchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                config,
                queue: Mutex::new(PrefetchQueue::new()),
                processing: AtomicBool::new(false),
                states: Mutex::new(StateLog::new(OUTCOME_HISTORY)),
                counters: Mutex::new(Counters::default()),
            }),
        }
    }

    pub fn cache(&self) -> &SharedCache<V> {
        &self.inner.cache
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.inner.config
    }

    // == Schedule ==
    /// Queues `key` for background population.
    ///
    /// No-op when a valid entry is cached and `auto_refetch` is off. A key
    /// already in the queue only has its priority raised. With
    /// `background == false` a drain is started right away.
    pub async fn schedule_prefetch<F, Fut>(&self, key: &str, fetch: F, options: PrefetchOptions)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.schedule(key, fetch_fn(fetch), &options).await;
        if !options.background {
            self.spawn_processing();
        }
    }

    async fn schedule(&self, key: &str, fetch: FetchFn<V>, options: &PrefetchOptions) {
        if !options.auto_refetch && self.inner.cache.read().await.contains(key) {
            debug!(key, "already cached, prefetch skipped");
            self.inner.counters.lock().skipped += 1;
            return;
        }

        let timeout = options.timeout.unwrap_or(self.inner.config.default_timeout);
        let enqueued = self
            .inner
            .queue
            .lock()
            .enqueue(key, fetch, options.priority, timeout);

        match enqueued {
            Enqueued::Added => {
                debug!(key, priority = options.priority, "prefetch queued");
                self.set_state(key, PrefetchState::Queued);
            }
            Enqueued::Raised { from, to } => {
                debug!(key, from, to, "prefetch priority raised");
            }
            Enqueued::Unchanged => {}
        }
    }

    // == Batch ==
    /// Queues every request, then starts draining immediately.
    pub async fn prefetch_batch(&self, requests: Vec<PrefetchRequest<V>>) {
        for request in requests {
            self.schedule(&request.key, request.fetch_fn, &request.options)
                .await;
        }
        self.spawn_processing();
    }

    // == Prefetch Now ==
    /// Bypasses the queue: returns the cached value or fetches and caches it.
    ///
    /// Unlike queued work, a failure here is returned to the caller. The
    /// fetch is bounded by [`PrefetchConfig::default_timeout`].
    pub async fn prefetch_now<F, Fut>(&self, key: &str, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        if let Some(value) = self.inner.cache.write().await.get(key) {
            return Ok(value);
        }

        let limit = self.inner.config.default_timeout;
        let value = match tokio::time::timeout(limit, fetch()).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                self.set_state(key, PrefetchState::Failed);
                return Err(CacheError::fetch(err));
            }
            Err(_) => {
                warn!(key, timeout_ms = limit.as_millis() as u64, "direct prefetch timed out");
                self.set_state(key, PrefetchState::TimedOut);
                return Err(CacheError::Timeout(limit.as_millis() as u64));
            }
        };
        self.inner.cache.write().await.set(key, value.clone());
        self.set_state(key, PrefetchState::Cached);
        Ok(value)
    }

    // == Process Queue ==
    /// Drains the queue highest priority first.
    ///
    /// Only one drain runs at a time; a call made while one is running
    /// returns immediately.
    pub async fn process_queue(&self) {
        if self
            .inner
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("prefetch worker already running");
            return;
        }
        let _guard = ProcessingGuard(&self.inner.processing);

        loop {
            let next = self.inner.queue.lock().pop();
            let Some(item) = next else { break };

            self.run_item(item).await;

            if !self.inner.queue.lock().is_empty() {
                tokio::time::sleep(self.inner.config.item_pause).await;
            }
        }
    }

    async fn run_item(&self, item: PrefetchQueueItem<V>) {
        let key = item.key.as_str();

        if item.has_expired() {
            warn!(
                key,
                waited_ms = item.waited().as_millis() as u64,
                timeout_ms = item.timeout.as_millis() as u64,
                "prefetch dropped, waited too long in queue"
            );
            self.finish(key, PrefetchState::TimedOut);
            return;
        }

        self.set_state(key, PrefetchState::Running);
        match tokio::time::timeout(item.timeout, (item.fetch_fn)()).await {
            Ok(Ok(value)) => {
                self.inner.cache.write().await.set(key, value);
                debug!(key, "prefetch cached");
                self.finish(key, PrefetchState::Cached);
            }
            Ok(Err(err)) => {
                warn!(key, error = %err, "prefetch failed");
                self.finish(key, PrefetchState::Failed);
            }
            Err(_) => {
                warn!(
                    key,
                    timeout_ms = item.timeout.as_millis() as u64,
                    "prefetch timed out"
                );
                self.finish(key, PrefetchState::TimedOut);
            }
        }
    }

    /// Starts a drain on its own task.
    pub fn spawn_processing(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.process_queue().await });
    }

    fn set_state(&self, key: &str, state: PrefetchState) {
        self.inner.states.lock().set(key, state);
    }

    fn finish(&self, key: &str, state: PrefetchState) {
        self.set_state(key, state);
        let mut counters = self.inner.counters.lock();
        match state {
            PrefetchState::Cached => counters.completed += 1,
            PrefetchState::Failed => counters.failed += 1,
            PrefetchState::TimedOut => counters.timed_out += 1,
            PrefetchState::Queued | PrefetchState::Running => {}
        }
    }

    // == Introspection ==
    /// Last known lifecycle state of `key`.
    ///
    /// Only the most recent outcomes are remembered; older keys report `None`.
    pub fn status(&self, key: &str) -> Option<PrefetchState> {
        self.inner.states.lock().get(key)
    }

    /// Number of keys whose state is currently remembered.
    pub fn tracked_keys(&self) -> usize {
        self.inner.states.lock().len()
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.queue.lock().is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    /// Priority of `key` while it is still queued.
    pub fn queued_priority(&self, key: &str) -> Option<i32> {
        self.inner.queue.lock().priority_of(key)
    }

    pub async fn get_prefetch_stats(&self) -> PrefetchStats {
        let cache = self.inner.cache.read().await.stats();
        let queued_keys = self.inner.queue.lock().keys();
        let counters = self.inner.counters.lock();
        PrefetchStats {
            queued_keys,
            processing: self.is_processing(),
            completed: counters.completed,
            failed: counters.failed,
            timed_out: counters.timed_out,
            skipped: counters.skipped,
            cache,
        }
    }

    /// Drops every queued item without running it.
    pub fn clear_queue(&self) -> usize {
        let dropped = {
            let mut queue = self.inner.queue.lock();
            let keys = queue.keys();
            let mut states = self.inner.states.lock();
            for key in &keys {
                states.forget_pending(key);
            }
            queue.clear()
        };
        if dropped > 0 {
            info!("Prefetch queue cleared, {} items dropped", dropped);
        }
        dropped
    }
}
