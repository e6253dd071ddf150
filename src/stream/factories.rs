//! Stream factories
//!
//! Each factory returns an input sink and a replay-latest output built from
//! the operator vocabulary in [`operators`](super::operators).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{future, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::stream::channel::drive_into;
use crate::stream::{
    debounce, distinct_until_changed, replay_latest, retry_with_delay, sink, switch_map, throttle,
    BoxStream, ScrollEvent, Settled, StreamOutput, StreamRetryPolicy, StreamSink,
};

/// Debounced input with repeats dropped: the front half of search and
/// filter pipelines.
pub fn debounce_distinct<S, T>(input: S, window: Duration) -> BoxStream<T>
where
    S: Stream<Item = T> + Send + 'static,
    T: PartialEq + Clone + Send + 'static,
{
    distinct_until_changed(debounce(input, window))
}

// == Search ==
pub struct SearchStream<R> {
    /// Raw query text, one event per keystroke
    pub search: StreamSink<String>,
    pub results: StreamOutput<Result<R>>,
}

/// Debounced, de-duplicated, switch-to-latest search.
pub fn create_search_stream<R, F, Fut>(search_fn: F, debounce_window: Duration) -> SearchStream<R>
where
    R: Clone + Send + Sync + 'static,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let (search, queries) = sink::<String>();
    let queries = debounce_distinct(
        queries.map(|query| query.trim().to_string()),
        debounce_window,
    );

    let results = switch_map(queries, move |query| {
        debug!(query = %query, "running search");
        let pending = search_fn(query);
        async move { pending.await.map_err(CacheError::fetch) }
    });

    SearchStream {
        search,
        results: replay_latest(results),
    }
}

// == Filter ==
pub struct FilterStream<F, R> {
    pub filters: StreamSink<F>,
    pub results: StreamOutput<Result<R>>,
}

/// Like search, but over structured filter values compared with `PartialEq`.
pub fn create_filter_stream<F, R, Op, Fut>(
    filter_fn: Op,
    debounce_window: Duration,
) -> FilterStream<F, R>
where
    F: PartialEq + Clone + Send + 'static,
    R: Clone + Send + Sync + 'static,
    Op: Fn(F) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let (filters, input) = sink::<F>();
    let applied = debounce_distinct(input, debounce_window);

    let results = switch_map(applied, move |filter| {
        let pending = filter_fn(filter);
        async move { pending.await.map_err(CacheError::fetch) }
    });

    FilterStream {
        filters,
        results: replay_latest(results),
    }
}

// == Infinite Scroll ==
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollConfig {
    /// Seen-content ratio that triggers a load
    pub threshold: f64,
    /// Sampling throttle on raw scroll positions
    pub sample_window: Duration,
    /// Throttle on load-more triggers
    pub trigger_window: Duration,
    /// Page requested by the first trigger
    pub first_page: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            sample_window: Duration::from_millis(200),
            trigger_window: Duration::from_millis(1000),
            first_page: 1,
        }
    }
}

/// Scroll samples throttled, gated on the threshold, then throttled again
/// into load-more triggers.
pub fn scroll_triggers<S>(events: S, config: &ScrollConfig) -> BoxStream<ScrollEvent>
where
    S: Stream<Item = ScrollEvent> + Send + 'static,
{
    let threshold = config.threshold;
    let near_end = throttle(events, config.sample_window)
        .filter(move |event| future::ready(event.reached(threshold)));
    throttle(near_end, config.trigger_window)
}

/// Next page to load, tied to the scope the pages belong to.
///
/// Asking for a scope other than the current one (another account, another
/// page size) starts over at the first page.
#[derive(Debug)]
pub struct PageCursor<K> {
    first_page: usize,
    position: Mutex<Option<(K, usize)>>,
}

impl<K: PartialEq + Clone> PageCursor<K> {
    pub fn new(first_page: usize) -> Self {
        Self {
            first_page,
            position: Mutex::new(None),
        }
    }

    /// Page to request next for `scope`.
    pub fn next(&self, scope: &K) -> usize {
        let mut position = self.position.lock();
        if let Some((current, page)) = position.as_ref() {
            if current == scope {
                return *page;
            }
            debug!("page scope changed, restarting at first page");
        }
        *position = Some((scope.clone(), self.first_page));
        self.first_page
    }

    /// Records `page` as delivered. Loads for a replaced scope are ignored.
    pub fn advance(&self, scope: &K, page: usize) {
        let mut position = self.position.lock();
        if let Some((current, next)) = position.as_mut() {
            if current == scope && *next <= page {
                *next = page + 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<R> {
    pub number: usize,
    pub items: R,
}

pub struct InfiniteScrollStream<R> {
    pub scroll: StreamSink<ScrollEvent>,
    pub pages: StreamOutput<Result<Page<R>>>,
}

/// Loads the next page whenever the user scrolls past the threshold.
///
/// The page counter only advances when a page is delivered, so a load that
/// fails or is superseded is requested again on the next trigger.
pub fn create_infinite_scroll_stream<R, F, Fut>(
    load_more: F,
    config: ScrollConfig,
) -> InfiniteScrollStream<R>
where
    R: Clone + Send + Sync + 'static,
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let (scroll, events) = sink::<ScrollEvent>();
    let triggers = scroll_triggers(events, &config);

    let cursor = Arc::new(PageCursor::new(config.first_page));
    let pages = switch_map(triggers, move |_| {
        let cursor = Arc::clone(&cursor);
        let number = cursor.next(&());
        debug!(page = number, "loading more");
        let pending = load_more(number);
        async move {
            let items = pending.await.map_err(CacheError::fetch)?;
            cursor.advance(&(), number);
            Ok::<_, CacheError>(Page { number, items })
        }
    });

    InfiniteScrollStream {
        scroll,
        pages: replay_latest(pages),
    }
}

// == Retryable ==
pub struct RetryableStream<T, R> {
    pub trigger: StreamSink<T>,
    pub results: StreamOutput<Settled<R>>,
}

/// Every trigger runs `operation` under `policy`; the output always settles
/// to a value, never an error.
pub fn create_retryable_stream<T, R, F, Fut>(
    operation: F,
    policy: StreamRetryPolicy,
) -> RetryableStream<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let (trigger, input) = sink::<T>();
    let operation = Arc::new(operation);
    let policy = Arc::new(policy);

    let results = switch_map(input, move |params: T| {
        let operation = Arc::clone(&operation);
        let policy = Arc::clone(&policy);
        async move { retry_with_delay(|| (*operation)(params.clone()), &policy).await }
    });

    RetryableStream {
        trigger,
        results: replay_latest(results),
    }
}

// == Realtime ==
pub struct RealtimeStream<R> {
    /// Forces an immediate poll
    pub refresh: StreamSink<()>,
    pub updates: StreamOutput<R>,
}

/// Polls `fetch` every `interval` (and on demand), emitting only changes.
///
/// Poll failures are logged and skipped; the last good value stays current.
pub fn create_realtime_stream<R, F, Fut>(fetch: F, interval: Duration) -> RealtimeStream<R>
where
    R: PartialEq + Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let (refresh, manual) = sink::<()>();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ticks = IntervalStream::new(ticker).map(|_| ());

    let polled = futures::stream::select(ticks, manual)
        .then(move |_| fetch())
        .filter_map(|outcome| {
            future::ready(match outcome {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(error = %err, "realtime poll failed");
                    None
                }
            })
        });

    RealtimeStream {
        refresh,
        updates: replay_latest(distinct_until_changed(polled)),
    }
}

// == Auto-save ==
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved { at: DateTime<Utc> },
    Error { message: String },
}

pub struct AutoSaveStream<D> {
    pub drafts: StreamSink<D>,
    pub status: StreamOutput<SaveStatus>,
}

/// Reports `Saving` as soon as a draft arrives, then `Saved` or `Error`
/// once the debounced save of the latest draft finishes.
///
/// Reverting `Saved` to `Idle` after a while is left to the consumer.
pub fn create_autosave_stream<D, F, Fut>(save_fn: F, debounce_window: Duration) -> AutoSaveStream<D>
where
    D: Send + 'static,
    F: Fn(D) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (drafts, input) = sink::<D>();
    let (tx, status) = StreamOutput::channel();
    tx.send_replace(Some(SaveStatus::Idle));

    let saving = Arc::clone(&tx);
    let marked = input.inspect(move |_| {
        saving.send_replace(Some(SaveStatus::Saving));
    });

    let outcomes = switch_map(debounce(marked, debounce_window), move |draft| {
        let pending = save_fn(draft);
        async move {
            match pending.await {
                Ok(()) => SaveStatus::Saved { at: Utc::now() },
                Err(err) => {
                    warn!(error = %err, "auto-save failed");
                    SaveStatus::Error {
                        message: format!("{:#}", err),
                    }
                }
            }
        }
    });
    drive_into(outcomes, tx);

    AutoSaveStream { drafts, status }
}
