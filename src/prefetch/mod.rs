//! Prefetch Module
//!
//! Best-effort background population of a TTL cache from a priority queue.
//! Failures and timeouts are logged and dropped, never surfaced.

mod prefetcher;
mod queue;
mod stats;


pub use prefetcher::{PrefetchConfig, PrefetchOptions, PrefetchRequest, Prefetcher};
pub use queue::{Enqueued, FetchFn, PrefetchQueue, PrefetchQueueItem};
pub use stats::{PrefetchState, PrefetchStats, OUTCOME_HISTORY};

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

/// Boxes an async producer into a [`FetchFn`].
pub fn fetch_fn<V, F, Fut>(f: F) -> FetchFn<V>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}
