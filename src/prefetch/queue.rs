//! Priority-ordered prefetch queue with at most one entry per key.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

/// Zero-argument async producer of a cache value.
pub type FetchFn<V> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<V>> + Send + Sync>;

// == Queue Item ==
pub struct PrefetchQueueItem<V> {
    pub key: String,
    pub fetch_fn: FetchFn<V>,
    /// Higher is served first
    pub priority: i32,
    /// Longest the item may wait in the queue, and the execution deadline
    pub timeout: Duration,
    pub enqueued_at: Instant,
    /// Insertion order, breaks priority ties FIFO
    seq: u64,
}

impl<V> PrefetchQueueItem<V> {
    /// Time spent waiting since the item was first enqueued.
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn has_expired(&self) -> bool {
        self.waited() > self.timeout
    }
}

impl<V> std::fmt::Debug for PrefetchQueueItem<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchQueueItem")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// What `enqueue` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Added,
    /// Key already queued; priority raised from `from` to `to`
    Raised { from: i32, to: i32 },
    /// Key already queued at an equal or higher priority
    Unchanged,
}

// == Prefetch Queue ==
/// Kept sorted descending by priority, FIFO among equal priorities.
pub struct PrefetchQueue<V> {
    items: VecDeque<PrefetchQueueItem<V>>,
    next_seq: u64,
}

impl<V> Default for PrefetchQueue<V> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            next_seq: 0,
        }
    }
}

impl<V> PrefetchQueue<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key`, or raises its priority if it is already queued.
    ///
    /// An existing entry keeps its producer, timeout and enqueue time.
    pub fn enqueue(
        &mut self,
        key: &str,
        fetch_fn: FetchFn<V>,
        priority: i32,
        timeout: Duration,
    ) -> Enqueued {
        if let Some(existing) = self.items.iter_mut().find(|item| item.key == key) {
            if priority <= existing.priority {
                return Enqueued::Unchanged;
            }
            let from = existing.priority;
            existing.priority = priority;
            self.sort();
            return Enqueued::Raised { from, to: priority };
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back(PrefetchQueueItem {
            key: key.to_string(),
            fetch_fn,
            priority,
            timeout,
            enqueued_at: Instant::now(),
            seq,
        });
        self.sort();
        Enqueued::Added
    }

    /// Removes and returns the highest-priority item.
    pub fn pop(&mut self) -> Option<PrefetchQueueItem<V>> {
        self.items.pop_front()
    }

    pub fn remove(&mut self, key: &str) -> Option<PrefetchQueueItem<V>> {
        let index = self.items.iter().position(|item| item.key == key)?;
        self.items.remove(index)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.iter().any(|item| item.key == key)
    }

    pub fn priority_of(&self, key: &str) -> Option<i32> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.priority)
    }

    /// Queued keys in service order.
    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|item| item.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn sort(&mut self) {
        self.items
            .make_contiguous()
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }
}
