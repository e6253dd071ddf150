//! Cache Store Module
//!
//! Main cache engine: a HashMap of entries sharing one TTL fixed at
//! construction. Expired entries are evicted lazily on read, by
//! `cleanup_expired`, or by an explicit `remove`/`clear`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, KeyPattern};

/// Cache handle shared between the components a caller wires together.
pub type SharedCache<V> = Arc<RwLock<TtlCache<V>>>;

// == TTL Cache ==
/// Key/value store with a single per-instance TTL.
#[derive(Debug)]
pub struct TtlCache<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Lifetime given to every write
    ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> TtlCache<V> {
    // == Constructor ==
    /// Creates an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Creates an empty cache already wrapped for sharing.
    pub fn shared(ttl: Duration) -> SharedCache<V> {
        Arc::new(RwLock::new(Self::new(ttl)))
    }

    /// TTL applied to every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns `None` when the key is missing or expired; an expired entry
    /// is removed as a side effect.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
            self.evictions += 1;
            debug!(key, "evicted expired entry on read");
        }
        self.misses += 1;
        None
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry and restarting its TTL.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let entry = CacheEntry::new(value, self.ttl);
        self.entries.insert(key.into(), entry);
    }

    // == Remove ==
    /// Unconditionally evicts `key`. Returns whether an entry was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    /// Evicts every key matching `pattern`, or everything when `None`.
    ///
    /// Returns the number of entries removed. Clearing an empty cache or a
    /// pattern that matches nothing is a no-op.
    pub fn clear(&mut self, pattern: Option<&str>) -> usize {
        let before = self.entries.len();
        match pattern {
            Some(pattern) => {
                let pattern = KeyPattern::parse(pattern);
                self.entries.retain(|key, _| !pattern.matches(key));
            }
            None => self.entries.clear(),
        }
        before - self.entries.len()
    }

    // == Contains ==
    /// Returns true if `key` holds a valid entry. Does not touch counters.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired())
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let expired = self
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .count();

        CacheStats {
            total: self.entries.len(),
            valid: self.entries.len() - expired,
            expired,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - self.entries.len();
        self.evictions += removed as u64;
        removed
    }

    // == Length ==
    /// Returns the current number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of entry metadata, for diagnostics.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }
}
