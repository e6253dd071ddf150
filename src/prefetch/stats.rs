//! Prefetch item lifecycle and statistics.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::cache::CacheStats;

/// `Queued -> Running -> {Cached, TimedOut, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchState {
    Queued,
    Running,
    Cached,
    TimedOut,
    Failed,
}

impl PrefetchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PrefetchState::Cached | PrefetchState::TimedOut | PrefetchState::Failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrefetchStats {
    /// Items waiting, in service order
    pub queued_keys: Vec<String>,
    /// Whether the worker is draining right now
    pub processing: bool,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Requests ignored because a valid entry was already cached
    pub skipped: u64,
    pub cache: CacheStats,
}

impl PrefetchStats {
    pub fn queued(&self) -> usize {
        self.queued_keys.len()
    }
}

/// Terminal outcomes remembered per prefetcher.
pub const OUTCOME_HISTORY: usize = 256;

/// Last known state per key.
///
/// Queued and running keys are always tracked; only the newest `capacity`
/// terminal outcomes are kept, oldest forgotten first.
#[derive(Debug)]
pub(crate) struct StateLog {
    states: HashMap<String, PrefetchState>,
    finished: VecDeque<String>,
    capacity: usize,
}

impl StateLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            states: HashMap::new(),
            finished: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<PrefetchState> {
        self.states.get(key).copied()
    }

    pub(crate) fn set(&mut self, key: &str, state: PrefetchState) {
        let previous = self.states.insert(key.to_string(), state);
        if previous.map_or(false, PrefetchState::is_terminal) {
            self.finished.retain(|finished| finished != key);
        }
        if !state.is_terminal() {
            return;
        }

        self.finished.push_back(key.to_string());
        while self.finished.len() > self.capacity {
            if let Some(oldest) = self.finished.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    /// Forgets `key` unless it already has a terminal outcome.
    pub(crate) fn forget_pending(&mut self, key: &str) {
        if self.get(key).map_or(false, |state| !state.is_terminal()) {
            self.states.remove(key);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }
}
