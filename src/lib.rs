//! Smart Cache - client-side data layer for a banking UI
//!
//! TTL caches, a coalescing retry executor, a priority prefetch queue,
//! reactive stream operators and an epic coordinator that ties them to
//! user actions.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod domain;
pub mod epic;
pub mod error;
pub mod models;
pub mod prefetch;
pub mod retry;
pub mod stream;
pub mod tasks;

pub use api::AppState;
pub use cache::{SharedCache, TtlCache};
pub use config::Config;
pub use epic::{Action, EpicCoordinator};
pub use error::{CacheError, Result};
pub use prefetch::Prefetcher;
pub use retry::RetryExecutor;
pub use tasks::{spawn_cleanup_task, spawn_prefetch_ticker};
