//! Cache Module
//!
//! Provides a generic in-memory cache with per-instance TTL expiration.
//! Each owner builds its own instance; there is no process-wide cache.

mod entry;
mod pattern;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use pattern::KeyPattern;
pub use stats::CacheStats;
pub use store::{SharedCache, TtlCache};

use std::time::Duration;

// == Public Constants ==
/// TTL for general data (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for prefetched reference data (30 minutes)
pub const PREFETCH_TTL: Duration = Duration::from_secs(30 * 60);
