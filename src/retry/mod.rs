//! Retry Module
//!
//! Bounded, linearly backed-off retries around an async producer, writing
//! successful results into a caller-owned TTL cache.

mod executor;
mod state;

pub use executor::{RetryExecutor, RetryStats};
pub use state::{PendingRetry, RetryConfig, RetryState};
