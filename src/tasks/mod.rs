//! Background Tasks Module
//!
//! Periodic work that runs for the lifetime of the daemon. Every task is a
//! plain spawned loop returning its `JoinHandle` so shutdown can abort it.
//!
//! # Tasks
//! - TTL cleanup: sweeps expired entries out of a cache
//! - Prefetch tick: drains the prefetch queue when work is waiting

mod cleanup;
mod prefetch_tick;

pub use cleanup::spawn_cleanup_task;
pub use prefetch_tick::spawn_prefetch_ticker;
