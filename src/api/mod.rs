//! API Module
//!
//! Diagnostics HTTP surface over the caches, the prefetch queue and the
//! epic coordinator.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
