//! Epic Module
//!
//! Side-effect pipelines over the application's action log. Each epic
//! listens for its trigger types, runs them through stream operators and
//! the cache/retry/prefetch layer, and emits follow-up actions that are
//! dispatched back into the same log.

mod action;
mod banking;
mod coordinator;
mod state;

pub use action::{kinds, Action};
pub use banking::{banking_epics, EpicContext, EpicSettings};
pub use coordinator::{combine_epics, ActionStream, Actions, Epic, EpicCoordinator, StateStream};
pub use state::UiState;
