//! API Handlers
//!
//! HTTP request handlers for each diagnostics endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::backend::Backend;
use crate::cache::SharedCache;
use crate::config::Config;
use crate::epic::{banking_epics, combine_epics, EpicContext, EpicCoordinator, UiState};
use crate::error::{CacheError, Result};
use crate::models::{
    ActionsResponse, ClearQuery, ClearResponse, DeleteResponse, DispatchRequest,
    DispatchResponse, GetResponse, HealthResponse, StateRequest, StatsResponse,
};
use crate::prefetch::Prefetcher;
use crate::retry::RetryExecutor;

/// Application state shared across all handlers.
///
/// Every field is a cheap handle onto shared state, so cloning per request
/// is fine.
#[derive(Clone)]
pub struct AppState {
    /// Retry executor; its cache is the general-purpose cache
    pub executor: RetryExecutor<Value>,
    /// Prefetcher with its own long-TTL cache
    pub prefetcher: Prefetcher<Value>,
    pub coordinator: Arc<EpicCoordinator<UiState>>,
}

impl AppState {
    pub fn new(
        executor: RetryExecutor<Value>,
        prefetcher: Prefetcher<Value>,
        coordinator: EpicCoordinator<UiState>,
    ) -> Self {
        Self {
            executor,
            prefetcher,
            coordinator: Arc::new(coordinator),
        }
    }

    /// Builds every component from `config` and starts the banking epics
    /// against `backend`. Must be called inside a tokio runtime.
    pub fn from_config(config: &Config, backend: Arc<dyn Backend>) -> Self {
        let executor = RetryExecutor::new(config.retry());
        let prefetcher = Prefetcher::new(config.prefetch());
        let coordinator = EpicCoordinator::new(config.initial_state());

        let ctx = EpicContext {
            backend,
            executor: executor.clone(),
            prefetcher: prefetcher.clone(),
            settings: config.epics(),
        };
        coordinator.run(combine_epics(banking_epics(ctx)));

        Self::new(executor, prefetcher, coordinator)
    }

    pub fn cache(&self) -> &SharedCache<Value> {
        self.executor.cache()
    }

    /// Stops the epics, cancels pending retries and drops queued prefetches.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.executor.shutdown();
        self.prefetcher.clear_queue();
        info!("application state shut down");
    }
}

async fn lookup(cache: &SharedCache<Value>, key: &str, source: &'static str) -> Option<GetResponse> {
    let cache = cache.read().await;
    cache
        .entry(key)
        .filter(|entry| !entry.is_expired())
        .map(|entry| GetResponse::new(key, source, entry))
}

/// Handler for GET /cache/:key
///
/// Looks in the general cache first, then the prefetch cache. Does not
/// count as a hit or miss.
pub async fn get_cache_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    if let Some(found) = lookup(state.cache(), &key, "cache").await {
        return Ok(Json(found));
    }
    if let Some(found) = lookup(state.prefetcher.cache(), &key, "prefetch").await {
        return Ok(Json(found));
    }
    Err(CacheError::NotFound(key))
}

/// Handler for DELETE /cache/:key
pub async fn delete_cache_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let removed = state.cache().write().await.remove(&key);
    let removed_prefetched = state.prefetcher.cache().write().await.remove(&key);

    if !(removed || removed_prefetched) {
        return Err(CacheError::NotFound(key));
    }
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /cache?pattern=...
///
/// Without a pattern both caches are emptied.
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Json<ClearResponse> {
    let pattern = query.pattern.filter(|p| !p.is_empty());
    let mut removed = state.cache().write().await.clear(pattern.as_deref());
    removed += state
        .prefetcher
        .cache()
        .write()
        .await
        .clear(pattern.as_deref());

    info!(pattern = ?pattern, removed, "cache cleared");
    Json(ClearResponse { pattern, removed })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache().read().await.stats();
    let prefetch = state.prefetcher.get_prefetch_stats().await;

    Json(StatsResponse::new(
        cache,
        prefetch,
        state.executor.stats(),
        state.coordinator.running_epics(),
    ))
}

/// Handler for POST /actions
pub async fn dispatch_handler(
    State(state): State<AppState>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let action = req.into_action();
    let kind = action.kind.clone();
    let receivers = state.coordinator.dispatch(action);

    Ok(Json(DispatchResponse { kind, receivers }))
}

/// Handler for GET /actions
pub async fn actions_handler(State(state): State<AppState>) -> Json<ActionsResponse> {
    Json(ActionsResponse::new(state.coordinator.recent_actions()))
}

/// Handler for GET /state
pub async fn get_state_handler(State(state): State<AppState>) -> Json<UiState> {
    Json(state.coordinator.state())
}

/// Handler for PUT /state
pub async fn put_state_handler(
    State(state): State<AppState>,
    Json(req): Json<StateRequest>,
) -> Result<Json<UiState>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.coordinator.update_state(|ui| req.apply(ui));
    Ok(Json(state.coordinator.state()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
