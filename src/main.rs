//! Smart Cache daemon
//!
//! Runs the cache layer and the banking epics against an in-memory backend
//! and serves the diagnostics API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_cache::api::create_router;
use smart_cache::backend::InMemoryBackend;
use smart_cache::epic::kinds;
use smart_cache::{spawn_cleanup_task, spawn_prefetch_ticker, Action, AppState, Config};

/// Size of the seeded demo history
const DEMO_TRANSACTIONS: usize = 120;

/// Main entry point for the Smart Cache daemon.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build caches, retry executor, prefetcher and epic coordinator
/// 4. Start the TTL cleanup and prefetch tick tasks
/// 5. Warm the first extract pages through the prefetch queue
/// 6. Serve the diagnostics API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Smart Cache daemon");

    let config = Config::from_env();
    info!(
        cache_ttl_secs = config.cache_ttl_secs,
        prefetch_ttl_secs = config.prefetch_ttl_secs,
        max_retries = config.max_retries,
        port = config.server_port,
        cleanup_interval = config.cleanup_interval,
        "configuration loaded"
    );

    let backend = Arc::new(InMemoryBackend::seeded(&config.account_id, DEMO_TRANSACTIONS));
    let state = AppState::from_config(&config, backend);

    let tasks = vec![
        spawn_cleanup_task(state.cache().clone(), config.cleanup_every()),
        spawn_cleanup_task(state.prefetcher.cache().clone(), config.cleanup_every()),
        spawn_prefetch_ticker(state.prefetcher.clone()),
    ];
    info!(tasks = tasks.len(), "background tasks started");

    for (page, priority) in [(1, 10), (2, 5)] {
        state.coordinator.dispatch(Action::new(
            kinds::PREFETCH_REQUESTED,
            json!({ "page": page, "priority": priority }),
        ));
    }

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for task in tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
    state.shutdown();

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
