mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod scheduler;
mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::{SnapshotStore, SqliteStore};
use crate::error::Result;
use crate::fetcher::{HttpFetcher, MatchFetcher};
use crate::scheduler::LifecycleController;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup: the only collaborator whose failure is fatal ---
    let store = SqliteStore::open(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    let store: Arc<dyn SnapshotStore> = Arc::new(store);

    // --- Shared fetch handle, owned by the controller for its whole life ---
    let fetcher: Arc<dyn MatchFetcher> = Arc::new(HttpFetcher::new(cfg.fetch_timeout)?);

    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let controller = LifecycleController::new(
        cfg.clone(),
        Arc::clone(&store),
        fetcher,
        Arc::clone(&health),
        Arc::clone(&latency),
    );

    // --- HTTP API ---
    let api_state = ApiState {
        store,
        registry: Arc::clone(controller.registry()),
        health,
        latency,
    };
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    // --- Bootstrap discovery, then steady-state loops ---
    controller.start().await;
    info!(
        monitor = ?cfg.monitor_interval,
        poll = ?cfg.poll_interval,
        reconcile = ?cfg.reconcile_interval,
        "Tracker started. Ctrl+C to stop."
    );

    let stop = CancellationToken::new();
    let server = tokio::spawn({
        let stop = stop.clone();
        async move {
            axum::serve(listener, router(api_state))
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received");
    stop.cancel();
    controller.shutdown().await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("HTTP API exited with error: {e}"),
        Err(e) => warn!("HTTP API task failed: {e}"),
    }
    info!("Tracker stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler, Ctrl+C only: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
