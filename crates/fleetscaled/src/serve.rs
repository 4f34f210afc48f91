//! `fleetscaled serve`: wire every subsystem and run until Ctrl-C.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use fleetscale_api::{ApiState, build_router};
use fleetscale_core::FleetscaleConfig;
use fleetscale_policy::{DecisionEngine, PolicyRegistry};
use fleetscale_reconcile::{Fleets, Ticker};
use fleetscale_state::StateStore;
use fleetscale_telemetry::{MetricsRegistry, MetricsReporter};

pub async fn run(config_path: &Path, port: Option<u16>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = FleetscaleConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.server.data_dir = data_dir;
    }

    info!(
        fleets = config.fleets.len(),
        provider = ?config.provider.kind,
        "fleetscale daemon starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("fleetscale.redb");
    let store = StateStore::open(&db_path)?.with_history_limit(config.server.history_limit);
    info!(path = ?db_path, history_limit = config.server.history_limit, "state store opened");

    let registry = PolicyRegistry::from_config(&config.policies)?;
    let engine = DecisionEngine::new(registry);
    info!(policies = ?engine.policies(), default = %config.policies.default, "policies registered");

    let metrics = MetricsRegistry::new();
    let reporter = MetricsReporter::new(Arc::new(metrics.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let fleets = Fleets::from_config(&config, &engine, &reporter, &store, &shutdown_rx)?;
    info!(fleets = ?fleets.names(), "fleet controllers ready");

    // ── Start background tasks ─────────────────────────────────

    let ticker_handle = if config.server.tick_interval_secs > 0 {
        let ticker = Ticker::new(
            fleets.clone(),
            Duration::from_secs(config.server.tick_interval_secs),
        );
        let ticker_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            ticker.run(ticker_shutdown).await;
        }))
    } else {
        info!("autoscale ticker disabled");
        None
    };

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        fleets,
        engine,
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Some(handle) = ticker_handle {
        let _ = handle.await;
    }

    info!("fleetscale daemon stopped");
    Ok(())
}
