use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glimpse_stories::{
    AdminGate, AdminSession, AppState, Config, ExpirySweeper, FfprobeDurationProbe,
    HttpAuthProvider, HttpModeratorRelay, MediaIngest, ReactionLog, StoryStore, SystemClock,
    ViewTracker, ViewedSet,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        retention_hours = config.stories.retention_hours,
        "Starting Glimpse Stories Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let clock = Arc::new(SystemClock);
    let store = Arc::new(StoryStore::new(config.retention()));

    let provider = Arc::new(
        HttpAuthProvider::new(&config.auth)
            .context("Failed to initialize authorization provider client")?,
    );
    let gate = Arc::new(AdminGate::new(
        provider,
        clock.clone(),
        config.auth.chat_id.clone(),
    ));
    let session = Arc::new(AdminSession::new());

    let probe = Arc::new(FfprobeDurationProbe::new(config.probe_timeout()));
    let ingest = Arc::new(MediaIngest::new(
        store.clone(),
        probe,
        clock.clone(),
        config.max_video_duration_secs(),
    ));

    let views = Arc::new(ViewTracker::new(store.clone()));

    let relay = Arc::new(
        HttpModeratorRelay::new(&config.relay)
            .context("Failed to initialize moderator relay client")?,
    );
    let reactions = Arc::new(ReactionLog::new(store.clone(), relay));

    let sweeper = Arc::new(ExpirySweeper::new(
        store.clone(),
        clock,
        config.sweep_interval(),
    ));

    // Spawn the expiry sweeper task
    let shutdown = CancellationToken::new();
    let sweeper_handle = tokio::spawn({
        let sweeper = sweeper.clone();
        let shutdown = shutdown.clone();
        async move { sweeper.run(shutdown).await }
    });

    // Spawn the API server task
    let api_state = AppState {
        store,
        ingest,
        views,
        reactions,
        gate,
        session,
        viewed: Arc::new(parking_lot::Mutex::new(ViewedSet::new())),
    };
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = glimpse_stories::start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Stories service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down stories service");

    shutdown.cancel();
    let _ = sweeper_handle.await;
    api_handle.abort();

    info!("Stories service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
