//! Ingest Server
//!
//! Accepts large camera-media uploads from browsers and routes them by format:
//! RAW footage into an S3-compatible bucket, delivery formats to the media platform.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ingest_server::config::Config;
use ingest_server::routes;
use ingest_server::state::AppState;
use ingest_server::storage::{MultipartManager, S3Client};
use ingest_server::stream::{RelayUploader, StreamClient};
use ingest_server::upload::{FsSessionStore, Reaper, SessionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ingest_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Ingest Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("S3 endpoint: {}", config.storage.endpoint);
    tracing::info!("S3 bucket: {}", config.storage.bucket);
    tracing::info!("Upload temp dir: {}", config.upload.temp_dir.display());

    // Object store for RAW footage
    let s3_client = S3Client::new(&config.storage, config.timeouts);
    s3_client.verify_bucket().await;
    let multipart = MultipartManager::new(Arc::new(s3_client));

    // Media platform for delivery formats
    let stream = StreamClient::new(&config.stream, config.timeouts)
        .context("Failed to initialize media platform client")?;
    if !stream.is_configured() {
        tracing::warn!("Media platform credentials missing; stream routes will fail");
    }
    let relay = RelayUploader::new(Arc::new(stream.clone()), config.stream.max_duration_seconds);

    // Chunked sessions on local disk
    let store = FsSessionStore::open(&config.upload.temp_dir)
        .await
        .context("Failed to open upload session store")?;
    tokio::fs::create_dir_all(&config.upload.final_dir)
        .await
        .context("Failed to create final upload directory")?;
    let sessions = SessionManager::new(Arc::new(store), config.upload.max_upload_size);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = Reaper::new(
        sessions.clone(),
        config.upload.reap_max_age_hours,
        Duration::from_secs(config.upload.reap_interval_secs),
    )
    .start(shutdown_rx);

    let app_state = AppState::new(config.clone(), sessions, multipart, stream, relay);
    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid SERVER_HOST/SERVER_PORT")?;
    tracing::info!("Ingest Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        tracing::warn!("Reaper task ended abnormally: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
