//! # Crossdata Analytics API Server
//!
//! Binary entry point for the analytics HTTP service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crossdata_api::config::{DataBackend, DataConfig};
use crossdata_api::{build_router, AppState, Config};
use crossdata_storage::{DatasetSource, ObjectStoreSource, TimeoutSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    tracing::info!(
        version = crossdata_api::VERSION,
        "Starting Crossdata Analytics API"
    );

    let store = open_store(&config.data)?;
    let source: Arc<dyn DatasetSource> = Arc::new(TimeoutSource::new(store, config.load_timeout));

    tracing::info!(
        tables = source.catalog().iter().count(),
        timeout_ms = u64::try_from(config.load_timeout.as_millis()).unwrap_or(u64::MAX),
        "Dataset source ready"
    );

    // Build router
    let app = build_router(AppState::new(source), &config.cors_origins);

    // Start server
    let addr = config.server_addr;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

fn open_store(data: &DataConfig) -> anyhow::Result<ObjectStoreSource> {
    match data.backend {
        DataBackend::Local => {
            tracing::info!(root = %data.root.display(), "Reading tables from local directory");
            Ok(ObjectStoreSource::local(&data.root)?)
        }
        #[cfg(feature = "s3")]
        DataBackend::S3 => {
            tracing::info!(bucket = %data.bucket, region = %data.region, "Reading tables from S3");
            Ok(ObjectStoreSource::s3(&data.bucket, &data.region)?)
        }
        #[cfg(not(feature = "s3"))]
        DataBackend::S3 => anyhow::bail!(
            "DATA_BACKEND=s3 requires building with the `s3` feature (bucket {})",
            data.bucket
        ),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
