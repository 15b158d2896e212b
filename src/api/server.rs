use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{download_artifact, get_job, health, job_file, submit_job},
    state::AppState,
};
use crate::config::Config;
use crate::engine::{ExtractionEngine, YtDlpEngine};
use crate::jobs::{JobRegistry, JobRunner, RetryPolicy};
use crate::observability::Metrics;
use crate::storage::ArtifactStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP router over shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/file", get(job_file))
        .route("/download/{job_id}/{filename}", get(download_artifact))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Run the service until a shutdown signal arrives
///
/// `address` overrides `server.bind_addr` from the configuration.
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let store = ArtifactStore::new(&config.storage.root);
    info!(root = %store.root().display(), "Preparing storage root");
    store
        .init()
        .await
        .map_err(|e| format!("Failed to prepare storage root: {}", e))?;

    let registry = Arc::new(JobRegistry::new(
        store,
        config.retention.job_ttl.as_duration(),
    ));
    let engine: Arc<dyn ExtractionEngine> = Arc::new(YtDlpEngine::from_config(&config.engine));

    let runner = JobRunner::builder()
        .registry(registry)
        .engine(engine)
        .retry(RetryPolicy::from(&config.runner))
        .max_concurrent_jobs(config.runner.max_concurrent_jobs)
        .metrics(Arc::new(Metrics::new()))
        .build();
    runner.start_sweeper(config.retention.sweep_interval.as_duration());

    info!(
        job_ttl = %config.retention.job_ttl,
        max_concurrent_jobs = config.runner.max_concurrent_jobs,
        max_attempts = config.runner.max_attempts,
        "Job runner started"
    );

    let state = AppState::new(config, runner.clone())
        .map_err(|e| format!("Invalid server.public_base_url: {}", e))?;
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "MediaBox API listening");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    runner.shutdown().await;
    served?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
