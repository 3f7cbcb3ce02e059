//! Metrics HTTP server
//!
//! Exposes the monitor's snapshot as JSON for dashboards and scrapers.

use axum::{extract::State, routing::get, Json, Router};
use thiserror::Error;
use tracing::info;

use crate::metrics::{collect_system_metrics, unix_ms_now, MetricsSnapshot, SharedMetrics};

/// Errors that can occur when running the metrics server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /metrics
async fn get_metrics(State(metrics): State<SharedMetrics>) -> Json<MetricsSnapshot> {
    let snapshot = metrics.read().await.clone();
    Json(snapshot)
}

/// Creates the axum Router with metrics endpoint
pub fn create_metrics_router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(metrics)
}

/// Refresh the system section of the snapshot.
pub async fn refresh_system_metrics(metrics: &SharedMetrics) {
    let system = tokio::task::spawn_blocking(collect_system_metrics)
        .await
        .unwrap_or_default();
    let mut snapshot = metrics.write().await;
    snapshot.system = system;
    snapshot.timestamp_unix_ms = unix_ms_now();
}

/// Serve the metrics router on `bind` until the task is dropped.
pub async fn run_metrics_server(metrics: SharedMetrics, bind: &str) -> Result<(), ServerError> {
    let app = create_metrics_router(metrics);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind = %bind, "metrics server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
