//! Metrics and health HTTP endpoint

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use lvbridge_csi::ReadinessChecker;
use lvbridge_node::CapacityMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<CapacityMetrics>,
    pub readiness: Arc<ReadinessChecker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.export_prometheus(),
    )
}

/// Process is up
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.readiness.ready() {
        (true, _) => (StatusCode::OK, "OK".to_string()),
        (false, Some(err)) => (StatusCode::SERVICE_UNAVAILABLE, format!("NOT READY: {err}")),
        (false, None) => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY".to_string()),
    }
}

/// Bind the listener up front so an unusable address fails startup
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics listener on {addr}"))?;
    info!("Metrics available at http://{}/metrics", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}
