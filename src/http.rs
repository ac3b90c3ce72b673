//! Health, readiness, and metrics endpoints, served on one axum router
//! alongside the reconcile loop. `/healthz` is always 200 once the
//! process is up; `/readyz` reflects whether the registry has synced
//! at least once; `/metrics` renders the Prometheus registry.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use tokio::sync::{watch, RwLock};
use tracing::info;

use crate::metrics;

#[derive(Debug, Default)]
pub struct ReadinessState {
    synced: RwLock<bool>,
}

impl ReadinessState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn mark_synced(&self) {
        *self.synced.write().await = true;
    }

    async fn is_ready(&self) -> bool {
        *self.synced.read().await
    }
}

pub fn build_router(readiness: Arc<ReadinessState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { (StatusCode::OK, "OK") }))
        .route(
            "/readyz",
            get({
                let readiness = readiness.clone();
                move || ready_handler(readiness.clone())
            }),
        )
}

pub async fn start_http_server(
    readiness: Arc<ReadinessState>,
    mut shutdown: watch::Receiver<bool>,
    addr: SocketAddr,
) -> Result<()> {
    let app = build_router(readiness);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP server on {addr}"))?;

    info!(addr = %addr, "http_server_started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}

async fn ready_handler(readiness: Arc<ReadinessState>) -> impl IntoResponse {
    if readiness.is_ready().await {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::OK, metrics::render())
}
