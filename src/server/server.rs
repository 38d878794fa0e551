use anyhow::{Context, Result};
use std::time::Duration;

use tracing::info;

use crate::health::{HealthSnapshot, HealthState};
use axum::{
    extract::State,
    http::{Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use super::{log_requests, metrics, RequestsLoggingLevel};

#[derive(Clone)]
pub struct ServerState {
    pub health: HealthState,
}

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    snapshot: HealthSnapshot,
    uptime: String,
}

pub fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn ping() -> &'static str {
    "pong"
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    Json(HealthResponse {
        uptime: format_uptime(state.health.uptime()),
        snapshot,
    })
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

pub fn make_app(health_state: HealthState, logging_level: RequestsLoggingLevel) -> Router {
    let state = ServerState {
        health: health_state,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(logging_level, log_requests))
        .layer(cors)
}

/// Serves the health listener until `shutdown` is cancelled.
pub async fn run_server(
    health: HealthState,
    port: u16,
    logging_level: RequestsLoggingLevel,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = make_app(health, logging_level);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind health listener on port {}", port))?;
    info!("Health listener on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Health listener failed")?;

    info!("Health listener stopped");
    Ok(())
}
