use crate::error::{ServerError, ServerResult};
use crate::state::{ServerMetadata, ServerState};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Health check endpoint (liveness)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "evgate-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let metadata = ServerMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(),
        streams: state.config.streams.len(),
        tables: state.schemas.len(),
    };

    Json(json!({
        "status": "ready",
        "service": "evgate-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "metadata": metadata,
        "components": {
            "router": "ready",
            "destinations_topic": state.router.config().destinations_topic,
            "dead_letter_topic": state.router.config().dead_letter_topic,
        }
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    if !state.config.metrics_enabled {
        return Err(ServerError::MetricsDisabled);
    }
    Ok((
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    ))
}
