//! API route handlers
//!
//! - `ingest`: event intake for browser and server-to-server clients
//! - `health`: health checks, readiness, and metrics
//! - `schema`: inferred table schemas

pub mod health;
pub mod ingest;
pub mod schema;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Service name and available endpoints (GET /).
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "evgate",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /api/s/{tp}",
            "POST /api/s/s2s/{tp}",
            "GET /api/schema",
            "GET /api/schema/{table}",
            "GET /health",
            "GET /ready",
            "GET /metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
