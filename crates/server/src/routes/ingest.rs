//! Event intake endpoints.
//!
//! The handler only adapts HTTP to [`ingest::IngestRequest`]. The body is
//! read lazily by the router, and the router runs on its own task so a
//! client disconnect cannot cut finalization short.
//!
//! Intake is not under the server-wide timeout layer: a deadline here must
//! never surface as a retryable status. When the router outlives the
//! configured timeout the caller gets `200 {"ok":true}` and the task keeps
//! running; a later delivery failure still reaches the dead letter.
use crate::state::ServerState;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::header::VARY;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingest::{BodyReadError, IngestRequest, IngestResponse, IngestType};
use std::net::SocketAddr;
use std::sync::Arc;

pub const X_MESSAGE_ID: &str = "x-message-id";

/// Response extension marking a synchronous destination result; only these
/// responses are eligible for compression.
#[derive(Debug, Clone, Copy)]
pub struct SyncResultBody;

/// POST /api/s/{tp}
pub async fn ingest_browser(
    State(state): State<Arc<ServerState>>,
    Path(tp): Path<String>,
    request: Request,
) -> Response {
    ingest(state, IngestType::Browser, tp, request).await
}

/// POST /api/s/s2s/{tp}
pub async fn ingest_s2s(
    State(state): State<Arc<ServerState>>,
    Path(tp): Path<String>,
    request: Request,
) -> Response {
    ingest(state, IngestType::S2S, tp, request).await
}

async fn ingest(
    state: Arc<ServerState>,
    ingest_type: IngestType,
    tracking_path: String,
    request: Request,
) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = request.into_parts();

    let mut req = IngestRequest::new(
        ingest_type,
        tracking_path,
        parts.headers,
        read_body(body, state.config.max_body_size()),
    );
    if let Some(addr) = remote_addr {
        req = req.with_remote_addr(addr);
    }

    let router = Arc::clone(&state.router);
    let task = tokio::spawn(async move { router.handle(req).await });
    match tokio::time::timeout(state.config.timeout(), task).await {
        Ok(Ok(response)) => into_http(response),
        Err(_) => {
            tracing::warn!(
                timeout_secs = state.config.timeout_secs,
                "ingest_response_deadline"
            );
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "ingest task failed");
            let body = Json(serde_json::json!({
                "ok": false,
                "error": { "code": "INTERNAL_FAULT", "message": "internal fault" },
            }));
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

async fn read_body(body: Body, limit: usize) -> Result<bytes::Bytes, BodyReadError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| BodyReadError(e.to_string()))
}

fn into_http(resp: IngestResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let compressible = resp.is_compressible();

    let mut response = (status, Json(resp.body.to_json())).into_response();
    if compressible {
        response.extensions_mut().insert(SyncResultBody);
        response
            .headers_mut()
            .insert(VARY, HeaderValue::from_static("accept-encoding"));
    }
    if let Some(id) = resp.message_id.as_deref() {
        if let Ok(value) = HeaderValue::from_str(id) {
            response.headers_mut().insert(X_MESSAGE_ID, value);
        }
    }
    response
}
