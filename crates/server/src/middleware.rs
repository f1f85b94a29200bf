use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::routes::ingest::X_MESSAGE_ID;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Longest client-supplied request id we echo back.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn inbound_request_id(request: &Request) -> Option<String> {
    let raw = request.headers().get(X_REQUEST_ID)?.to_str().ok()?.trim();
    (!raw.is_empty() && raw.len() <= MAX_REQUEST_ID_LEN).then(|| raw.to_string())
}

/// Reuses the caller's `x-request-id` when it is sane, otherwise mints one,
/// and echoes it on the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = inbound_request_id(&request).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// One completion event per request. Ingest responses also carry the
/// message id so access logs join against `ingest_success`/`ingest_failure`.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;

    let message_id = response
        .headers()
        .get(X_MESSAGE_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        request_id,
        message_id,
        "http_request"
    );

    response
}
