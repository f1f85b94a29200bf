//! Message id derivation and canonical message construction.
use std::net::IpAddr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::ORIGIN;
use http::HeaderMap;
use serde_json::{Map, Value};

use crate::error::IngestError;
use crate::metadata::{client_ip, forwarded_headers};
use crate::types::{CanonicalMessage, IngestType, Origin, StreamConfig, StreamLocator};

/// Characters allowed in a caller-supplied message id.
fn is_allowed_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Replaces disallowed characters with `_` and truncates to `max_len` chars.
pub fn sanitize_message_id(raw: &str, max_len: usize) -> String {
    raw.chars()
        .map(|c| if is_allowed_id_char(c) { c } else { '_' })
        .take(max_len)
        .collect()
}

/// The event's `messageId` when it is a non-empty string, sanitized;
/// otherwise a fresh UUID.
pub fn derive_message_id(event: &Value, max_len: usize) -> String {
    match event.get("messageId").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => sanitize_message_id(id, max_len),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

/// Everything the builder needs, borrowed from the request pipeline.
#[derive(Debug)]
pub struct BuildContext<'a> {
    pub ingest_type: IngestType,
    pub message_id: &'a str,
    pub tracking_path: &'a str,
    pub locator: &'a StreamLocator,
    pub stream: &'a StreamConfig,
    pub headers: &'a HeaderMap,
    pub remote_addr: Option<IpAddr>,
    pub received_at: DateTime<Utc>,
}

/// Enriches `event` into the stream's wire format and serializes it.
///
/// Fails when the event is not a JSON object.
pub fn build_message(
    ctx: &BuildContext<'_>,
    event: Value,
) -> Result<(CanonicalMessage, Bytes), IngestError> {
    let payload: Map<String, Value> = match event {
        Value::Object(map) => map,
        other => {
            return Err(IngestError::Build(format!(
                "event must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(ctx.tracking_path)
        .to_string();

    let origin = Origin {
        base_url: ctx
            .headers
            .get(ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        slug: ctx.locator.slug.clone(),
        source_id: ctx.stream.id.clone(),
        source_name: ctx.stream.name.clone(),
        domain: ctx.locator.domain.clone(),
    };

    let message = CanonicalMessage {
        ingest_type: ctx.ingest_type,
        message_created: ctx.received_at,
        message_id: ctx.message_id.to_string(),
        write_key: ctx.locator.write_key.clone(),
        event_type,
        origin,
        http_headers: forwarded_headers(ctx.headers),
        request_ip: client_ip(ctx.headers, ctx.remote_addr),
        http_payload: Value::Object(payload),
    };

    let bytes = serde_json::to_vec(&message)
        .map_err(|e| IngestError::Build(format!("serializing message: {e}")))?;
    Ok((message, Bytes::from(bytes)))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
