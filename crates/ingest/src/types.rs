//! Core data model: requests, stream configuration, canonical messages.
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BodyReadError;

/// Which endpoint shape the request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestType {
    /// Server-to-server (`/api/s/s2s/{tp}`).
    #[serde(rename = "s2s")]
    S2S,
    /// Browser or other client (`/api/s/{tp}`).
    #[serde(rename = "browser")]
    Browser,
}

impl IngestType {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestType::S2S => "s2s",
            IngestType::Browser => "browser",
        }
    }
}

/// Pending request body. Read by the router after the content-type gate.
pub type BodyFuture = BoxFuture<'static, Result<Bytes, BodyReadError>>;

/// One raw inbound HTTP request, framework-agnostic.
pub struct IngestRequest {
    pub ingest_type: IngestType,
    /// Tracking-token path segment, e.g. `track` or `page`.
    pub tracking_path: String,
    pub headers: HeaderMap,
    /// Socket peer address; last resort of the client IP chain.
    pub remote_addr: Option<IpAddr>,
    pub body: BodyFuture,
}

impl IngestRequest {
    pub fn new<F>(
        ingest_type: IngestType,
        tracking_path: impl Into<String>,
        headers: HeaderMap,
        body: F,
    ) -> Self
    where
        F: Future<Output = Result<Bytes, BodyReadError>> + Send + 'static,
    {
        Self {
            ingest_type,
            tracking_path: tracking_path.into(),
            headers,
            remote_addr: None,
            body: body.boxed(),
        }
    }

    /// Request whose body is already in memory.
    pub fn from_bytes(
        ingest_type: IngestType,
        tracking_path: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        Self::new(ingest_type, tracking_path, headers, async move { Ok(body) })
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl std::fmt::Debug for IngestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestRequest")
            .field("ingest_type", &self.ingest_type)
            .field("tracking_path", &self.tracking_path)
            .field("headers", &self.headers)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Resolved tenant + stream identity. Produced once per request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_key: Option<String>,
    /// Set when the resolver could map the identity to a stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

impl StreamLocator {
    /// Tenant label used for metrics: slug, else domain, else empty.
    pub fn metrics_domain(&self) -> &str {
        self.slug
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.domain.as_deref())
            .unwrap_or("")
    }
}

impl std::fmt::Display for StreamLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(d) = &self.domain {
            parts.push(format!("domain={d}"));
        }
        if let Some(s) = &self.slug {
            parts.push(format!("slug={s}"));
        }
        if let Some(k) = &self.write_key {
            // Only the key id, never the secret.
            let id = k.split(':').next().unwrap_or_default();
            parts.push(format!("writeKey={id}"));
        }
        if let Some(id) = &self.stream_id {
            parts.push(format!("streamId={id}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Fire-and-forget destination fed through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncDestination {
    pub id: String,
    #[serde(default)]
    pub destination_type: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Synchronous ("tag") destination executed inline; may return data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDestination {
    pub id: String,
    #[serde(default)]
    pub destination_type: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// A configured tenant stream and its destinations.
///
/// Owned by the configuration store; the router only borrows a read-only
/// snapshot per request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub browser_keys: Vec<String>,
    #[serde(default)]
    pub server_keys: Vec<String>,
    #[serde(default)]
    pub async_destinations: Vec<AsyncDestination>,
    #[serde(default)]
    pub sync_destinations: Vec<SyncDestination>,
}

impl StreamConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn has_destinations(&self) -> bool {
        !self.async_destinations.is_empty() || !self.sync_destinations.is_empty()
    }
}

pub type SharedStream = Arc<StreamConfig>;

/// Where the event came from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// The enriched event; the unit delivered to the broker and to synchronous
/// destinations. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMessage {
    pub ingest_type: IngestType,
    pub message_created: DateTime<Utc>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_key: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub origin: Origin,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_ip: Option<String>,
    /// The original event, top-level key order preserved.
    pub http_payload: Value,
}
