//! The ingest pipeline: one request in, one response and one terminal
//! classification out.
//!
//! ```text
//! content type ─► body ─► decode ─► messageId ─► locate ─► stream
//!      ─► build ─► destinations? ─► async fan-out ─► sync destinations
//!                                                         │
//!                         finalize (every exit path) ◄────┘
//! ```
//!
//! Finalization backs the payload up, posts an activity entry, increments a
//! counter and dead-letters true errors. It runs after classified errors and
//! after panics intercepted at the boundary alike.
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use futures::FutureExt;
use schema::SchemaRegistry;
use serde_json::{json, Map, Value};
use tracing::{error, field, info, warn, Instrument, Span};

use crate::config::{ConfigError, RouterConfig};
use crate::dispatch;
use crate::error::{IngestError, Outcome};
use crate::locator::StreamResolver;
use crate::memory::{TagSyncExecutor, TracingActivityLog, TracingBackup};
use crate::message::{build_message, derive_message_id, BuildContext};
use crate::metadata;
use crate::metrics::{
    IngestMetrics, NoopMetrics, STATUS_ERROR, STATUS_SKIPPED, STATUS_SUCCESS, STATUS_THROTTLED,
};
use crate::sink::{
    ActivityEntry, ActivityLevel, ActivityLog, ActivityStatus, BackupSink, Producer, SyncExecutor,
};
use crate::types::{IngestRequest, StreamLocator};

/// Backup and activity-log key for requests that never resolved a stream.
pub const UNKNOWN_STREAM: &str = "UNKNOWN";

/// Header on dead-letter records carrying the full error text.
pub const DEAD_LETTER_ERROR_HEADER: &str = "error";

const NO_DESTINATIONS_REASON: &str = "no destinations found for stream";

/// Response payload, independent of the HTTP framework.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `{"ok":true}`
    Ok,
    /// Combined synchronous destination result.
    SyncResult(Value),
    /// `{"ok":false,"error":{"code":..,"message":..}}`
    Error { code: &'static str, message: String },
}

impl ResponseBody {
    pub fn to_json(&self) -> Value {
        match self {
            ResponseBody::Ok => json!({ "ok": true }),
            ResponseBody::SyncResult(v) => v.clone(),
            ResponseBody::Error { code, message } => json!({
                "ok": false,
                "error": { "code": code, "message": message },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestResponse {
    pub status: u16,
    pub body: ResponseBody,
    pub outcome: Outcome,
    /// Set once the body was decoded.
    pub message_id: Option<String>,
}

impl IngestResponse {
    fn new(result: &Result<Option<Value>, IngestError>, message_id: Option<String>) -> Self {
        let (status, body, outcome) = match result {
            Ok(None) => (200, ResponseBody::Ok, Outcome::Delivered),
            Ok(Some(v)) => (200, ResponseBody::SyncResult(v.clone()), Outcome::Delivered),
            Err(err) => (
                err.status_code(),
                ResponseBody::Error {
                    code: err.outcome().code(),
                    message: err.public_message(),
                },
                err.outcome(),
            ),
        };
        Self {
            status,
            body,
            outcome,
            message_id,
        }
    }

    /// Only synchronous results are worth compressing.
    pub fn is_compressible(&self) -> bool {
        matches!(self.body, ResponseBody::SyncResult(_))
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Delivered
    }
}

/// Partial request data, visible to finalization whatever happened.
#[derive(Debug, Default)]
struct IngestContext {
    body: Bytes,
    message_bytes: Bytes,
    message_id: Option<String>,
    locator: Option<StreamLocator>,
    stream_id: Option<String>,
    async_destinations: Vec<String>,
    tag_destinations: Vec<String>,
}

impl IngestContext {
    /// Canonical bytes when built, else the raw body.
    fn bytes(&self) -> &Bytes {
        if self.message_bytes.is_empty() {
            &self.body
        } else {
            &self.message_bytes
        }
    }

    fn domain(&self) -> &str {
        self.locator
            .as_ref()
            .map(StreamLocator::metrics_domain)
            .unwrap_or("")
    }

    fn actor_id(&self) -> &str {
        self.stream_id.as_deref().unwrap_or(UNKNOWN_STREAM)
    }
}

/// Ingestion router. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct Router {
    resolver: Arc<dyn StreamResolver>,
    producer: Arc<dyn Producer>,
    sync_executor: Arc<dyn SyncExecutor>,
    backups: Arc<dyn BackupSink>,
    activity: Arc<dyn ActivityLog>,
    metrics: Arc<dyn IngestMetrics>,
    schemas: Option<Arc<SchemaRegistry>>,
    config: RouterConfig,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("schemas", &self.schemas.is_some())
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder(
        resolver: Arc<dyn StreamResolver>,
        producer: Arc<dyn Producer>,
    ) -> RouterBuilder {
        RouterBuilder {
            resolver,
            producer,
            sync_executor: Arc::new(TagSyncExecutor),
            backups: Arc::new(TracingBackup),
            activity: Arc::new(TracingActivityLog),
            metrics: Arc::new(NoopMetrics),
            schemas: None,
            config: RouterConfig::default(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn schemas(&self) -> Option<&Arc<SchemaRegistry>> {
        self.schemas.as_ref()
    }

    /// Handles one request. Never fails and never panics outward; every
    /// problem is folded into the returned response.
    pub async fn handle(&self, req: IngestRequest) -> IngestResponse {
        let span = tracing::info_span!(
            "ingest.handle",
            ingest_type = req.ingest_type.as_str(),
            tracking_path = %req.tracking_path,
            message_id = field::Empty,
        );
        self.handle_in_span(req).instrument(span).await
    }

    async fn handle_in_span(&self, req: IngestRequest) -> IngestResponse {
        let start = Instant::now();
        let mut ctx = IngestContext::default();

        let result = match AssertUnwindSafe(self.process(&mut ctx, req))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(panic = %detail, "ingest_panic");
                Err(IngestError::InternalFault(detail))
            }
        };

        self.finalize(&ctx, result.as_ref().err()).await;

        let elapsed_micros = start.elapsed().as_micros() as u64;
        let response = IngestResponse::new(&result, ctx.message_id.clone());
        match &result {
            Ok(_) => info!(
                message_id = ctx.message_id.as_deref().unwrap_or_default(),
                stream_id = ctx.actor_id(),
                domain = ctx.domain(),
                outcome = %response.outcome,
                elapsed_micros,
                "ingest_success"
            ),
            Err(err) => warn!(
                message_id = ctx.message_id.as_deref().unwrap_or_default(),
                stream_id = ctx.actor_id(),
                domain = ctx.domain(),
                outcome = %response.outcome,
                error = %err,
                elapsed_micros,
                "ingest_failure"
            ),
        }
        response
    }

    async fn process(
        &self,
        ctx: &mut IngestContext,
        req: IngestRequest,
    ) -> Result<Option<Value>, IngestError> {
        let IngestRequest {
            ingest_type,
            tracking_path,
            headers,
            remote_addr,
            body,
        } = req;
        let received_at = Utc::now();

        let media_type = metadata::content_type(&headers);
        if !metadata::is_accepted_content_type(&media_type) {
            return Err(IngestError::InvalidContentType(media_type));
        }

        ctx.body = body.await.map_err(|e| {
            let ip = metadata::client_ip(&headers, remote_addr).unwrap_or_default();
            IngestError::BodyRead(format!("Client Ip: {ip}: {e}"))
        })?;

        let event: Value = serde_json::from_slice(&ctx.body).map_err(|e| {
            IngestError::Parse(format!("{e}: {}", String::from_utf8_lossy(&ctx.body)))
        })?;

        let message_id = derive_message_id(&event, self.config.max_message_id_len);
        Span::current().record("message_id", message_id.as_str());
        ctx.message_id = Some(message_id.clone());

        let locator = self
            .resolver
            .locate(ingest_type, &headers, &event)
            .await
            .map_err(|e| {
                IngestError::Locator(format!("{e}: {}", String::from_utf8_lossy(&ctx.body)))
            })?;
        ctx.locator = Some(locator.clone());

        let stream = self
            .resolver
            .stream(&locator)
            .ok_or_else(|| IngestError::StreamNotFound(format!("for: {locator}")))?;
        ctx.stream_id = Some(stream.id.clone());

        let build = BuildContext {
            ingest_type,
            message_id: &message_id,
            tracking_path: &tracking_path,
            locator: &locator,
            stream: &stream,
            headers: &headers,
            remote_addr,
            received_at,
        };
        let (message, bytes) = build_message(&build, event)?;
        ctx.message_bytes = bytes.clone();

        if !stream.has_destinations() {
            return Err(IngestError::NoDestination(stream.id.clone()));
        }

        if let (Some(schemas), Value::Object(payload)) = (&self.schemas, &message.http_payload) {
            schemas.observe(&stream.id, payload);
        }

        ctx.async_destinations = stream
            .async_destinations
            .iter()
            .map(|d| d.id.clone())
            .collect();
        ctx.tag_destinations = stream
            .sync_destinations
            .iter()
            .map(|d| d.id.clone())
            .collect();

        if !stream.async_destinations.is_empty() {
            dispatch::publish_async(
                self.producer.as_ref(),
                &self.config.destinations_topic,
                &stream,
                &message_id,
                &bytes,
            )
            .await?;
        }

        if stream.sync_destinations.is_empty() {
            return Ok(None);
        }
        dispatch::execute_sync(self.sync_executor.as_ref(), &message, &stream).await
    }

    /// Side effects for every exit path. Each one is independent and
    /// best-effort; failures are logged and dropped.
    async fn finalize(&self, ctx: &IngestContext, err: Option<&IngestError>) {
        let bytes = ctx.bytes();
        let actor_id = ctx.actor_id();
        let domain = ctx.domain();

        if !bytes.is_empty() {
            if let Err(e) = self.backups.log(actor_id, bytes).await {
                warn!(error = %e, stream_id = actor_id, "backup_failed");
            }
        }

        let body = String::from_utf8_lossy(bytes).into_owned();
        match err {
            Some(err) if err.is_dead_lettered() => {
                let (status, counter) = if err.is_throttled() {
                    (ActivityStatus::Skipped, STATUS_THROTTLED)
                } else {
                    (ActivityStatus::Failed, STATUS_ERROR)
                };
                let event = json!({
                    "body": body,
                    "error": err.public_message(),
                    "status": status.as_str(),
                });
                self.post_activity(ActivityEntry::incoming(ActivityLevel::Error, actor_id, event))
                    .await;
                self.metrics.request(domain, counter, err.outcome().as_str());
                if !bytes.is_empty() {
                    self.dead_letter(bytes, err).await;
                }
            }
            _ => {
                let mut event = Map::new();
                event.insert("body".into(), Value::String(body));
                event.insert("asyncDestinations".into(), json!(ctx.async_destinations));
                event.insert("tags".into(), json!(ctx.tag_destinations));
                if ctx.async_destinations.is_empty() && ctx.tag_destinations.is_empty() {
                    event.insert("status".into(), ActivityStatus::Skipped.as_str().into());
                    event.insert("error".into(), NO_DESTINATIONS_REASON.into());
                } else {
                    event.insert("status".into(), ActivityStatus::Success.as_str().into());
                }
                self.post_activity(ActivityEntry::incoming(
                    ActivityLevel::Info,
                    actor_id,
                    Value::Object(event),
                ))
                .await;
                match err {
                    Some(skip) => self.metrics.request(domain, STATUS_SKIPPED, skip.outcome().as_str()),
                    None => self.metrics.request(domain, STATUS_SUCCESS, ""),
                }
            }
        }
    }

    async fn post_activity(&self, entry: ActivityEntry) {
        let actor_id = entry.actor_id.clone();
        if let Err(e) = self.activity.post(entry).await {
            warn!(error = %e, stream_id = %actor_id, "activity_log_failed");
        }
    }

    async fn dead_letter(&self, bytes: &Bytes, err: &IngestError) {
        let key = uuid::Uuid::new_v4().to_string();
        let detail = err.to_string();
        let headers = [(DEAD_LETTER_ERROR_HEADER, detail.as_str())];
        if let Err(e) = self
            .producer
            .produce(&self.config.dead_letter_topic, &key, bytes.clone(), &headers)
            .await
        {
            warn!(error = %e, topic = %self.config.dead_letter_topic, "dead_letter_failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Assembles a [`Router`]. Collaborators default to in-process
/// implementations that only log.
pub struct RouterBuilder {
    resolver: Arc<dyn StreamResolver>,
    producer: Arc<dyn Producer>,
    sync_executor: Arc<dyn SyncExecutor>,
    backups: Arc<dyn BackupSink>,
    activity: Arc<dyn ActivityLog>,
    metrics: Arc<dyn IngestMetrics>,
    schemas: Option<Arc<SchemaRegistry>>,
    config: RouterConfig,
}

impl RouterBuilder {
    pub fn sync_executor(mut self, executor: Arc<dyn SyncExecutor>) -> Self {
        self.sync_executor = executor;
        self
    }

    pub fn backups(mut self, backups: Arc<dyn BackupSink>) -> Self {
        self.backups = backups;
        self
    }

    pub fn activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn IngestMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Feeds every routed event payload into `schemas`, one table per stream.
    pub fn schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Router, ConfigError> {
        self.config.validate()?;
        Ok(Router {
            resolver: self.resolver,
            producer: self.producer,
            sync_executor: self.sync_executor,
            backups: self.backups,
            activity: self.activity,
            metrics: self.metrics,
            schemas: self.schemas,
            config: self.config,
        })
    }
}
