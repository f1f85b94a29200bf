//! Event intake router.
//!
//! This is where events enter the gateway. A raw HTTP request goes in, and
//! exactly one response and one terminal classification come out, even
//! when a collaborator panics.
//!
//! ## What we do here
//!
//! - **Gate and decode** - JSON or plain-text bodies only, decoded with key
//!   order preserved
//! - **Identify** - derive a message id, resolve the sending stream through a
//!   [`StreamResolver`]
//! - **Canonicalize** - enrich the event into a [`CanonicalMessage`]
//! - **Fan out** - publish to every async destination concurrently, run sync
//!   destinations inline and return their combined result
//! - **Finalize** - back up the payload, post an activity entry, count the
//!   outcome and dead-letter true errors, on every exit path
//!
//! ## Main entry point
//!
//! Build a [`Router`] with [`Router::builder`], then call
//! [`Router::handle`] with an [`IngestRequest`]. Transports, backups and the
//! activity log are traits in [`sink`]; in-memory versions live in
//! [`memory`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use http::{HeaderMap, HeaderValue};
//! use ingest::memory::MemoryProducer;
//! use ingest::{
//!     AsyncDestination, IngestRequest, IngestType, Router, StaticStreamRegistry, StreamConfig,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let mut stream = StreamConfig::new("stream-1");
//! stream.server_keys = vec!["key-1".into()];
//! stream.async_destinations = vec![AsyncDestination {
//!     id: "warehouse".into(),
//!     destination_type: "clickhouse".into(),
//!     options: Default::default(),
//! }];
//!
//! let registry = Arc::new(StaticStreamRegistry::new(None, [stream]));
//! let producer = Arc::new(MemoryProducer::new());
//! let router = Router::builder(registry, producer.clone()).build().unwrap();
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("content-type", HeaderValue::from_static("application/json"));
//! headers.insert("x-write-key", HeaderValue::from_static("key-1"));
//! let req = IngestRequest::from_bytes(IngestType::S2S, "track", headers, r#"{"event":"click"}"#);
//!
//! let resp = router.handle(req).await;
//! assert_eq!(resp.status, 200);
//! assert_eq!(producer.records_for("destination-messages").len(), 1);
//! # });
//! ```
mod config;
mod dispatch;
mod error;
mod locator;
pub mod memory;
mod message;
mod metadata;
mod metrics;
mod router;
pub mod sink;
mod types;

pub use crate::config::{ConfigError, RouterConfig, MAX_MESSAGE_ID_LEN};
pub use crate::dispatch::{HEADER_MESSAGE_ID, HEADER_STREAM_ID};
pub use crate::error::{
    BodyReadError, IngestError, LocatorError, Outcome, ProducerError, SideChannelError, SyncError,
};
pub use crate::locator::{StaticStreamRegistry, StreamResolver};
pub use crate::message::{derive_message_id, sanitize_message_id};
pub use crate::metadata::{client_ip, content_type, is_accepted_content_type, write_key};
pub use crate::metrics::{
    AtomicIngestMetrics, IngestMetrics, NoopMetrics, STATUS_ERROR, STATUS_SKIPPED,
    STATUS_SUCCESS, STATUS_THROTTLED,
};
pub use crate::router::{
    IngestResponse, ResponseBody, Router, RouterBuilder, DEAD_LETTER_ERROR_HEADER, UNKNOWN_STREAM,
};
pub use crate::sink::{
    ActivityEntry, ActivityLevel, ActivityLog, ActivityStatus, BackupSink, Producer, SyncExecutor,
};
pub use crate::types::{
    AsyncDestination, BodyFuture, CanonicalMessage, IngestRequest, IngestType, Origin,
    SharedStream, StreamConfig, StreamLocator, SyncDestination,
};
