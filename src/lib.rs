//! Workspace umbrella crate for the evgate event gateway.
//!
//! This crate ties the intake router to schema inference, so an embedder can
//! stand up a complete in-process gateway with one call and then drive it
//! with [`IngestRequest`]s.

pub use ingest::{
    memory, sink, AsyncDestination, ConfigError, IngestError, IngestRequest, IngestResponse,
    IngestType, Outcome, ResponseBody, Router, RouterConfig, StaticStreamRegistry, StreamConfig,
    SyncDestination,
};
pub use schema::{DataType, Field, SchemaRegistry, TypesHeader};

use std::sync::Arc;

use ingest::memory::{MemoryActivityLog, MemoryBackup, MemoryProducer, TagSyncExecutor};
use ingest::AtomicIngestMetrics;

/// A router wired to in-memory collaborators, with handles to each of them.
///
/// Every effect of a request (broker records, backups, activity entries,
/// counters and inferred schemas) can be read back after
/// [`Router::handle`] returns.
#[derive(Debug, Clone)]
pub struct LocalGateway {
    pub router: Router,
    pub producer: Arc<MemoryProducer>,
    pub backups: Arc<MemoryBackup>,
    pub activity: Arc<MemoryActivityLog>,
    pub metrics: Arc<AtomicIngestMetrics>,
    pub schemas: Arc<SchemaRegistry>,
}

impl LocalGateway {
    /// Build a gateway over `streams` with the default router config.
    pub fn new(
        data_domain: Option<String>,
        streams: impl IntoIterator<Item = StreamConfig>,
    ) -> Result<Self, ConfigError> {
        Self::with_config(RouterConfig::default(), data_domain, streams)
    }

    pub fn with_config(
        config: RouterConfig,
        data_domain: Option<String>,
        streams: impl IntoIterator<Item = StreamConfig>,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(StaticStreamRegistry::new(data_domain, streams));
        let producer = Arc::new(MemoryProducer::new());
        let backups = Arc::new(MemoryBackup::new());
        let activity = Arc::new(MemoryActivityLog::new());
        let metrics = Arc::new(AtomicIngestMetrics::new());
        let schemas = Arc::new(SchemaRegistry::new());

        let router = Router::builder(registry, producer.clone())
            .sync_executor(Arc::new(TagSyncExecutor))
            .backups(backups.clone())
            .activity_log(activity.clone())
            .metrics(metrics.clone())
            .schemas(schemas.clone())
            .config(config)
            .build()?;

        Ok(Self {
            router,
            producer,
            backups,
            activity,
            metrics,
            schemas,
        })
    }

    pub async fn handle(&self, req: IngestRequest) -> IngestResponse {
        self.router.handle(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};

    fn stream() -> StreamConfig {
        let mut stream = StreamConfig::new("s1");
        stream.server_keys = vec!["k1".into()];
        stream.async_destinations = vec![AsyncDestination {
            id: "d1".into(),
            destination_type: "webhook".into(),
            options: Default::default(),
        }];
        stream
    }

    fn s2s(body: &'static str) -> IngestRequest {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-write-key", HeaderValue::from_static("k1"));
        IngestRequest::from_bytes(IngestType::S2S, "track", headers, body)
    }

    #[tokio::test]
    async fn local_gateway_records_every_channel() {
        let gw = LocalGateway::new(None, [stream()]).unwrap();
        let resp = gw.handle(s2s(r#"{"event":"x","n":1}"#)).await;

        assert_eq!(resp.status, 200);
        assert_eq!(gw.producer.records_for("destination-messages").len(), 1);
        assert_eq!(gw.backups.entries().len(), 1);
        assert_eq!(gw.activity.entries().len(), 1);
        assert_eq!(gw.metrics.total(), 1);
        assert!(gw.schemas.snapshot("s1").is_some());
    }

    #[test]
    fn rejects_invalid_router_config() {
        let config = RouterConfig {
            dead_letter_topic: "destination-messages".into(),
            ..RouterConfig::default()
        };
        assert!(LocalGateway::with_config(config, None, [stream()]).is_err());
    }
}
