use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::metrics::PrometheusIngestMetrics;
use crate::webhook::WebhookSyncExecutor;
use ingest::{Producer, Router, StaticStreamRegistry};
use schema::SchemaRegistry;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Ingest router (shared across requests)
    pub router: Arc<Router>,

    /// Schemas inferred from routed events, one table per stream
    pub schemas: Arc<SchemaRegistry>,

    /// Request counters behind `/metrics`
    pub metrics: Arc<PrometheusIngestMetrics>,
}

impl ServerState {
    /// Create new server state with the configured broker transport
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let producer = default_producer(&config)?;
        Self::with_producer(config, producer)
    }

    /// Create server state publishing through `producer`
    pub fn with_producer(config: ServerConfig, producer: Arc<dyn Producer>) -> ServerResult<Self> {
        let registry = Arc::new(StaticStreamRegistry::new(
            config.data_domain.clone(),
            config.streams.iter().cloned(),
        ));
        let schemas = Arc::new(SchemaRegistry::new());
        let metrics = Arc::new(PrometheusIngestMetrics::new());
        let sync_executor = Arc::new(WebhookSyncExecutor::new(config.timeout())?);

        let router = Router::builder(registry, producer)
            .sync_executor(sync_executor)
            .metrics(metrics.clone())
            .schemas(schemas.clone())
            .config(config.router.clone())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            router: Arc::new(router),
            schemas,
            metrics,
        })
    }
}

#[cfg(feature = "kafka")]
fn default_producer(config: &ServerConfig) -> ServerResult<Arc<dyn Producer>> {
    Ok(Arc::new(crate::kafka::KafkaProducer::new(&config.kafka_brokers)?))
}

#[cfg(not(feature = "kafka"))]
fn default_producer(_config: &ServerConfig) -> ServerResult<Arc<dyn Producer>> {
    tracing::warn!("Built without the kafka feature, published records are dropped");
    Ok(Arc::new(ingest::memory::TracingProducer))
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
    pub streams: usize,
    pub tables: usize,
}
