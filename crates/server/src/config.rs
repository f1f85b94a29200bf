use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use ingest::{RouterConfig, StreamConfig};
use serde::{Deserialize, Serialize};

/// Environment variable prefix; nested keys use `__`, e.g.
/// `EVGATE_SERVER__ROUTER__DEAD_LETTER_TOPIC`.
pub const ENV_PREFIX: &str = "EVGATE_SERVER";

/// Everything the gateway process needs. Missing keys take the
/// [`Default`] values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Per-request deadline, seconds.
    pub timeout_secs: u64,
    pub max_body_size_mb: usize,
    pub enable_cors: bool,
    /// Level name or a full `EnvFilter` directive. `RUST_LOG` wins.
    pub log_level: String,
    pub log_json: bool,
    pub metrics_enabled: bool,
    /// Browser hosts of the form `<slug>.<data_domain>` resolve by slug.
    pub data_domain: Option<String>,
    pub router: RouterConfig,
    pub streams: Vec<StreamConfig>,
    /// Comma-separated bootstrap servers.
    #[cfg(feature = "kafka")]
    pub kafka_brokers: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            timeout_secs: 30,
            max_body_size_mb: 10,
            enable_cors: true,
            log_level: "info".into(),
            log_json: true,
            metrics_enabled: true,
            data_domain: None,
            router: RouterConfig::default(),
            streams: Vec::new(),
            #[cfg(feature = "kafka")]
            kafka_brokers: "localhost:9092".into(),
        }
    }
}

impl ServerConfig {
    /// Layers `.env`, an optional `server.{toml,yaml,json}` and
    /// `EVGATE_SERVER__*` variables, then validates the router section.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let config: ServerConfig = config::Config::builder()
            .add_source(config::File::with_name("server").required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .context("loading server configuration")?;
        config.validate()?;

        if config.streams.is_empty() {
            tracing::warn!("no streams configured; every request resolves to STREAM_NOT_FOUND");
        }
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.router.validate()?;
        anyhow::ensure!(self.max_body_size_mb > 0, "max_body_size_mb must be positive");
        anyhow::ensure!(self.timeout_secs > 0, "timeout_secs must be positive");
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind_addr, self.port))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.max_body_size(), 10 * 1024 * 1024);
        assert!(cfg.enable_cors && cfg.metrics_enabled);
        assert_eq!(cfg.router.destinations_topic, "destination-messages");
        assert!(cfg.streams.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn socket_addr_parses() {
        let addr = ServerConfig::default().socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let bad = ServerConfig {
            bind_addr: "not an ip".into(),
            ..ServerConfig::default()
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let raw = serde_json::json!({
            "port": 9000,
            "streams": [{
                "id": "stream-1",
                "slug": "acme",
                "server_keys": ["k1:s1"],
                "async_destinations": [{"id": "d1", "destinationType": "webhook"}],
            }],
        });
        let cfg: ServerConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.streams[0].async_destinations[0].destination_type, "webhook");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.router, RouterConfig::default());
    }

    #[test]
    fn rejects_same_topic_twice() {
        let mut cfg = ServerConfig::default();
        cfg.router.dead_letter_topic = cfg.router.destinations_topic.clone();
        assert!(cfg.validate().is_err());
    }
}
