//! Synchronous destinations over HTTP.
//!
//! A destination with a `url` option receives the canonical message as a
//! JSON POST and its response body becomes the destination's result.
//! Destinations without a URL fall back to tag rendering.
use std::time::Duration;

use async_trait::async_trait;
use ingest::memory::TagSyncExecutor;
use ingest::{CanonicalMessage, SyncDestination, SyncError, SyncExecutor};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WebhookSyncExecutor {
    client: reqwest::Client,
}

impl WebhookSyncExecutor {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("evgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn sync_error(destination: &SyncDestination, message: impl std::fmt::Display) -> SyncError {
    SyncError {
        destination: destination.id.clone(),
        message: message.to_string(),
    }
}

#[async_trait]
impl SyncExecutor for WebhookSyncExecutor {
    async fn execute(
        &self,
        message: &CanonicalMessage,
        destination: &SyncDestination,
    ) -> Result<Option<Value>, SyncError> {
        let Some(url) = destination.options.get("url").and_then(Value::as_str) else {
            return Ok(Some(TagSyncExecutor::tag(destination)));
        };

        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| sync_error(destination, e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| sync_error(destination, e))?;
        debug!(destination = %destination.id, bytes = body.len(), "sync_destination_done");

        if body.is_empty() {
            return Ok(None);
        }
        let result: Value = serde_json::from_slice(&body)
            .map_err(|e| sync_error(destination, format!("invalid JSON response: {e}")))?;
        Ok(Some(json!({
            "id": destination.id,
            "destinationType": destination.destination_type,
            "result": result,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::{IngestType, Origin};

    fn message() -> CanonicalMessage {
        CanonicalMessage {
            ingest_type: IngestType::S2S,
            message_created: chrono::Utc::now(),
            message_id: "m-1".into(),
            write_key: None,
            event_type: "track".into(),
            origin: Origin {
                source_id: "s1".into(),
                ..Origin::default()
            },
            http_headers: Default::default(),
            request_ip: None,
            http_payload: json!({"event": "click"}),
        }
    }

    fn destination(options: Value) -> SyncDestination {
        SyncDestination {
            id: "d1".into(),
            destination_type: "ga4-tag".into(),
            options: options.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn without_url_renders_tag() {
        let exec = WebhookSyncExecutor::new(Duration::from_secs(1)).unwrap();
        let dest = destination(json!({"measurementId": "G-1"}));
        let result = exec.execute(&message(), &dest).await.unwrap().unwrap();
        assert_eq!(result, TagSyncExecutor::tag(&dest));
    }

    #[tokio::test]
    async fn unreachable_url_is_a_sync_error() {
        let exec = WebhookSyncExecutor::new(Duration::from_secs(1)).unwrap();
        let dest = destination(json!({"url": "http://127.0.0.1:1/hook"}));
        let err = exec.execute(&message(), &dest).await.unwrap_err();
        assert_eq!(err.destination, "d1");
    }
}
