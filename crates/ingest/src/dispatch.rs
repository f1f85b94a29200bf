//! Fan-out to destinations.
use bytes::Bytes;
use futures::future::join_all;
use serde_json::{json, Value};

use crate::error::{IngestError, ProducerError};
use crate::sink::{Producer, SyncExecutor};
use crate::types::{CanonicalMessage, StreamConfig};

pub const HEADER_STREAM_ID: &str = "stream_id";
pub const HEADER_MESSAGE_ID: &str = "message_id";

/// Publishes `bytes` once per async destination, all publishes in flight
/// together.
///
/// All-or-nothing per request: any failure fails the request. Throttled is
/// reported only when every failure was a throttle.
pub async fn publish_async(
    producer: &dyn Producer,
    topic: &str,
    stream: &StreamConfig,
    message_id: &str,
    bytes: &Bytes,
) -> Result<(), IngestError> {
    let headers = [
        (HEADER_STREAM_ID, stream.id.as_str()),
        (HEADER_MESSAGE_ID, message_id),
    ];
    let headers = &headers[..];
    let publishes = stream.async_destinations.iter().map(|dest| async move {
        producer
            .produce(topic, &dest.id, bytes.clone(), headers)
            .await
            .map_err(|e| (dest.id.as_str(), e))
    });

    let failures: Vec<_> = join_all(publishes)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if failures.is_empty() {
        return Ok(());
    }

    let throttled_only = failures
        .iter()
        .all(|(_, e)| matches!(e, ProducerError::Throttled(_)));
    let detail = failures
        .iter()
        .map(|(id, e)| format!("destination {id}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    if throttled_only {
        Err(IngestError::Throttled(detail))
    } else {
        Err(IngestError::Delivery(detail))
    }
}

/// Runs synchronous destinations in declared order and combines their
/// results as `{"destinations": [...]}`. `None` when no destination
/// returned anything.
pub async fn execute_sync(
    executor: &dyn SyncExecutor,
    message: &CanonicalMessage,
    stream: &StreamConfig,
) -> Result<Option<Value>, IngestError> {
    let mut results = Vec::with_capacity(stream.sync_destinations.len());
    for dest in &stream.sync_destinations {
        let result = executor
            .execute(message, dest)
            .await
            .map_err(|e| IngestError::Delivery(e.to_string()))?;
        results.extend(result);
    }
    Ok((!results.is_empty()).then(|| json!({ "destinations": results })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryProducer, TagSyncExecutor};
    use crate::types::{AsyncDestination, IngestType, Origin, SyncDestination};
    use chrono::Utc;
    use serde_json::Map;

    const TOPIC: &str = "destination-messages";

    fn stream(async_ids: &[&str], sync_ids: &[&str]) -> StreamConfig {
        let mut s = StreamConfig::new("stream-1");
        s.async_destinations = async_ids
            .iter()
            .map(|id| AsyncDestination {
                id: id.to_string(),
                destination_type: "webhook".into(),
                options: Map::new(),
            })
            .collect();
        s.sync_destinations = sync_ids
            .iter()
            .map(|id| SyncDestination {
                id: id.to_string(),
                destination_type: "ga4-tag".into(),
                options: Map::new(),
            })
            .collect();
        s
    }

    fn message() -> CanonicalMessage {
        CanonicalMessage {
            ingest_type: IngestType::Browser,
            message_created: Utc::now(),
            message_id: "m-1".into(),
            write_key: None,
            event_type: "track".into(),
            origin: Origin::default(),
            http_headers: Default::default(),
            request_ip: None,
            http_payload: json!({}),
        }
    }

    #[tokio::test]
    async fn one_record_per_async_destination() {
        let producer = MemoryProducer::new();
        let bytes = Bytes::from_static(b"{}");
        publish_async(&producer, TOPIC, &stream(&["a", "b", "c"], &[]), "m-1", &bytes)
            .await
            .unwrap();
        let mut keys: Vec<_> = producer.records().into_iter().map(|r| r.key).collect();
        keys.sort();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(producer.records()[0].header(HEADER_MESSAGE_ID), Some("m-1"));
    }

    #[tokio::test]
    async fn throttle_and_publish_failures_are_classified() {
        let producer = MemoryProducer::new();
        let bytes = Bytes::from_static(b"{}");
        producer.fail_topic(TOPIC, ProducerError::Throttled("queue full".into()));
        let err = publish_async(&producer, TOPIC, &stream(&["a"], &[]), "m-1", &bytes)
            .await
            .unwrap_err();
        assert!(err.is_throttled());

        producer.fail_topic(TOPIC, ProducerError::Publish("broker down".into()));
        let err = publish_async(&producer, TOPIC, &stream(&["a"], &[]), "m-1", &bytes)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Delivery(d) if d.contains("broker down")));
    }

    #[tokio::test]
    async fn mixed_failures_are_a_delivery_error() {
        let producer = MemoryProducer::new();
        let bytes = Bytes::from_static(b"{}");
        producer.fail_key("a", ProducerError::Throttled("queue full".into()));
        producer.fail_key("b", ProducerError::Publish("broker down".into()));

        let err = publish_async(&producer, TOPIC, &stream(&["a", "b", "c"], &[]), "m-1", &bytes)
            .await
            .unwrap_err();
        assert!(matches!(&err, IngestError::Delivery(d) if d.contains("destination b")));
        assert!(!err.is_throttled());
        // the healthy destination still got its record
        assert_eq!(producer.records().len(), 1);
        assert_eq!(producer.records()[0].key, "c");

        producer.clear_failures();
        producer.fail_key("a", ProducerError::Throttled("queue full".into()));
        producer.fail_key("b", ProducerError::Throttled("quota".into()));
        let err = publish_async(&producer, TOPIC, &stream(&["a", "b"], &[]), "m-1", &bytes)
            .await
            .unwrap_err();
        assert!(err.is_throttled());
    }

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl SyncExecutor for FailingExecutor {
        async fn execute(
            &self,
            _message: &CanonicalMessage,
            destination: &SyncDestination,
        ) -> Result<Option<Value>, crate::error::SyncError> {
            Err(crate::error::SyncError {
                destination: destination.id.clone(),
                message: "endpoint returned 502".into(),
            })
        }
    }

    #[tokio::test]
    async fn sync_failure_is_a_delivery_error() {
        let err = execute_sync(&FailingExecutor, &message(), &stream(&[], &["t1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Delivery(d) if d.contains("502")));
    }

    #[tokio::test]
    async fn sync_results_keep_declared_order() {
        let result = execute_sync(&TagSyncExecutor, &message(), &stream(&[], &["t2", "t1"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["destinations"][0]["id"], "t2");
        assert_eq!(result["destinations"][1]["id"], "t1");

        let none = execute_sync(&TagSyncExecutor, &message(), &stream(&["a"], &[]))
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
