//! Kafka transport for destination and dead-letter records.
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use ingest::{Producer, ProducerError};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, info, instrument};

/// Broker codes reported as backpressure rather than failure.
const THROTTLE_CODES: [RDKafkaErrorCode; 2] = [
    RDKafkaErrorCode::QueueFull,
    RDKafkaErrorCode::ThrottlingQuotaExceeded,
];

pub struct KafkaProducer {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaProducer {
    #[instrument(skip_all)]
    pub fn new(brokers: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "evgate")
            .set("message.timeout.ms", "60000")
            .set("socket.keepalive.enable", "true")
            .set("compression.type", "lz4")
            .set("linger.ms", "5")
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create()
            .with_context(|| "creating kafka producer")?;

        info!(brokers = %brokers, "kafka client connected");
        Ok(Self {
            producer,
            queue_timeout: Duration::from_secs(5),
        })
    }
}

fn classify(err: KafkaError) -> ProducerError {
    match err.rdkafka_error_code() {
        Some(code) if THROTTLE_CODES.contains(&code) => ProducerError::Throttled(err.to_string()),
        _ => ProducerError::Publish(err.to_string()),
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
        headers: &[(&str, &str)],
    ) -> Result<(), ProducerError> {
        let mut owned = OwnedHeaders::new_with_capacity(headers.len());
        for &(name, value) in headers {
            owned = owned.insert(Header {
                key: name,
                value: Some(value),
            });
        }
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload.as_ref())
            .headers(owned);

        self.producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
            .map_err(|(e, _msg)| classify(e))?;
        debug!(topic, key, "record delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_codes_are_throttled() {
        let err = classify(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull));
        assert!(matches!(err, ProducerError::Throttled(_)));

        let err = classify(KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge));
        assert!(matches!(err, ProducerError::Publish(_)));
    }
}
