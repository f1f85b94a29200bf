use std::sync::Arc;

use http::{HeaderMap, HeaderValue};
use ingest::memory::{MemoryActivityLog, MemoryProducer};
use ingest::{
    AsyncDestination, IngestRequest, IngestType, ProducerError, Router, StaticStreamRegistry,
    StreamConfig,
};

fn demo_stream() -> StreamConfig {
    let mut stream = StreamConfig::new("demo-stream");
    stream.slug = Some("demo".into());
    stream.server_keys = vec!["demo-key".into()];
    stream.async_destinations = vec![AsyncDestination {
        id: "warehouse".into(),
        destination_type: "clickhouse".into(),
        options: Default::default(),
    }];
    stream
}

fn request(body: &'static str) -> IngestRequest {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("x-write-key", HeaderValue::from_static("demo-key"));
    IngestRequest::from_bytes(IngestType::S2S, "track", headers, body)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let registry = Arc::new(StaticStreamRegistry::new(None, [demo_stream()]));
    let producer = Arc::new(MemoryProducer::new());
    let activity = Arc::new(MemoryActivityLog::new());
    let router = match Router::builder(registry, producer.clone())
        .activity_log(activity.clone())
        .build()
    {
        Ok(router) => router,
        Err(err) => {
            eprintln!("router config rejected: {err}");
            return;
        }
    };

    let resp = router
        .handle(request(r#"{"messageId":"demo-1","event":"signup"}"#))
        .await;
    println!("delivered: {} {}", resp.status, resp.body.to_json());

    producer.fail_topic(
        "destination-messages",
        ProducerError::Throttled("queue full".into()),
    );
    let resp = router
        .handle(request(r#"{"messageId":"demo-2","event":"signup"}"#))
        .await;
    println!("throttled: {} {}", resp.status, resp.body.to_json());

    for record in producer.records() {
        println!(
            "{} key={} error={:?}",
            record.topic,
            record.key,
            record.header("error")
        );
    }
    for entry in activity.entries() {
        println!("activity {} {:?}", entry.actor_id, entry.status());
    }
}
