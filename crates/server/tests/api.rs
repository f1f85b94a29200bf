//! HTTP-level tests for the intake, schema and probe endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use bytes::Bytes;
use ingest::memory::MemoryProducer;
use ingest::{AsyncDestination, Producer, ProducerError, StreamConfig, SyncDestination};
use serde_json::{json, Value};
use server::{build_router, ServerConfig, ServerState};
use tower::ServiceExt;

fn test_config() -> ServerConfig {
    let mut site = StreamConfig::new("stream-site");
    site.slug = Some("acme".into());
    site.browser_keys = vec!["browser-key".into()];
    site.server_keys = vec!["server-key".into()];
    site.async_destinations = vec![AsyncDestination {
        id: "warehouse".into(),
        destination_type: "clickhouse".into(),
        options: Default::default(),
    }];

    let mut tags = StreamConfig::new("stream-tags");
    tags.server_keys = vec!["tags-key".into()];
    tags.sync_destinations = vec![SyncDestination {
        id: "ga4".into(),
        destination_type: "ga4-tag".into(),
        options: json!({"measurementId": "G-123", "script": "x".repeat(256)})
            .as_object()
            .cloned()
            .unwrap(),
    }];

    ServerConfig {
        data_domain: Some("data.example.com".into()),
        streams: vec![site, tags],
        ..Default::default()
    }
}

fn setup() -> (axum::Router, Arc<MemoryProducer>, Arc<ServerState>) {
    let producer = Arc::new(MemoryProducer::new());
    let state = Arc::new(ServerState::with_producer(test_config(), producer.clone()).unwrap());
    (build_router(state.clone()), producer, state)
}

fn post(uri: &str, content_type: &str, key: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(key) = key {
        builder = builder.header("x-write-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s2s_event_is_published() {
    let (app, producer, _) = setup();
    let resp = app
        .oneshot(post(
            "/api/s/s2s/track",
            "application/json",
            Some("server-key"),
            r#"{"messageId":"m-1","event":"click"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-message-id"], "m-1");
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(json_body(resp).await, json!({"ok": true}));

    let records = producer.records_for("destination-messages");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "warehouse");
}

#[tokio::test]
async fn browser_event_resolves_by_host() {
    let (app, producer, _) = setup();
    let req = Request::builder()
        .method("POST")
        .uri("/api/s/page")
        .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
        .header(header::HOST, "acme.data.example.com")
        .body(Body::from(r#"{"type":"page","url":"/"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let record = &producer.records_for("destination-messages")[0];
    let canonical: Value = serde_json::from_slice(&record.payload).unwrap();
    assert_eq!(canonical["ingestType"], "browser");
    assert_eq!(canonical["type"], "page");
    assert_eq!(canonical["origin"]["slug"], "acme");
}

#[tokio::test]
async fn xml_is_rejected_with_400() {
    let (app, producer, _) = setup();
    let resp = app
        .oneshot(post("/api/s/s2s/track", "application/xml", Some("server-key"), "<a/>"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "INVALID_CONTENT_TYPE");
    assert!(producer.records().is_empty());
}

#[tokio::test]
async fn unknown_key_answers_200_with_envelope() {
    let (app, producer, _) = setup();
    let resp = app
        .oneshot(post("/api/s/s2s/track", "application/json", Some("nope"), "{}"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["error"]["code"], "STREAM_NOT_FOUND");
    assert_eq!(producer.records_for("destination-messages-dead-letter").len(), 1);
}

#[tokio::test]
async fn sync_result_is_gzipped_when_negotiated() {
    let (app, _, _) = setup();
    let mut req = post("/api/s/s2s/track", "application/json", Some("tags-key"), "{}");
    req.headers_mut()
        .insert(header::ACCEPT_ENCODING, "gzip".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");
    let vary = resp.headers()[header::VARY].to_str().unwrap().to_ascii_lowercase();
    assert!(vary.contains("accept-encoding"));
}

#[tokio::test]
async fn sync_result_is_plain_without_negotiation() {
    let (app, _, _) = setup();
    let resp = app
        .oneshot(post("/api/s/s2s/track", "application/json", Some("tags-key"), "{}"))
        .await
        .unwrap();

    assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
    let body = json_body(resp).await;
    assert_eq!(body["destinations"][0]["id"], "ga4");
    assert_eq!(body["destinations"][0]["options"]["measurementId"], "G-123");
}

#[tokio::test]
async fn ok_envelope_is_never_compressed() {
    let (app, _, _) = setup();
    let mut req = post("/api/s/s2s/track", "application/json", Some("server-key"), "{}");
    req.headers_mut()
        .insert(header::ACCEPT_ENCODING, "gzip".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
}

#[tokio::test]
async fn schema_endpoint_reflects_traffic() {
    let (app, _, _) = setup();
    let resp = app
        .clone()
        .oneshot(post(
            "/api/s/s2s/track",
            "application/json",
            Some("server-key"),
            r#"{"n":1,"user":{"id":"u1"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(Request::get("/api/schema/stream-site").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let header = json_body(resp).await;
    assert_eq!(header["table_name"], "stream-site");
    assert_eq!(header["fields"]["n"]["data_type"], "int64");
    assert!(header["fields"].get("user_id").is_some());

    let resp = app
        .oneshot(Request::get("/api/schema/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_expose_ingest_counters() {
    let (app, _, _) = setup();
    app.clone()
        .oneshot(post("/api/s/s2s/track", "application/json", Some("server-key"), "{}"))
        .await
        .unwrap();

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ingest_handler_requests"), "{text}");
    assert!(text.contains(r#"domain="acme""#), "{text}");
    assert!(text.contains(r#"status="success""#), "{text}");
}

#[tokio::test]
async fn probes_and_fallback() {
    let (app, _, _) = setup();
    for uri in ["/", "/health", "/ready"] {
        let resp = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    }

    let resp = app
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

/// Broker that takes `delay` to acknowledge each publish.
struct SlowProducer {
    inner: Arc<MemoryProducer>,
    delay: Duration,
}

#[async_trait]
impl Producer for SlowProducer {
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
        headers: &[(&str, &str)],
    ) -> Result<(), ProducerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.produce(topic, key, payload, headers).await
    }
}

fn slow_setup(delay: Duration) -> (axum::Router, Arc<MemoryProducer>, Arc<ServerState>) {
    let records = Arc::new(MemoryProducer::new());
    let producer = Arc::new(SlowProducer {
        inner: records.clone(),
        delay,
    });
    let config = ServerConfig {
        timeout_secs: 1,
        ..test_config()
    };
    let state = Arc::new(ServerState::with_producer(config, producer).unwrap());
    (build_router(state.clone()), records, state)
}

/// Waits until the spawned router task has published and counted.
async fn wait_for_delivery(records: &MemoryProducer, state: &ServerState) {
    for _ in 0..50 {
        if !records.records_for("destination-messages").is_empty()
            && state.metrics.render().contains(r#"status="success""#)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("request was never finalized");
}

#[tokio::test]
async fn slow_delivery_answers_200_and_still_finalizes() {
    let (app, records, state) = slow_setup(Duration::from_millis(1500));
    let resp = app
        .oneshot(post(
            "/api/s/s2s/track",
            "application/json",
            Some("server-key"),
            r#"{"messageId":"m-slow","event":"click"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"ok": true}));
    assert!(records.records_for("destination-messages").is_empty());

    wait_for_delivery(&records, &state).await;
    let published = records.records_for("destination-messages");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].header("message_id"), Some("m-slow"));
    assert!(records.records_for("destination-messages-dead-letter").is_empty());
}

#[tokio::test]
async fn client_disconnect_does_not_cancel_finalization() {
    let (app, records, state) = slow_setup(Duration::from_millis(300));
    let request = app.oneshot(post(
        "/api/s/s2s/track",
        "application/json",
        Some("server-key"),
        r#"{"messageId":"m-gone","event":"click"}"#,
    ));
    // the caller gives up mid-flight and the response future is dropped
    assert!(tokio::time::timeout(Duration::from_millis(50), request)
        .await
        .is_err());

    wait_for_delivery(&records, &state).await;
    assert_eq!(
        records.records_for("destination-messages")[0].header("message_id"),
        Some("m-gone")
    );
}
