//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with the ingest, schema and probe endpoints
//! - Middleware stack (request id, logging, timeout, compression, CORS)
//! - Graceful shutdown handling

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::routes::ingest::SyncResultBody;
use crate::routes::{api_info, not_found};
use crate::routes::{health, ingest, schema};
use crate::state::ServerState;
use axum::http::{Extensions, HeaderMap, StatusCode, Version};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Only synchronous destination results are compressed.
fn compress_sync_results(
    _status: StatusCode,
    _version: Version,
    _headers: &HeaderMap,
    extensions: &Extensions,
) -> bool {
    extensions.get::<SyncResultBody>().is_some()
}

/// Build the Axum router with all routes and middleware
///
/// Middleware stack (outermost first):
/// 1. Tracing
/// 2. Request ID tracking
/// 3. Request logging
/// 4. CORS
/// 5. Compression (synchronous results only)
/// 6. Timeout handling (non-ingest routes; intake enforces its own deadline)
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let ingest_routes = Router::new()
        .route("/api/s/{tp}", post(ingest::ingest_browser))
        .route("/api/s/s2s/{tp}", post(ingest::ingest_s2s));

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .route("/api/schema", get(schema::list_tables))
        .route("/api/schema/{table}", get(schema::get_table))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ));

    Router::new()
        .merge(ingest_routes)
        .merge(public_routes)
        .fallback(not_found)
        .layer(CompressionLayer::new().compress_when(compress_sync_results))
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.log_json {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Binds, serves until Ctrl+C or SIGTERM, then drains in-flight requests.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    init_tracing(&config);

    let state = Arc::new(ServerState::new(config.clone())?);
    let app = build_router(state);
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        %addr,
        streams = config.streams.len(),
        timeout_secs = config.timeout_secs,
        max_body_mb = config.max_body_size_mb,
        destinations_topic = %config.router.destinations_topic,
        dead_letter_topic = %config.router.dead_letter_topic,
        "evgate_listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("evgate_stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install never fires.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "ctrl_c", "shutdown_requested"),
        _ = terminate => tracing::info!(signal = "sigterm", "shutdown_requested"),
    }
}
