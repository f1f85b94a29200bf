//! HTTP front end for the evgate ingest router.
//!
//! [`build_router`] mounts the intake, schema and probe endpoints on an axum
//! router; [`start_server`] adds tracing, binding and graceful shutdown.
//! Collaborators are chosen in [`ServerState`]: Kafka when built with the
//! `kafka` feature, a logging producer otherwise, Prometheus counters and a
//! webhook executor for synchronous destinations.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/api/s/{tp}` | browser intake |
//! | POST | `/api/s/s2s/{tp}` | server-to-server intake |
//! | GET | `/api/schema`, `/api/schema/{table}` | inferred table schemas |
//! | GET | `/`, `/health`, `/ready`, `/metrics` | info, probes, Prometheus text |
//!
//! Intake answers `200` for almost every outcome so clients never
//! retry-storm. `400` is reserved for rejected content types and `500` for
//! internal faults.
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     server::start_server(server::ServerConfig::load()?).await
//! }
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod webhook;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, init_tracing, start_server};
pub use state::ServerState;
