//! Prometheus-backed request counters.
//!
//! The recorder is owned by server state rather than installed globally;
//! increments go through [`metrics::with_local_recorder`].
use ingest::IngestMetrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};

/// Counter family incremented once per ingest request.
pub const INGEST_REQUESTS: &str = "ingest_handler_requests";

pub struct PrometheusIngestMetrics {
    recorder: PrometheusRecorder,
}

impl PrometheusIngestMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        metrics::with_local_recorder(&recorder, || {
            metrics::describe_counter!(
                INGEST_REQUESTS,
                "Ingest requests by domain, status and error type"
            );
        });
        Self { recorder }
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        self.recorder.handle().render()
    }
}

impl Default for PrometheusIngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PrometheusIngestMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusIngestMetrics").finish_non_exhaustive()
    }
}

impl IngestMetrics for PrometheusIngestMetrics {
    fn request(&self, domain: &str, status: &str, error_type: &str) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(
                INGEST_REQUESTS,
                "domain" => domain.to_string(),
                "status" => status.to_string(),
                "errorType" => error_type.to_string()
            )
            .increment(1);
        });
    }
}
