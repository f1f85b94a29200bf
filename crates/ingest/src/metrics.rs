//! Request counters.
//!
//! The counter family is keyed by `(domain, status, errorType)` where status
//! is one of `success`, `skipped`, `error` or `throttled`. The sink is
//! injected at construction; nothing here touches a global recorder.
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_SKIPPED: &str = "skipped";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_THROTTLED: &str = "throttled";

/// Counter increment capability.
pub trait IngestMetrics: Send + Sync {
    fn request(&self, domain: &str, status: &str, error_type: &str);
}

/// Discards every increment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl IngestMetrics for NoopMetrics {
    fn request(&self, _domain: &str, _status: &str, _error_type: &str) {}
}

type CounterKey = (String, String, String);

/// Lock-free in-process counters, readable back for tests and embedding.
#[derive(Debug, Default)]
pub struct AtomicIngestMetrics {
    counters: DashMap<CounterKey, AtomicU64>,
}

impl AtomicIngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: &str, status: &str, error_type: &str) -> u64 {
        self.counters
            .get(&(domain.to_string(), status.to_string(), error_type.to_string()))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Sorted copy of every non-zero counter.
    pub fn snapshot(&self) -> Vec<(CounterKey, u64)> {
        let mut out: Vec<_> = self
            .counters
            .iter()
            .map(|c| (c.key().clone(), c.value().load(Ordering::Relaxed)))
            .filter(|(_, n)| *n > 0)
            .collect();
        out.sort();
        out
    }
}

impl IngestMetrics for AtomicIngestMetrics {
    fn request(&self, domain: &str, status: &str, error_type: &str) {
        let key = (domain.to_string(), status.to_string(), error_type.to_string());
        if let Some(counter) = self.counters.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(key)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }
}
