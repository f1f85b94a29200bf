//! In-process collaborator implementations.
//!
//! The `Memory*` types record every effect for inspection. The `Tracing*`
//! types are the defaults when the host has no durable sink for a channel.
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ProducerError, SideChannelError, SyncError};
use crate::sink::{ActivityEntry, ActivityLog, BackupSink, Producer, SyncExecutor};
use crate::types::{CanonicalMessage, SyncDestination};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One published broker record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Bytes,
    pub headers: Vec<(String, String)>,
}

impl ProducedRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Broker stand-in. Publishes to a topic configured with [`fail_topic`],
/// or with a key configured with [`fail_key`], return that error and are
/// not recorded.
///
/// [`fail_topic`]: MemoryProducer::fail_topic
/// [`fail_key`]: MemoryProducer::fail_key
#[derive(Debug, Default)]
pub struct MemoryProducer {
    records: Mutex<Vec<ProducedRecord>>,
    failures: DashMap<String, ProducerError>,
    key_failures: DashMap<String, ProducerError>,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_topic(&self, topic: impl Into<String>, error: ProducerError) {
        self.failures.insert(topic.into(), error);
    }

    /// Fails every publish keyed `key`, on any topic. Async fan-out keys
    /// records by destination id, so this fails a single destination.
    pub fn fail_key(&self, key: impl Into<String>, error: ProducerError) {
        self.key_failures.insert(key.into(), error);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
        self.key_failures.clear();
    }

    pub fn records(&self) -> Vec<ProducedRecord> {
        lock(&self.records).clone()
    }

    pub fn records_for(&self, topic: &str) -> Vec<ProducedRecord> {
        lock(&self.records)
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
        headers: &[(&str, &str)],
    ) -> Result<(), ProducerError> {
        let failure = self
            .failures
            .get(topic)
            .or_else(|| self.key_failures.get(key))
            .map(|err| err.value().clone());
        if let Some(err) = failure {
            return Err(err);
        }
        lock(&self.records).push(ProducedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        Ok(())
    }
}

/// Producer that drops every record after a debug event. Used when the
/// host runs without a broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProducer;

#[async_trait]
impl Producer for TracingProducer {
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
        _headers: &[(&str, &str)],
    ) -> Result<(), ProducerError> {
        debug!(topic, key, bytes = payload.len(), "produce_dropped");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackup {
    entries: Mutex<Vec<(String, Bytes)>>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(stream_id, bytes)` pairs in write order.
    pub fn entries(&self) -> Vec<(String, Bytes)> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl BackupSink for MemoryBackup {
    async fn log(&self, stream_id: &str, bytes: &Bytes) -> Result<(), SideChannelError> {
        lock(&self.entries).push((stream_id.to_string(), bytes.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn post(&self, entry: ActivityEntry) -> Result<(), SideChannelError> {
        lock(&self.entries).push(entry);
        Ok(())
    }
}

/// Backup sink that only emits a debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBackup;

#[async_trait]
impl BackupSink for TracingBackup {
    async fn log(&self, stream_id: &str, bytes: &Bytes) -> Result<(), SideChannelError> {
        debug!(stream_id, bytes = bytes.len(), "backup");
        Ok(())
    }
}

/// Activity log that writes each entry as a structured event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityLog;

#[async_trait]
impl ActivityLog for TracingActivityLog {
    async fn post(&self, entry: ActivityEntry) -> Result<(), SideChannelError> {
        info!(
            actor_id = %entry.actor_id,
            level = ?entry.level,
            status = entry.status().unwrap_or_default(),
            error = entry.error().unwrap_or_default(),
            "activity"
        );
        Ok(())
    }
}

/// Tag executor: every synchronous destination answers with its own
/// configuration so the caller can render it client-side.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagSyncExecutor;

impl TagSyncExecutor {
    pub fn tag(destination: &SyncDestination) -> Value {
        json!({
            "id": destination.id,
            "destinationType": destination.destination_type,
            "options": destination.options,
        })
    }
}

#[async_trait]
impl SyncExecutor for TagSyncExecutor {
    async fn execute(
        &self,
        _message: &CanonicalMessage,
        destination: &SyncDestination,
    ) -> Result<Option<Value>, SyncError> {
        Ok(Some(Self::tag(destination)))
    }
}
