//! Delivery and side-channel collaborators.
//!
//! The router owns none of its outputs. Broker publishes, synchronous
//! destinations, payload backups and the activity log are all reached
//! through the traits below, so the serving process decides the transport
//! and tests can observe every effect in memory.
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProducerError, SideChannelError, SyncError};
use crate::types::{CanonicalMessage, SyncDestination};

/// Message broker client.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes one record. Implementations classify backpressure as
    /// [`ProducerError::Throttled`].
    async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
        headers: &[(&str, &str)],
    ) -> Result<(), ProducerError>;
}

/// Executes one synchronous destination inline.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    /// `Ok(None)` means the destination ran and has nothing to return.
    async fn execute(
        &self,
        message: &CanonicalMessage,
        destination: &SyncDestination,
    ) -> Result<Option<Value>, SyncError>;
}

/// Raw payload backup, keyed by stream id.
#[async_trait]
pub trait BackupSink: Send + Sync {
    async fn log(&self, stream_id: &str, bytes: &Bytes) -> Result<(), SideChannelError>;
}

/// Per-stream activity log.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn post(&self, entry: ActivityEntry) -> Result<(), SideChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventType {
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Info,
    Error,
}

/// Terminal status shown in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityStatus {
    Success,
    Skipped,
    Failed,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Success => "SUCCESS",
            ActivityStatus::Skipped => "SKIPPED",
            ActivityStatus::Failed => "FAILED",
        }
    }
}

/// One activity log record.
///
/// `event` is an object carrying `body`, `status` and, depending on the
/// outcome, `error`, `asyncDestinations` and `tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub event_type: ActivityEventType,
    pub level: ActivityLevel,
    /// Stream id, or `UNKNOWN` when the request never resolved one.
    pub actor_id: String,
    pub event: Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn incoming(level: ActivityLevel, actor_id: impl Into<String>, event: Value) -> Self {
        Self {
            event_type: ActivityEventType::Incoming,
            level,
            actor_id: actor_id.into(),
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.event.get("status").and_then(Value::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.event.get("error").and_then(Value::as_str)
    }
}
