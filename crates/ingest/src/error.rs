//! Error types produced by the ingest crate.
//!
//! Every failure inside the router is resolved into exactly one
//! [`IngestError`] before it leaves [`Router::handle`](crate::Router::handle).
//! Low-level faults (broker, I/O, serialization, panics) never reach the
//! caller unclassified.
//!
//! # Error Categories
//!
//! | Error | Outcome | HTTP | Dead-lettered |
//! |-------|---------|------|---------------|
//! | [`InvalidContentType`](IngestError::InvalidContentType) | client input | 400 | only if a body was read |
//! | [`BodyRead`](IngestError::BodyRead) | client input | 200 | yes |
//! | [`Parse`](IngestError::Parse) | client input | 200 | yes |
//! | [`Locator`](IngestError::Locator) | no route | 200 | yes |
//! | [`StreamNotFound`](IngestError::StreamNotFound) | no route | 200 | yes |
//! | [`Build`](IngestError::Build) | client input | 200 | yes |
//! | [`NoDestination`](IngestError::NoDestination) | tenant setup | 200 | no |
//! | [`Throttled`](IngestError::Throttled) | backpressure | 200 | yes |
//! | [`Delivery`](IngestError::Delivery) | delivery | 200 | yes |
//! | [`InternalFault`](IngestError::InternalFault) | fault | 500 | yes |
//!
//! Ingestion clients must never retry-storm, so almost everything answers
//! 200 with an error envelope.
//!
//! # Examples
//!
//! ```rust
//! use ingest::{IngestError, Outcome};
//!
//! let err = IngestError::StreamNotFound("slug=acme".into());
//! assert_eq!(err.outcome(), Outcome::StreamNotFound);
//! assert_eq!(err.status_code(), 200);
//! assert!(err.is_dead_lettered());
//!
//! let skipped = IngestError::NoDestination("stream-1".into());
//! assert!(!skipped.is_dead_lettered());
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal classification of one ingest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    InvalidContentType,
    BodyReadError,
    ParseError,
    LocatorError,
    StreamNotFound,
    BuildError,
    NoDestination,
    Throttled,
    DeliveryError,
    InternalFault,
    Delivered,
}

impl Outcome {
    /// Label used for the `errorType` metric dimension.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::InvalidContentType => "invalid_content_type",
            Outcome::BodyReadError => "body_read_error",
            Outcome::ParseError => "parse_error",
            Outcome::LocatorError => "locator_error",
            Outcome::StreamNotFound => "stream_not_found",
            Outcome::BuildError => "build_error",
            Outcome::NoDestination => "no_destination",
            Outcome::Throttled => "throttled",
            Outcome::DeliveryError => "delivery_error",
            Outcome::InternalFault => "internal_fault",
            Outcome::Delivered => "delivered",
        }
    }

    /// Code carried in the response error envelope.
    pub fn code(self) -> &'static str {
        match self {
            Outcome::InvalidContentType => "INVALID_CONTENT_TYPE",
            Outcome::BodyReadError => "BODY_READ_ERROR",
            Outcome::ParseError => "PARSE_ERROR",
            Outcome::LocatorError => "LOCATOR_ERROR",
            Outcome::StreamNotFound => "STREAM_NOT_FOUND",
            Outcome::BuildError => "BUILD_ERROR",
            Outcome::NoDestination => "NO_DESTINATION",
            Outcome::Throttled => "THROTTLED",
            Outcome::DeliveryError => "DELIVERY_ERROR",
            Outcome::InternalFault => "INTERNAL_FAULT",
            Outcome::Delivered => "OK",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of an ingest request.
///
/// The string carried by each variant is the diagnostic detail; `Display`
/// prefixes it with the public description of the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// Content type is neither JSON nor plain text.
    #[error("invalid content type: {0}. Expected: application/json")]
    InvalidContentType(String),

    /// The request body could not be read. Detail includes the client IP.
    #[error("error reading HTTP body: {0}")]
    BodyRead(String),

    /// The body is not valid JSON. Detail echoes the raw body.
    #[error("error parsing message: {0}")]
    Parse(String),

    /// The request carries no usable identity (write key or host).
    #[error("error processing message: {0}")]
    Locator(String),

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// The canonical message could not be built.
    #[error("event error: {0}")]
    Build(String),

    /// The stream has neither async nor sync destinations. Reflects tenant
    /// setup, not a fault: not dead-lettered and counted as skipped.
    #[error("no destinations found for stream: {0}")]
    NoDestination(String),

    /// The broker refused the publish because of backpressure. Reported as
    /// SKIPPED rather than FAILED but still dead-lettered.
    #[error("throttled: {0}")]
    Throttled(String),

    /// A broker publish or synchronous destination failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// A runtime fault intercepted at the request boundary.
    #[error("internal fault: {0}")]
    InternalFault(String),
}

impl IngestError {
    pub fn outcome(&self) -> Outcome {
        match self {
            IngestError::InvalidContentType(_) => Outcome::InvalidContentType,
            IngestError::BodyRead(_) => Outcome::BodyReadError,
            IngestError::Parse(_) => Outcome::ParseError,
            IngestError::Locator(_) => Outcome::LocatorError,
            IngestError::StreamNotFound(_) => Outcome::StreamNotFound,
            IngestError::Build(_) => Outcome::BuildError,
            IngestError::NoDestination(_) => Outcome::NoDestination,
            IngestError::Throttled(_) => Outcome::Throttled,
            IngestError::Delivery(_) => Outcome::DeliveryError,
            IngestError::InternalFault(_) => Outcome::InternalFault,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::InvalidContentType(_) => 400,
            IngestError::InternalFault(_) => 500,
            _ => 200,
        }
    }

    /// Message safe to show to callers and the activity log. Fault details
    /// stay in logs and the dead-letter header.
    pub fn public_message(&self) -> String {
        match self {
            IngestError::InternalFault(_) => "internal fault".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, IngestError::Throttled(_))
    }

    pub fn is_no_destination(&self) -> bool {
        matches!(self, IngestError::NoDestination(_))
    }

    /// True for every true error; `NoDestination` is a skip, not an error.
    pub fn is_dead_lettered(&self) -> bool {
        !self.is_no_destination()
    }
}

/// Failure reading the request body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BodyReadError(pub String);

/// Failure resolving request identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LocatorError {
    #[error("write key is required for server-to-server requests")]
    MissingWriteKey,
    #[error("request has neither a write key nor a host")]
    MissingIdentity,
    #[error("malformed authorization header: {0}")]
    MalformedAuthorization(String),
    #[error("{0}")]
    Other(String),
}

/// Broker publish failure.
///
/// The throttled/delivery distinction is a typed variant chosen by the
/// producer adapter from a fixed set of broker codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("throttled: {0}")]
    Throttled(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Failure of a synchronous destination.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("sync destination {destination}: {message}")]
pub struct SyncError {
    pub destination: String,
    pub message: String,
}

/// Failure of a best-effort side channel. Always logged and swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SideChannelError {
    #[error("backup write failed: {0}")]
    Backup(String),
    #[error("activity log post failed: {0}")]
    ActivityLog(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_retry_policy() {
        assert_eq!(IngestError::InvalidContentType("application/xml".into()).status_code(), 400);
        assert_eq!(IngestError::InternalFault("boom".into()).status_code(), 500);
        for err in [
            IngestError::BodyRead("x".into()),
            IngestError::Parse("x".into()),
            IngestError::Locator("x".into()),
            IngestError::StreamNotFound("x".into()),
            IngestError::Build("x".into()),
            IngestError::NoDestination("x".into()),
            IngestError::Throttled("x".into()),
            IngestError::Delivery("x".into()),
        ] {
            assert_eq!(err.status_code(), 200, "{err}");
        }
    }

    #[test]
    fn fault_detail_is_not_public() {
        let err = IngestError::InternalFault("index out of bounds".into());
        assert_eq!(err.public_message(), "internal fault");
        assert!(err.to_string().contains("index out of bounds"));
    }

    #[test]
    fn messages_carry_detail() {
        let err = IngestError::InvalidContentType("application/xml".into());
        assert_eq!(
            err.to_string(),
            "invalid content type: application/xml. Expected: application/json"
        );
        assert_eq!(err.outcome().code(), "INVALID_CONTENT_TYPE");
    }
}
