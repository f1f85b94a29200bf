//! Configuration types for the ingest router.
//!
//! [`RouterConfig`] names the broker topics the router publishes to and the
//! message id policy. It is cheap to clone and deserializes from any format
//! the server's config layer supports.
//!
//! # Quick Start
//!
//! ```rust
//! use ingest::RouterConfig;
//!
//! let config = RouterConfig::default();
//! config.validate().expect("Invalid configuration");
//! assert_eq!(config.dead_letter_topic, "destination-messages-dead-letter");
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for message ids, both caller-supplied and generated.
pub const MAX_MESSAGE_ID_LEN: usize = 64;

/// Runtime configuration for the ingest router.
///
/// # Serialization
///
/// ```json
/// {
///   "destinations_topic": "destination-messages",
///   "dead_letter_topic": "destination-messages-dead-letter",
///   "max_message_id_len": 64
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Topic every asynchronous destination is fed from. The destination id
    /// is the record key.
    ///
    /// Default: `"destination-messages"`
    pub destinations_topic: String,

    /// Topic receiving the original bytes of every failed request, with the
    /// error text in an `error` header.
    ///
    /// Default: `"destination-messages-dead-letter"`
    pub dead_letter_topic: String,

    /// Caller-supplied `messageId` values are truncated to this many
    /// characters. Must be between 1 and [`MAX_MESSAGE_ID_LEN`].
    ///
    /// Default: `64`
    pub max_message_id_len: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            destinations_topic: "destination-messages".to_string(),
            dead_letter_topic: "destination-messages-dead-letter".to_string(),
            max_message_id_len: MAX_MESSAGE_ID_LEN,
        }
    }
}

impl RouterConfig {
    /// Validates topic names and the message id bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destinations_topic.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "destinations_topic".into(),
                message: "must not be empty".into(),
            });
        }
        if self.dead_letter_topic.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "dead_letter_topic".into(),
                message: "must not be empty".into(),
            });
        }
        if self.dead_letter_topic == self.destinations_topic {
            return Err(ConfigError::InvalidValue {
                field: "dead_letter_topic".into(),
                message: "must differ from destinations_topic".into(),
            });
        }
        if self.max_message_id_len == 0 || self.max_message_id_len > MAX_MESSAGE_ID_LEN {
            return Err(ConfigError::InvalidValue {
                field: "max_message_id_len".into(),
                message: format!("must be within 1..={MAX_MESSAGE_ID_LEN}"),
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RouterConfig::default().validate().is_ok());
    }

    #[test]
    fn topics_must_differ() {
        let cfg = RouterConfig {
            dead_letter_topic: "destination-messages".into(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "dead_letter_topic"
        ));
    }

    #[test]
    fn message_id_bound_is_checked() {
        for len in [0, MAX_MESSAGE_ID_LEN + 1] {
            let cfg = RouterConfig {
                max_message_id_len: len,
                ..Default::default()
            };
            assert!(cfg.validate().is_err());
        }
    }
}
