//! The concrete type set and its widening lattice.
//!
//! Every JSON value observed by the gateway maps to exactly one [`DataType`].
//! Types form a small lattice with [`DataType::Unknown`] at the bottom and
//! [`DataType::String`] at the top:
//!
//! ```text
//!                    String
//!          ┌───────────┼────────────┐
//!       Float64    Timestamp       Json
//!          │           │            │
//!        Int64         │            │
//!          │           │            │
//!        Bool          │            │
//!          └───────────┼────────────┘
//!                   Unknown
//! ```
//!
//! [`DataType::join`] returns the least upper bound of two types. Types on
//! different chains meet only at `String`, which can hold the text rendering
//! of any value, so no information representable by either input is lost.
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inferred data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// JSON `null`, or no value seen yet. Identity element of [`DataType::join`].
    #[default]
    Unknown,
    Bool,
    Int64,
    Float64,
    Timestamp,
    String,
    /// Objects and arrays kept as serialized JSON.
    Json,
}

/// The chain a non-bottom, non-top type lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    Numeric,
    Temporal,
    Structured,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        DataType::Unknown,
        DataType::Bool,
        DataType::Int64,
        DataType::Float64,
        DataType::Timestamp,
        DataType::String,
        DataType::Json,
    ];

    fn chain(self) -> Option<(Chain, u8)> {
        match self {
            DataType::Bool => Some((Chain::Numeric, 1)),
            DataType::Int64 => Some((Chain::Numeric, 2)),
            DataType::Float64 => Some((Chain::Numeric, 3)),
            DataType::Timestamp => Some((Chain::Temporal, 1)),
            DataType::Json => Some((Chain::Structured, 1)),
            DataType::Unknown | DataType::String => None,
        }
    }

    /// Least upper bound of `self` and `other`.
    ///
    /// Total, commutative, associative and idempotent; `Unknown` is the
    /// identity and `String` absorbs everything.
    pub fn join(self, other: DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a,
            (DataType::Unknown, x) | (x, DataType::Unknown) => x,
            (DataType::String, _) | (_, DataType::String) => DataType::String,
            (a, b) => match (a.chain(), b.chain()) {
                (Some((ca, ra)), Some((cb, rb))) if ca == cb => {
                    if ra >= rb {
                        a
                    } else {
                        b
                    }
                }
                _ => DataType::String,
            },
        }
    }

    /// True when `self` is `prior` or a widening of it.
    pub fn is_widening_of(self, prior: DataType) -> bool {
        prior.join(self) == self
    }

    /// Infers the type of a single JSON value. Never fails: values that do not
    /// fit a narrower type land on the most general compatible one.
    pub fn infer(value: &Value) -> DataType {
        match value {
            Value::Null => DataType::Unknown,
            Value::Bool(_) => DataType::Bool,
            Value::Number(n) => {
                if n.is_i64() {
                    DataType::Int64
                } else {
                    // u64 above i64::MAX and every float.
                    DataType::Float64
                }
            }
            Value::String(s) => {
                if looks_like_timestamp(s) {
                    DataType::Timestamp
                } else {
                    DataType::String
                }
            }
            Value::Array(_) | Value::Object(_) => DataType::Json,
        }
    }

    /// Default SQL type used when no override is configured.
    pub fn default_sql_type(self) -> &'static str {
        match self {
            DataType::Bool => "boolean",
            DataType::Int64 => "bigint",
            DataType::Float64 => "double precision",
            DataType::Timestamp => "timestamp with time zone",
            DataType::Json => "json",
            DataType::String | DataType::Unknown => "text",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Unknown => "unknown",
            DataType::Bool => "bool",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Timestamp => "timestamp",
            DataType::String => "string",
            DataType::Json => "json",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Joins every type in `types`; an empty input yields `Unknown`.
pub fn common_ancestor<I>(types: I) -> DataType
where
    I: IntoIterator<Item = DataType>,
{
    types.into_iter().fold(DataType::Unknown, DataType::join)
}

fn looks_like_timestamp(s: &str) -> bool {
    // Cheap pre-check: every accepted form starts with YYYY-MM-DD.
    let b = s.as_bytes();
    if b.len() < 19 || b[4] != b'-' || b[7] != b'-' || !(b[10] == b'T' || b[10] == b' ') {
        return false;
    }
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}

/// SQL column type suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SqlColumn {
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ddl_type: String,
    /// Trust this column over inference.
    #[serde(default)]
    pub r#override: bool,
}

impl SqlColumn {
    pub fn new(sql_type: impl Into<String>) -> Self {
        let sql_type = sql_type.into();
        Self {
            ddl_type: sql_type.clone(),
            sql_type,
            r#override: false,
        }
    }

    pub fn with_ddl(sql_type: impl Into<String>, ddl_type: impl Into<String>) -> Self {
        Self {
            sql_type: sql_type.into(),
            ddl_type: ddl_type.into(),
            r#override: false,
        }
    }
}
