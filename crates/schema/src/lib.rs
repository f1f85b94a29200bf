//! Event schema unification.
//!
//! Destination tables are fed untyped JSON. This crate turns a stream of
//! heterogeneous events into a stable, per-table column schema:
//!
//! - [`DataType`] is the concrete type set and its widening lattice.
//!   [`DataType::join`] is total, commutative, associative and idempotent.
//! - [`Field`] holds an inferred type plus an optional SQL type override.
//! - [`TypesHeader`] maps column names to fields in first-seen order and only
//!   ever adds or widens columns.
//! - [`SchemaRegistry`] keeps one header per table and serializes merges per
//!   table so concurrent ingesters never lose a widening.
//!
//! ## Example
//!
//! ```
//! use schema::{DataType, TypesHeader};
//! use serde_json::json;
//!
//! let mut header = TypesHeader::new("events");
//! assert!(!header.exists());
//!
//! header.observe(json!({"n": 1, "page": {"url": "/"}}).as_object().unwrap());
//! header.observe(json!({"n": 1.5}).as_object().unwrap());
//!
//! assert_eq!(header.field("n").unwrap().data_type(), DataType::Float64);
//! assert_eq!(header.field("page_url").unwrap().data_type(), DataType::String);
//! ```
mod field;
mod header;
mod registry;
mod types;

pub use crate::field::Field;
pub use crate::header::{
    sanitize_column_name, DatePartition, Fields, Granularity, TypesHeader, FLATTEN_SEPARATOR,
};
pub use crate::registry::SchemaRegistry;
pub use crate::types::{common_ancestor, DataType, SqlColumn};
