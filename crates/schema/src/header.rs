//! Per-table schema built from observed events.
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::field::Field;
use crate::types::DataType;

/// Separator used when flattening nested objects into column names.
pub const FLATTEN_SEPARATOR: &str = "_";

/// Ordered field-name → [`Field`] mapping.
pub type Fields = IndexMap<String, Field>;

/// Time bucket size of a date partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    /// Truncates `ts` to the start of its bucket.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let (year, month, day, hour) = match self {
            Granularity::Hour => (ts.year(), ts.month(), ts.day(), ts.hour()),
            Granularity::Day => (ts.year(), ts.month(), ts.day(), 0),
            Granularity::Month => (ts.year(), ts.month(), 1, 0),
            Granularity::Quarter => (ts.year(), (ts.month() - 1) / 3 * 3 + 1, 1, 0),
            Granularity::Year => (ts.year(), 1, 1, 0),
        };
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .map(|naive| naive.and_utc())
            .unwrap_or(ts)
    }
}

/// Describes which date bucket a batch of rows belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatePartition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<DateTime<Utc>>,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<String>,
}

impl DatePartition {
    pub fn for_timestamp(field: &str, ts: DateTime<Utc>, granularity: Granularity) -> Self {
        let value = granularity.truncate(ts);
        let partition_id = format!(
            "{field}_{}_{}",
            granularity.as_str(),
            value.format("%Y%m%d%H")
        );
        Self {
            field: Some(field.to_string()),
            value: Some(value),
            granularity,
            partition_id: Some(partition_id),
        }
    }
}

/// Schema result of parsing JSON objects for one table.
///
/// Fields are only added or widened, never removed or narrowed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypesHeader {
    pub table_name: String,
    pub fields: Fields,
    #[serde(default)]
    pub partition: DatePartition,
}

impl TypesHeader {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: Fields::new(),
            partition: DatePartition::default(),
        }
    }

    /// True if there is at least one field.
    pub fn exists(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Inserts `field` or joins it into the existing one. New names are
    /// appended, so column order follows first appearance.
    pub fn merge_field(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.get_mut(&name) {
            Some(existing) => {
                let before = existing.data_type();
                if existing.merge_field(&field) {
                    tracing::debug!(
                        table = %self.table_name,
                        field = %name,
                        from = %before,
                        to = %existing.data_type(),
                        "field_widened"
                    );
                }
            }
            None => {
                self.fields.insert(name, field);
            }
        }
    }

    /// Merges an observed value's type into column `name`.
    pub fn merge_value(&mut self, name: impl Into<String>, value: &Value) {
        self.merge_field(name, Field::new(DataType::infer(value)));
    }

    /// Flattens `object` and merges every leaf into the header.
    pub fn observe(&mut self, object: &Map<String, Value>) {
        self.observe_prefixed("", object);
    }

    fn observe_prefixed(&mut self, prefix: &str, object: &Map<String, Value>) {
        for (key, value) in object {
            let name = if prefix.is_empty() {
                sanitize_column_name(key)
            } else {
                format!("{prefix}{FLATTEN_SEPARATOR}{}", sanitize_column_name(key))
            };
            match value {
                Value::Object(inner) if !inner.is_empty() => self.observe_prefixed(&name, inner),
                other => self.merge_value(name, other),
            }
        }
    }

    /// Merges every field of `other` into `self`.
    pub fn merge(&mut self, other: &TypesHeader) {
        for (name, field) in &other.fields {
            self.merge_field(name.clone(), field.clone());
        }
    }
}

/// Lower-cases `name` and replaces anything outside `[a-z0-9_]` with `_`.
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
