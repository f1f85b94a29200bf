//! Concurrent per-table schema store.
//!
//! Many ingest tasks observe events for the same table at once. Each merge
//! runs while holding that table's map shard, so two concurrent widenings of
//! the same column cannot overwrite each other.
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::field::Field;
use crate::header::TypesHeader;
use crate::types::{DataType, SqlColumn};

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: DashMap<String, TypesHeader>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens `object` into `table`'s header.
    pub fn observe(&self, table: &str, object: &Map<String, Value>) {
        let mut header = self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| TypesHeader::new(table));
        header.observe(object);
    }

    /// Merges a whole header, e.g. one built off-line for a batch.
    pub fn merge(&self, header: &TypesHeader) {
        let mut existing = self
            .tables
            .entry(header.table_name.clone())
            .or_insert_with(|| TypesHeader::new(header.table_name.clone()));
        existing.merge(header);
    }

    /// Pins a column's SQL type. Inference keeps widening the data type, but
    /// the column is created with `column`.
    pub fn set_override(&self, table: &str, field: &str, data_type: DataType, column: SqlColumn) {
        let mut header = self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| TypesHeader::new(table));
        match header.fields.get_mut(field) {
            Some(existing) => {
                let mut pinned = Field::with_sql_type(existing.data_type(), column);
                pinned.merge(data_type);
                *existing = pinned;
            }
            None => {
                header
                    .fields
                    .insert(field.to_string(), Field::with_sql_type(data_type, column));
            }
        }
    }

    /// Copy of the table's header. Headers without fields are treated as absent.
    pub fn snapshot(&self, table: &str) -> Option<TypesHeader> {
        self.tables
            .get(table)
            .filter(|h| h.exists())
            .map(|h| h.value().clone())
    }

    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_tables_are_not_reported() {
        let reg = SchemaRegistry::new();
        reg.observe("t", &Map::new());
        assert!(reg.snapshot("t").is_none());
        reg.observe("t", &obj(json!({"a": 1})));
        assert!(reg.snapshot("t").is_some());
    }

    #[test]
    fn override_is_pinned_and_type_still_widens() {
        let reg = SchemaRegistry::new();
        reg.observe("t", &obj(json!({"price": 1})));
        reg.set_override("t", "price", DataType::Int64, SqlColumn::new("numeric(10,2)"));
        reg.observe("t", &obj(json!({"price": 2.5})));

        let h = reg.snapshot("t").expect("table");
        let f = h.field("price").expect("field");
        assert_eq!(f.data_type(), DataType::Float64);
        let (column, is_override) = f.suggested_sql_type();
        assert!(is_override);
        assert_eq!(column.sql_type, "numeric(10,2)");
    }

    #[test]
    fn merge_header_into_registry() {
        let reg = SchemaRegistry::new();
        let mut h = TypesHeader::new("batch");
        h.merge_field("x", Field::new(DataType::Bool));
        reg.merge(&h);
        reg.observe("batch", &obj(json!({"x": 10})));
        assert_eq!(
            reg.snapshot("batch").and_then(|h| h.field("x").map(Field::data_type)),
            Some(DataType::Int64)
        );
        assert_eq!(reg.tables(), vec!["batch".to_string()]);
    }
}
