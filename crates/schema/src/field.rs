use serde::{Deserialize, Serialize};

use crate::types::{DataType, SqlColumn};

/// A data type holder with an optional SQL type suggestion.
///
/// The inferred type only ever widens through [`Field::merge`]. A suggestion
/// supplied at construction is reported as an override and survives merges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Field {
    data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suggested_type: Option<SqlColumn>,
}

impl Field {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            suggested_type: None,
        }
    }

    pub fn with_sql_type(data_type: DataType, suggested_type: SqlColumn) -> Self {
        Self {
            data_type,
            suggested_type: Some(suggested_type),
        }
    }

    /// Returns the configured SQL type, flagged as an override, or the zero
    /// value and `false` when none was supplied.
    pub fn suggested_sql_type(&self) -> (SqlColumn, bool) {
        match &self.suggested_type {
            Some(s) => (
                SqlColumn {
                    sql_type: s.sql_type.clone(),
                    ddl_type: s.ddl_type.clone(),
                    r#override: true,
                },
                true,
            ),
            None => (SqlColumn::default(), false),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// SQL type to create the column with: the override when present,
    /// otherwise the inferred type's default.
    pub fn sql_type(&self) -> String {
        match &self.suggested_type {
            Some(s) => s.sql_type.clone(),
            None => self.data_type.default_sql_type().to_string(),
        }
    }

    /// Widens the field to cover `observed`. Returns true when the type changed.
    pub fn merge(&mut self, observed: DataType) -> bool {
        let joined = self.data_type.join(observed);
        let changed = joined != self.data_type;
        self.data_type = joined;
        changed
    }

    /// Merges another field for the same column. Our suggestion wins; the
    /// other's is adopted only when we have none.
    pub fn merge_field(&mut self, other: &Field) -> bool {
        if self.suggested_type.is_none() && other.suggested_type.is_some() {
            self.suggested_type = other.suggested_type.clone();
        }
        self.merge(other.data_type)
    }

    pub fn has_override(&self) -> bool {
        self.suggested_type.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_field_has_no_suggestion() {
        let f = Field::new(DataType::Int64);
        assert_eq!(f.suggested_sql_type(), (SqlColumn::default(), false));
        assert_eq!(f.sql_type(), "bigint");
    }

    #[test]
    fn suggestion_is_always_an_override() {
        let f = Field::with_sql_type(DataType::String, SqlColumn::new("varchar(255)"));
        let (col, ok) = f.suggested_sql_type();
        assert!(ok);
        assert!(col.r#override);
        assert_eq!(col.sql_type, "varchar(255)");
        assert_eq!(col.ddl_type, "varchar(255)");
    }

    #[test]
    fn merge_widens_and_keeps_suggestion() {
        let mut f = Field::with_sql_type(DataType::Int64, SqlColumn::new("numeric(38,0)"));
        assert!(f.merge(DataType::Float64));
        assert!(!f.merge(DataType::Int64));
        assert_eq!(f.data_type(), DataType::Float64);
        assert_eq!(f.sql_type(), "numeric(38,0)");
    }

    #[test]
    fn merge_field_adopts_missing_suggestion() {
        let mut f = Field::new(DataType::Bool);
        let other = Field::with_sql_type(DataType::Int64, SqlColumn::new("smallint"));
        f.merge_field(&other);
        assert_eq!(f.data_type(), DataType::Int64);
        assert!(f.has_override());

        let mut g = Field::with_sql_type(DataType::Bool, SqlColumn::new("boolean"));
        g.merge_field(&other);
        assert_eq!(g.sql_type(), "boolean");
    }
}
