use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Constraint kind (`min_value`, `max_length`, ...) to its value.
pub type Constraints = BTreeMap<String, serde_json::Value>;

/// One table as read from the live catalog. Rebuilt on every introspection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TableSchema {
    pub table_name: String,
    pub comment: Option<String>,
    pub columns: Vec<ColumnSchema>,
    pub indexes: Vec<IndexSchema>,
    pub foreign_keys: Vec<ForeignKeySchema>,
    pub primary_key: Option<Vec<String>>,
    pub engine: Option<String>,
    pub collation: Option<String>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub is_unsigned: bool,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    pub auto_increment: bool,
    pub enum_values: Option<Vec<String>>,
    pub constraints: Constraints,
}

impl ColumnSchema {
    /// Enum/set members, if the column has any.
    pub fn enum_values(&self) -> &[String] {
        self.enum_values.as_deref().unwrap_or_default()
    }

    pub fn is_boolean_like(&self) -> bool {
        self.data_type == "boolean" || self.data_type == "tinyint"
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForeignKeySchema {
    pub name: String,
    pub columns: Vec<String>,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}
