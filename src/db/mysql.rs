use std::sync::LazyLock;

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde_json::{json, Value};
use sqlx::{mysql::MySqlPoolOptions, mysql::MySqlRow, MySqlPool, Row};

use crate::{
    errors::DocError,
    models::{
        connections::ConnectionConfig,
        schema::{ColumnSchema, Constraints, ForeignKeySchema, IndexSchema, TableSchema},
    },
};

use super::DbClient;

static ENUM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:enum|set)\((.*)\)$").unwrap());
static INTEGER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(tinyint|smallint|mediumint|int|bigint)\b").unwrap());
static DECIMAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^decimal\((\d+),(\d+)\)").unwrap());

const PRIMARY_INDEX: &str = "PRIMARY";

pub struct MySqlClient {
    pub pool: MySqlPool,
    schema: String,
}

impl MySqlClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DocError> {
        let schema = config.schema_name()?.ok_or_else(|| {
            DocError::Config("no database selected; set DB_DATABASE or add it to the URL".into())
        })?;

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DocError::Connection(e.to_string()))?;

        Ok(Self { pool, schema })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn table_row(&self, table_name: &str) -> Result<Option<MySqlRow>, DocError> {
        let query = r#"
            SELECT
                CAST(TABLE_COMMENT AS CHAR) AS table_comment,
                CAST(ENGINE AS CHAR) AS engine,
                CAST(TABLE_COLLATION AS CHAR) AS table_collation
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;
        let row = sqlx::query(query)
            .bind(&self.schema)
            .bind(table_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn raw_columns(&self, table_name: &str) -> Result<Vec<RawColumn>, DocError> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(DATA_TYPE AS CHAR) AS data_type,
                CAST(COLUMN_TYPE AS CHAR) AS column_type,
                CAST(IS_NULLABLE AS CHAR) AS is_nullable,
                CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
                CAST(COLUMN_COMMENT AS CHAR) AS column_comment,
                CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
                CAST(NUMERIC_PRECISION AS SIGNED) AS numeric_precision,
                CAST(NUMERIC_SCALE AS SIGNED) AS numeric_scale,
                CAST(EXTRA AS CHAR) AS extra
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        let rows = sqlx::query(query)
            .bind(&self.schema)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<RawColumn, DocError> {
                Ok(RawColumn {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    column_type: row.try_get("column_type")?,
                    is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    default: row.try_get("column_default")?,
                    comment: row.try_get("column_comment")?,
                    max_length: row.try_get("max_length")?,
                    precision: row.try_get("numeric_precision")?,
                    scale: row.try_get("numeric_scale")?,
                    extra: row.try_get::<Option<String>, _>("extra")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// CHECK constraints of the table. Servers without CHECK support (MySQL
    /// before 8.0.16) have no such view; that yields an empty list.
    async fn check_constraints(&self, table_name: &str) -> Vec<CheckConstraint> {
        let query = r#"
            SELECT
                CAST(cc.CONSTRAINT_NAME AS CHAR) AS constraint_name,
                CAST(cc.CHECK_CLAUSE AS CHAR) AS check_clause
            FROM information_schema.CHECK_CONSTRAINTS cc
            JOIN information_schema.TABLE_CONSTRAINTS tc
                ON cc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                AND cc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
            WHERE tc.TABLE_SCHEMA = ? AND tc.TABLE_NAME = ?
        "#;
        let rows = match sqlx::query(query)
            .bind(&self.schema)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                debug!("CHECK constraints unavailable for {}: {}", table_name, e);
                return Vec::new();
            }
        };

        rows.iter()
            .filter_map(|row| {
                Some(CheckConstraint {
                    name: row.try_get("constraint_name").ok()?,
                    clause: row.try_get("check_clause").ok()?,
                })
            })
            .collect()
    }

    async fn indexes(&self, table_name: &str) -> Result<Vec<IndexSchema>, DocError> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR) AS index_name,
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(NON_UNIQUE AS SIGNED) AS non_unique
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;
        let rows = sqlx::query(query)
            .bind(&self.schema)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        let rows = rows
            .iter()
            .map(|row| -> Result<IndexRow, DocError> {
                Ok(IndexRow {
                    index_name: row.try_get("index_name")?,
                    // Functional index parts have no column.
                    column_name: row.try_get::<Option<String>, _>("column_name")?.unwrap_or_default(),
                    non_unique: row.try_get::<i64, _>("non_unique")? != 0,
                })
            })
            .collect::<Result<Vec<_>, DocError>>()?;

        Ok(group_indexes(rows))
    }

    async fn foreign_keys(&self, table_name: &str) -> Result<Vec<ForeignKeySchema>, DocError> {
        let query = r#"
            SELECT
                CAST(kcu.CONSTRAINT_NAME AS CHAR) AS constraint_name,
                CAST(kcu.COLUMN_NAME AS CHAR) AS column_name,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column,
                CAST(rc.DELETE_RULE AS CHAR) AS delete_rule,
                CAST(rc.UPDATE_RULE AS CHAR) AS update_rule
            FROM information_schema.KEY_COLUMN_USAGE kcu
            JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
                ON kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME
                AND kcu.CONSTRAINT_SCHEMA = rc.CONSTRAINT_SCHEMA
            WHERE kcu.TABLE_SCHEMA = ?
            AND kcu.TABLE_NAME = ?
            AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;
        let rows = sqlx::query(query)
            .bind(&self.schema)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        let rows = rows
            .iter()
            .map(|row| -> Result<ForeignKeyRow, DocError> {
                Ok(ForeignKeyRow {
                    constraint_name: row.try_get("constraint_name")?,
                    column_name: row.try_get("column_name")?,
                    referenced_table: row.try_get("referenced_table")?,
                    referenced_column: row.try_get("referenced_column")?,
                    delete_rule: row.try_get("delete_rule")?,
                    update_rule: row.try_get("update_rule")?,
                })
            })
            .collect::<Result<Vec<_>, DocError>>()?;

        Ok(group_foreign_keys(rows))
    }
}

#[async_trait]
impl DbClient for MySqlClient {
    async fn list_tables(&self) -> Result<Vec<String>, DocError> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS table_name
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
        "#;
        let rows = sqlx::query(query)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(DocError::Sqlx))
            .collect()
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DocError> {
        let table_row = self.table_row(table_name).await?.ok_or_else(|| {
            DocError::Introspection(format!(
                "table {} not found in schema {}",
                table_name, self.schema
            ))
        })?;

        let checks = self.check_constraints(table_name).await;
        let columns = self
            .raw_columns(table_name)
            .await?
            .into_iter()
            .map(|raw| build_column(raw, &checks))
            .collect();
        let indexes = self.indexes(table_name).await?;
        let primary_key = indexes
            .iter()
            .find(|index| index.is_primary)
            .map(|index| index.columns.clone());

        Ok(TableSchema {
            table_name: table_name.to_string(),
            comment: non_empty(table_row.try_get("table_comment")?),
            columns,
            indexes,
            foreign_keys: self.foreign_keys(table_name).await?,
            primary_key,
            engine: table_row.try_get("engine")?,
            collation: table_row.try_get("table_collation")?,
        })
    }
}

/// One row of `information_schema.COLUMNS`.
#[derive(Debug, Clone, Default)]
struct RawColumn {
    name: String,
    data_type: String,
    column_type: String,
    is_nullable: bool,
    default: Option<String>,
    comment: Option<String>,
    max_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
    extra: String,
}

#[derive(Debug, Clone)]
struct CheckConstraint {
    name: String,
    clause: String,
}

#[derive(Debug, Clone)]
struct IndexRow {
    index_name: String,
    column_name: String,
    non_unique: bool,
}

#[derive(Debug, Clone)]
struct ForeignKeyRow {
    constraint_name: String,
    column_name: String,
    referenced_table: String,
    referenced_column: String,
    delete_rule: Option<String>,
    update_rule: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn build_column(raw: RawColumn, checks: &[CheckConstraint]) -> ColumnSchema {
    let column_type = raw.column_type.to_lowercase();
    let data_type = if column_type.starts_with("enum") {
        "enum".to_string()
    } else if column_type.starts_with("set") {
        "set".to_string()
    } else {
        raw.data_type
    };

    let enum_values = if data_type == "enum" || data_type == "set" {
        Some(parse_enum_values(&raw.column_type)).filter(|values| !values.is_empty())
    } else {
        None
    };

    let column_checks: Vec<&CheckConstraint> = checks
        .iter()
        .filter(|check| check.clause.contains(&raw.name))
        .collect();
    let constraints = column_constraints(&raw.column_type, raw.max_length, &column_checks);

    ColumnSchema {
        name: raw.name,
        data_type,
        length: raw.max_length,
        precision: raw.precision,
        scale: raw.scale,
        is_unsigned: column_type.contains("unsigned"),
        is_nullable: raw.is_nullable,
        default: raw.default,
        comment: non_empty(raw.comment),
        auto_increment: raw.extra.to_lowercase().contains("auto_increment"),
        enum_values,
        constraints,
    }
}

/// Members of an `enum('a','b')` or `set(...)` column type. A doubled quote
/// inside a member is a literal quote.
fn parse_enum_values(column_type: &str) -> Vec<String> {
    let Some(captures) = ENUM_PATTERN.captures(column_type.trim()) else {
        return Vec::new();
    };

    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = captures[1].chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quotes && chars.peek() == Some(&'\'') => {
                current.push('\'');
                chars.next();
            }
            '\'' => in_quotes = !in_quotes,
            ',' if !in_quotes => values.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    values.push(current.trim().to_string());

    values
}

/// Value ranges and limits implied by the column type.
fn column_constraints(
    column_type: &str,
    max_length: Option<i64>,
    checks: &[&CheckConstraint],
) -> Constraints {
    let mut constraints = Constraints::new();

    if let Some(captures) = INTEGER_PATTERN.captures(column_type) {
        let unsigned = column_type.to_lowercase().contains("unsigned");
        if let Some((min, max)) = integer_range(&captures[1].to_lowercase(), unsigned) {
            constraints.insert("min_value".to_string(), min);
            constraints.insert("max_value".to_string(), max);
        }
    }

    if let Some(captures) = DECIMAL_PATTERN.captures(column_type) {
        let precision: u32 = captures[1].parse().unwrap_or_default();
        let scale: u32 = captures[2].parse().unwrap_or_default();
        let integral = "9".repeat(precision.saturating_sub(scale) as usize);
        let max_value = if scale == 0 {
            integral
        } else {
            format!("{}.{}", integral, "9".repeat(scale as usize))
        };

        constraints.insert("min_value".to_string(), json!(format!("-{}", max_value)));
        constraints.insert("max_value".to_string(), json!(max_value));
        constraints.insert("precision".to_string(), json!(precision));
        constraints.insert("scale".to_string(), json!(scale));
    }

    if let Some(length) = max_length.filter(|length| *length > 0) {
        constraints.insert("max_length".to_string(), json!(length));
    }

    if !checks.is_empty() {
        let checks: Vec<Value> = checks
            .iter()
            .map(|check| json!({ "name": check.name, "clause": check.clause }))
            .collect();
        constraints.insert("check_constraints".to_string(), Value::Array(checks));
    }

    constraints
}

/// Bigint bounds do not fit every consumer's number type, so they are strings.
fn integer_range(base_type: &str, unsigned: bool) -> Option<(Value, Value)> {
    let range = match (base_type, unsigned) {
        ("tinyint", false) => (json!(-128), json!(127)),
        ("tinyint", true) => (json!(0), json!(255)),
        ("smallint", false) => (json!(-32768), json!(32767)),
        ("smallint", true) => (json!(0), json!(65535)),
        ("mediumint", false) => (json!(-8388608), json!(8388607)),
        ("mediumint", true) => (json!(0), json!(16777215)),
        ("int", false) => (json!(-2147483648i64), json!(2147483647)),
        ("int", true) => (json!(0), json!(4294967295u64)),
        ("bigint", false) => (
            json!("-9223372036854775808"),
            json!("9223372036854775807"),
        ),
        ("bigint", true) => (json!(0), json!("18446744073709551615")),
        _ => return None,
    };
    Some(range)
}

fn group_indexes(rows: Vec<IndexRow>) -> Vec<IndexSchema> {
    let mut indexes: Vec<IndexSchema> = Vec::new();

    for row in rows {
        match indexes.iter_mut().find(|index| index.name == row.index_name) {
            Some(index) => index.columns.push(row.column_name),
            None => indexes.push(IndexSchema {
                is_primary: row.index_name == PRIMARY_INDEX,
                is_unique: !row.non_unique,
                name: row.index_name,
                columns: vec![row.column_name],
            }),
        }
    }

    indexes
}

fn group_foreign_keys(rows: Vec<ForeignKeyRow>) -> Vec<ForeignKeySchema> {
    let mut keys: Vec<ForeignKeySchema> = Vec::new();

    for row in rows {
        let position = match keys.iter().position(|key| key.name == row.constraint_name) {
            Some(position) => position,
            None => {
                keys.push(ForeignKeySchema {
                    name: row.constraint_name,
                    columns: Vec::new(),
                    foreign_table: row.referenced_table,
                    foreign_columns: Vec::new(),
                    on_delete: row.delete_rule,
                    on_update: row.update_rule,
                });
                keys.len() - 1
            }
        };
        keys[position].columns.push(row.column_name);
        keys[position].foreign_columns.push(row.referenced_column);
    }

    keys
}
