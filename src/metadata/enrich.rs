use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::comment::parse_comment;
use crate::models::{
    metadata::{ColumnMetadata, GlobalSettings, MetadataStore, Reference},
    schema::{ColumnSchema, ForeignKeySchema, IndexSchema, TableSchema},
};

/// Labels shown for boolean-like columns that have none of their own.
pub const DEFAULT_BOOLEAN_LABELS: [(&str, &str); 2] = [("true", "Enabled"), ("false", "Disabled")];

static TYPE_ARGS_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(.*\)").unwrap());

/// A table ready for rendering: the introspected shape plus annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTable {
    pub table_name: String,
    pub comment: Option<String>,
    pub logical_name: Option<String>,
    pub description: Option<String>,
    pub columns: Vec<EnrichedColumn>,
    pub indexes: Vec<IndexSchema>,
    pub foreign_keys: Vec<ForeignKeySchema>,
    pub primary_key: Option<Vec<String>>,
    pub engine: Option<String>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedColumn {
    /// Introspected column; `constraints` already include annotated ones.
    #[serde(flatten)]
    pub column: ColumnSchema,
    pub logical_name: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    pub type_label: String,
}

/// Read-only view that projects store annotations onto introspected tables.
pub struct Enricher<'a> {
    store: &'a MetadataStore,
    settings: Option<&'a GlobalSettings>,
}

impl<'a> Enricher<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Enricher {
            store,
            settings: store.settings.as_ref(),
        }
    }

    pub fn enrich_table_info(&self, table: TableSchema) -> EnrichedTable {
        let table_name = table.table_name;
        let meta = self.store.table(&table_name);

        let (logical_name, description) = with_comment_fallback(
            meta.and_then(|m| m.logical_name.clone()),
            meta.and_then(|m| m.description.clone()),
            table.comment.as_deref(),
        );

        let columns = table
            .columns
            .into_iter()
            .map(|column| self.enrich_column(&table_name, column))
            .collect();

        EnrichedTable {
            table_name,
            comment: table.comment,
            logical_name,
            description,
            columns,
            indexes: table.indexes,
            foreign_keys: table.foreign_keys,
            primary_key: table.primary_key,
            engine: table.engine,
            collation: table.collation,
        }
    }

    fn enrich_column(&self, table_name: &str, mut column: ColumnSchema) -> EnrichedColumn {
        let meta = self.store.column(table_name, &column.name);
        let common = self
            .settings
            .and_then(|settings| settings.common_columns.get(&column.name));

        let (logical_name, description) = with_comment_fallback(
            lookup(meta, common, |m| m.logical_name.as_ref()),
            lookup(meta, common, |m| m.description.as_ref()),
            column.comment.as_deref(),
        );

        let enum_labels = if column.enum_values().is_empty() {
            None
        } else {
            meta.and_then(|m| m.enum_labels.clone())
                .filter(|labels| !labels.is_empty())
        };

        let boolean_labels = column.is_boolean_like().then(|| {
            meta.and_then(|m| m.boolean_labels.clone())
                .unwrap_or_else(default_boolean_labels)
        });

        if let Some(extra) = meta.and_then(|m| m.constraints.as_ref()) {
            column
                .constraints
                .extend(extra.iter().map(|(k, v)| (k.clone(), toml_to_json(v))));
        }

        let type_label = self.type_label(&column.data_type);

        EnrichedColumn {
            logical_name,
            description,
            enum_labels,
            boolean_labels,
            reference: meta.and_then(|m| m.references.clone()),
            type_label,
            column,
        }
    }

    /// Localized label for a type, looked up without its `(length)` suffix.
    pub fn type_label(&self, data_type: &str) -> String {
        let base_type = TYPE_ARGS_PATTERN
            .replace_all(&data_type.to_lowercase(), "")
            .into_owned();

        self.settings
            .and_then(|settings| settings.type_labels.get(&base_type))
            .cloned()
            .unwrap_or_else(|| data_type.to_string())
    }
}

/// Column annotation first, then the common-column default.
fn lookup<'m>(
    meta: Option<&'m ColumnMetadata>,
    common: Option<&'m ColumnMetadata>,
    field: impl Fn(&'m ColumnMetadata) -> Option<&'m String>,
) -> Option<String> {
    meta.and_then(&field)
        .filter(|value| !value.is_empty())
        .or_else(|| common.and_then(&field))
        .cloned()
}

/// Fills a blank name/description pair from the raw catalog comment.
fn with_comment_fallback(
    logical_name: Option<String>,
    description: Option<String>,
    comment: Option<&str>,
) -> (Option<String>, Option<String>) {
    let blank = |value: &Option<String>| value.as_deref().map_or(true, str::is_empty);

    if !blank(&logical_name) || !blank(&description) || comment.map_or(true, str::is_empty) {
        return (logical_name, description);
    }

    let parsed = parse_comment(comment);
    (Some(parsed.logical_name), Some(parsed.description))
}

/// Annotated constraints are stored as TOML but rendered next to the
/// introspected ones as JSON. Datetimes become their RFC 3339 text.
fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        toml::Value::String(s) => Json::String(s.clone()),
        toml::Value::Integer(i) => Json::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(f.to_string())),
        toml::Value::Boolean(b) => Json::Bool(*b),
        toml::Value::Datetime(dt) => Json::String(dt.to_string()),
        toml::Value::Array(items) => Json::Array(items.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Json::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}

fn default_boolean_labels() -> BTreeMap<String, String> {
    DEFAULT_BOOLEAN_LABELS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STORE: &str = r#"
[tables.users]
logical_name = "Users"
description = "People who can log in"

[tables.users.columns.email]
logical_name = "Email"
description = ""
constraints = { format = "email", max_length = 191 }
references = { table = "contacts", column = "email", label = "Contact" }

[tables.users.columns.role]
logical_name = "Role"
enum_labels = { admin = "Administrator", member = "Member" }

[tables.users.columns.active]
boolean_labels = { "true" = "Yes", "false" = "No" }

[tables.users.columns.notes]
logical_name = ""
description = ""

[settings.common_columns.created_at]
logical_name = "Created at"
description = "When the record was created"

[settings.type_labels]
varchar = "Text"
"#;

    fn store() -> MetadataStore {
        toml::from_str(STORE).unwrap()
    }

    fn column(name: &str, data_type: &str) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            data_type: data_type.to_string(),
            ..Default::default()
        }
    }

    fn users(columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema {
            table_name: "users".to_string(),
            comment: Some("Ignored|Because metadata exists".to_string()),
            columns,
            ..Default::default()
        }
    }

    #[test]
    fn test_table_annotations() {
        let store = store();
        let enriched = Enricher::new(&store).enrich_table_info(users(vec![]));
        assert_eq!(enriched.logical_name.as_deref(), Some("Users"));
        assert_eq!(enriched.description.as_deref(), Some("People who can log in"));
    }

    #[test]
    fn test_unknown_table_falls_back_to_comment() {
        let store = store();
        let table = TableSchema {
            table_name: "audit_log".to_string(),
            comment: Some("Audit log|Every change".to_string()),
            ..Default::default()
        };
        let enriched = Enricher::new(&store).enrich_table_info(table);
        assert_eq!(enriched.logical_name.as_deref(), Some("Audit log"));
        assert_eq!(enriched.description.as_deref(), Some("Every change"));
    }

    #[test]
    fn test_common_column_fallback() {
        let store = store();
        let enriched =
            Enricher::new(&store).enrich_table_info(users(vec![column("created_at", "timestamp")]));
        let created = &enriched.columns[0];
        assert_eq!(created.logical_name.as_deref(), Some("Created at"));
        assert_eq!(created.description.as_deref(), Some("When the record was created"));
    }

    #[test]
    fn test_blank_metadata_uses_comment() {
        let store = store();
        let mut notes = column("notes", "text");
        notes.comment = Some("Notes|Free text".to_string());

        let enriched = Enricher::new(&store).enrich_table_info(users(vec![notes]));
        assert_eq!(enriched.columns[0].logical_name.as_deref(), Some("Notes"));
        assert_eq!(enriched.columns[0].description.as_deref(), Some("Free text"));
    }

    #[test]
    fn test_comment_ignored_when_name_present() {
        let store = store();
        let mut email = column("email", "varchar");
        email.comment = Some("Mail|From catalog".to_string());

        let enriched = Enricher::new(&store).enrich_table_info(users(vec![email]));
        assert_eq!(enriched.columns[0].logical_name.as_deref(), Some("Email"));
        assert_eq!(enriched.columns[0].description.as_deref(), Some(""));
    }

    #[test]
    fn test_constraints_merged_and_reference() {
        let store = store();
        let mut email = column("email", "varchar(191)");
        email.constraints.insert("max_length".to_string(), json!(255));
        email.constraints.insert("min_length".to_string(), json!(3));

        let enriched = Enricher::new(&store).enrich_table_info(users(vec![email]));
        let email = &enriched.columns[0];
        assert_eq!(email.column.constraints["max_length"], json!(191));
        assert_eq!(email.column.constraints["min_length"], json!(3));
        assert_eq!(email.column.constraints["format"], json!("email"));
        assert_eq!(email.reference.as_ref().unwrap().label.as_deref(), Some("Contact"));
        assert_eq!(email.type_label, "Text");
    }

    #[test]
    fn test_annotated_constraints_render_as_plain_json() {
        let raw = r#"
[tables.users.columns.born_on]
constraints = { not_after = 2026-01-01, step = 0.5, allowed_years = [2000, 2001] }
"#;
        let store: MetadataStore = toml::from_str(raw).unwrap();
        let enriched = Enricher::new(&store).enrich_table_info(users(vec![column("born_on", "date")]));

        let constraints = &enriched.columns[0].column.constraints;
        assert_eq!(constraints["not_after"], json!("2026-01-01"));
        assert_eq!(constraints["step"], json!(0.5));
        assert_eq!(constraints["allowed_years"], json!([2000, 2001]));
    }

    #[test]
    fn test_enum_labels_only_for_enum_columns() {
        let store = store();
        let mut role = column("role", "enum");
        role.enum_values = Some(vec!["admin".to_string(), "member".to_string()]);
        let plain_role = column("role", "varchar");

        let enricher = Enricher::new(&store);
        let enriched = enricher.enrich_table_info(users(vec![role]));
        assert_eq!(enriched.columns[0].enum_labels.as_ref().unwrap()["admin"], "Administrator");

        let enriched = enricher.enrich_table_info(users(vec![plain_role]));
        assert!(enriched.columns[0].enum_labels.is_none());
    }

    #[test]
    fn test_boolean_labels() {
        let store = store();
        let enriched = Enricher::new(&store).enrich_table_info(users(vec![
            column("active", "tinyint"),
            column("verified", "boolean"),
            column("age", "int"),
        ]));

        assert_eq!(enriched.columns[0].boolean_labels.as_ref().unwrap()["true"], "Yes");
        assert_eq!(enriched.columns[1].boolean_labels.as_ref().unwrap()["false"], "Disabled");
        assert!(enriched.columns[2].boolean_labels.is_none());
    }

    #[test]
    fn test_type_label_strips_arguments() {
        let store = store();
        let enricher = Enricher::new(&store);
        assert_eq!(enricher.type_label("VARCHAR(255)"), "Text");
        assert_eq!(enricher.type_label("decimal(10,2)"), "decimal(10,2)");
    }

    #[test]
    fn test_empty_store_resolves_to_nothing() {
        let store = MetadataStore::default();
        let enriched = Enricher::new(&store).enrich_table_info(TableSchema {
            table_name: "t".to_string(),
            columns: vec![column("created_at", "datetime")],
            ..Default::default()
        });

        assert_eq!(enriched.logical_name, None);
        assert_eq!(enriched.columns[0].logical_name, None);
        assert_eq!(enriched.columns[0].type_label, "datetime");
    }

    #[test]
    fn test_serializes_flat_column() {
        let store = store();
        let enriched = Enricher::new(&store).enrich_table_info(users(vec![column("email", "varchar")]));
        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["columns"][0]["name"], "email");
        assert_eq!(value["columns"][0]["logical_name"], "Email");
        assert_eq!(value["columns"][0]["type_label"], "Text");
    }
}
