use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::{ColumnSchema, TableSchema};
use crate::metadata::comment::{parse_comment, ParsedComment};

/// Key prefix marking a tombstoned table or column in the metadata file.
pub const TOMBSTONE_PREFIX: &str = "_removed_";

/// Format of the `_removed_at` stamp written on tombstones.
pub const REMOVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields a human added that this crate does not model. Held as TOML values
/// so datetimes and floats are written back exactly as they were read.
pub type ExtraFields = toml::Table;

/// Hand-written constraints on a column, merged over introspected ones.
pub type AnnotatedConstraints = toml::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Active,
    Removed,
}

impl EntryStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, EntryStatus::Active)
    }
}

/// Target of a column reference annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Human-authored annotations for one column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<AnnotatedConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
    #[serde(rename = "_removed_at", default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<String>,
    #[serde(rename = "_status", default, skip_serializing_if = "EntryStatus::is_active")]
    pub status: EntryStatus,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ColumnMetadata {
    /// Fresh entry for a column nobody has documented yet. Enum members are
    /// seeded as identity labels so they only need translating.
    pub fn seeded(column: &ColumnSchema, parsed: ParsedComment) -> Self {
        let enum_labels = if column.enum_values().is_empty() {
            None
        } else {
            Some(
                column
                    .enum_values()
                    .iter()
                    .map(|value| (value.clone(), value.clone()))
                    .collect(),
            )
        };

        ColumnMetadata {
            logical_name: Some(parsed.logical_name),
            description: Some(parsed.description),
            enum_labels,
            ..Default::default()
        }
    }

    pub fn common(logical_name: &str, description: &str) -> Self {
        ColumnMetadata {
            logical_name: Some(logical_name.to_string()),
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    pub fn tombstoned(mut self, removed_at: &str) -> Self {
        self.status = EntryStatus::Removed;
        self.removed_at = Some(removed_at.to_string());
        self
    }
}

/// Human-authored annotations for one table.
///
/// Live and tombstoned columns are kept apart, both keyed by the real column
/// name. The prefixed form only exists in the file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "TableRecord", into = "TableRecord")]
pub struct TableMetadata {
    pub logical_name: Option<String>,
    pub description: Option<String>,
    pub columns: BTreeMap<String, ColumnMetadata>,
    pub removed_columns: BTreeMap<String, ColumnMetadata>,
    pub removed_at: Option<String>,
    pub status: EntryStatus,
    pub extra: ExtraFields,
}

impl TableMetadata {
    pub fn seeded(parsed: ParsedComment) -> Self {
        TableMetadata {
            logical_name: Some(parsed.logical_name),
            description: Some(parsed.description),
            ..Default::default()
        }
    }

    /// Same table-level annotations, no columns.
    pub fn header(&self) -> Self {
        TableMetadata {
            logical_name: self.logical_name.clone(),
            description: self.description.clone(),
            extra: self.extra.clone(),
            ..Default::default()
        }
    }

    pub fn tombstoned(mut self, removed_at: &str) -> Self {
        self.status = EntryStatus::Removed;
        self.removed_at = Some(removed_at.to_string());
        self
    }
}

/// On-disk shape of a table: one column map, tombstones carry the prefix.
#[derive(Serialize, Deserialize, Default)]
struct TableRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    columns: BTreeMap<String, ColumnMetadata>,
    #[serde(rename = "_removed_at", default, skip_serializing_if = "Option::is_none")]
    removed_at: Option<String>,
    #[serde(rename = "_status", default, skip_serializing_if = "EntryStatus::is_active")]
    status: EntryStatus,
    #[serde(flatten)]
    extra: ExtraFields,
}

impl From<TableRecord> for TableMetadata {
    fn from(record: TableRecord) -> Self {
        let (columns, removed_columns) = split_tombstones(record.columns, |column, status| {
            column.status = status;
        });

        TableMetadata {
            logical_name: record.logical_name,
            description: record.description,
            columns,
            removed_columns,
            removed_at: record.removed_at,
            status: record.status,
            extra: record.extra,
        }
    }
}

impl From<TableMetadata> for TableRecord {
    fn from(table: TableMetadata) -> Self {
        TableRecord {
            logical_name: table.logical_name,
            description: table.description,
            columns: join_tombstones(table.columns, table.removed_columns),
            removed_at: table.removed_at,
            status: table.status,
            extra: table.extra,
        }
    }
}

/// Store-wide fallbacks used when a table has no annotation of its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub common_columns: BTreeMap<String, ColumnMetadata>,
    #[serde(default)]
    pub type_labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl GlobalSettings {
    /// Settings written by a fresh bootstrap.
    pub fn defaults() -> Self {
        let common_columns = [
            ("created_at", "Created at", "When the record was created"),
            ("updated_at", "Updated at", "When the record was last updated"),
            ("deleted_at", "Deleted at", "When the record was soft-deleted"),
        ]
        .into_iter()
        .map(|(name, logical_name, description)| {
            (name.to_string(), ColumnMetadata::common(logical_name, description))
        })
        .collect();

        GlobalSettings {
            common_columns,
            type_labels: BTreeMap::new(),
            extra: ExtraFields::new(),
        }
    }
}

/// Root of the annotation store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "StoreRecord", into = "StoreRecord")]
pub struct MetadataStore {
    pub tables: BTreeMap<String, TableMetadata>,
    pub removed_tables: BTreeMap<String, TableMetadata>,
    /// `None` when the file has no settings section.
    pub settings: Option<GlobalSettings>,
}

impl MetadataStore {
    pub fn table(&self, table_name: &str) -> Option<&TableMetadata> {
        self.tables.get(table_name)
    }

    pub fn column(&self, table_name: &str, column_name: &str) -> Option<&ColumnMetadata> {
        self.table(table_name)?.columns.get(column_name)
    }

    pub fn settings_or_default(&self) -> GlobalSettings {
        self.settings.clone().unwrap_or_else(GlobalSettings::defaults)
    }

    /// Number of tombstoned tables plus tombstoned columns of live tables.
    pub fn tombstone_count(&self) -> usize {
        self.removed_tables.len()
            + self
                .tables
                .values()
                .map(|table| table.removed_columns.len())
                .sum::<usize>()
    }

    /// Builds a store from introspected tables, ignoring any prior annotations.
    pub fn bootstrap(tables: &[TableSchema], settings: GlobalSettings) -> Self {
        let tables = tables
            .iter()
            .map(|table| {
                let mut entry = TableMetadata::seeded(parse_comment(table.comment.as_deref()));
                for column in &table.columns {
                    entry.columns.insert(
                        column.name.clone(),
                        ColumnMetadata::seeded(column, parse_comment(column.comment.as_deref())),
                    );
                }
                (table.table_name.clone(), entry)
            })
            .collect();

        MetadataStore {
            tables,
            removed_tables: BTreeMap::new(),
            settings: Some(settings),
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct StoreRecord {
    #[serde(default)]
    tables: BTreeMap<String, TableMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<GlobalSettings>,
}

impl From<StoreRecord> for MetadataStore {
    fn from(record: StoreRecord) -> Self {
        let (tables, removed_tables) = split_tombstones(record.tables, |table, status| {
            table.status = status;
        });

        MetadataStore {
            tables,
            removed_tables,
            settings: record.settings,
        }
    }
}

impl From<MetadataStore> for StoreRecord {
    fn from(store: MetadataStore) -> Self {
        StoreRecord {
            tables: join_tombstones(store.tables, store.removed_tables),
            settings: store.settings,
        }
    }
}

/// Splits a file map into live and tombstoned entries. The key prefix decides
/// which side an entry lands on, and its status is aligned to match.
fn split_tombstones<T>(
    entries: BTreeMap<String, T>,
    mut set_status: impl FnMut(&mut T, EntryStatus),
) -> (BTreeMap<String, T>, BTreeMap<String, T>) {
    let mut live = BTreeMap::new();
    let mut removed = BTreeMap::new();

    for (key, mut entry) in entries {
        match key.strip_prefix(TOMBSTONE_PREFIX) {
            Some(name) => {
                set_status(&mut entry, EntryStatus::Removed);
                removed.insert(name.to_string(), entry);
            }
            None => {
                set_status(&mut entry, EntryStatus::Active);
                live.insert(key, entry);
            }
        }
    }

    (live, removed)
}

fn join_tombstones<T>(
    live: BTreeMap<String, T>,
    removed: BTreeMap<String, T>,
) -> BTreeMap<String, T> {
    let mut entries = live;
    entries.extend(
        removed
            .into_iter()
            .map(|(name, entry)| (format!("{TOMBSTONE_PREFIX}{name}"), entry)),
    );
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[tables.orders]
logical_name = "Orders"
description = "Customer orders"
owner = "billing-team"

[tables.orders.columns.state]
logical_name = "State"
description = ""

[tables.orders.columns._removed_status]
logical_name = "Status"
_removed_at = "2026-01-02 03:04:05"
_status = "removed"

[tables._removed_legacy]
logical_name = "Legacy"
_removed_at = "2026-01-02 03:04:05"
_status = "removed"

[settings.type_labels]
varchar = "String"
"#;

    #[test]
    fn test_prefix_maps_to_status() {
        let store: MetadataStore = toml::from_str(SAMPLE).unwrap();

        assert!(store.tables.contains_key("orders"));
        assert!(store.removed_tables.contains_key("legacy"));
        assert_eq!(store.removed_tables["legacy"].status, EntryStatus::Removed);

        let orders = &store.tables["orders"];
        assert_eq!(orders.status, EntryStatus::Active);
        assert!(orders.columns.contains_key("state"));
        assert_eq!(
            orders.removed_columns["status"].removed_at.as_deref(),
            Some("2026-01-02 03:04:05")
        );
        assert_eq!(orders.extra["owner"].as_str(), Some("billing-team"));
    }

    #[test]
    fn test_prefix_is_authoritative_over_status_field() {
        let raw = r#"
[tables._removed_old]
logical_name = "Old"
"#;
        let store: MetadataStore = toml::from_str(raw).unwrap();
        assert_eq!(store.removed_tables["old"].status, EntryStatus::Removed);
    }

    #[test]
    fn test_tombstones_written_with_prefix() {
        let store: MetadataStore = toml::from_str(SAMPLE).unwrap();
        let encoded = toml::to_string_pretty(&store).unwrap();

        assert!(encoded.contains("_removed_legacy"));
        assert!(encoded.contains("_removed_status"));
        assert!(!encoded.contains("_removed__removed_"));

        let decoded: MetadataStore = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded, store);
    }

    #[test]
    fn test_hand_written_values_keep_their_toml_types() {
        let raw = r#"
[tables.orders]
logical_name = "Orders"
reviewed_on = 2026-01-01
weight = 0.75
tags = ["billing", "core"]

[tables.orders.columns.placed_at]
logical_name = "Placed at"
constraints = { not_before = 2020-01-01T00:00:00Z, ratio = 0.5, allowed = [1, 2] }

[settings]
audited_at = 2026-03-04T05:06:07
"#;
        let store: MetadataStore = toml::from_str(raw).unwrap();
        let orders = &store.tables["orders"];
        assert!(orders.extra["reviewed_on"].as_datetime().is_some());
        assert_eq!(orders.extra["weight"].as_float(), Some(0.75));
        assert_eq!(orders.extra["tags"].as_array().map(Vec::len), Some(2));

        let constraints = orders.columns["placed_at"].constraints.as_ref().unwrap();
        assert!(constraints["not_before"].as_datetime().is_some());
        assert_eq!(constraints["ratio"].as_float(), Some(0.5));

        let encoded = toml::to_string_pretty(&store).unwrap();
        assert!(encoded.contains("reviewed_on = 2026-01-01"));
        assert!(encoded.contains("audited_at = 2026-03-04T05:06:07"));
        assert!(!encoded.contains("$__toml_private"));

        let decoded: MetadataStore = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded, store);
    }

    #[test]
    fn test_default_settings() {
        let settings = GlobalSettings::defaults();
        let names: Vec<_> = settings.common_columns.keys().cloned().collect();
        assert_eq!(names, vec!["created_at", "deleted_at", "updated_at"]);
        assert!(settings.type_labels.is_empty());
    }

    #[test]
    fn test_seeded_column_has_identity_enum_labels() {
        let column = ColumnSchema {
            name: "state".to_string(),
            data_type: "enum".to_string(),
            enum_values: Some(vec!["draft".to_string(), "paid".to_string()]),
            ..Default::default()
        };
        let seeded = ColumnMetadata::seeded(&column, ParsedComment::default());
        let labels = seeded.enum_labels.unwrap();
        assert_eq!(labels["draft"], "draft");
        assert_eq!(labels["paid"], "paid");
        assert_eq!(seeded.logical_name.as_deref(), Some(""));
    }

    #[test]
    fn test_tombstone_count() {
        let store: MetadataStore = toml::from_str(SAMPLE).unwrap();
        assert_eq!(store.tombstone_count(), 2);
    }
}
