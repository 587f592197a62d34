use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Local};
use log::{info, warn};

use super::comment::parse_comment;
use super::store::{BackupStatus, MetadataFile};
use crate::{
    errors::DocError,
    models::{
        metadata::{
            ColumnMetadata, GlobalSettings, MetadataStore, TableMetadata, REMOVED_AT_FORMAT,
        },
        schema::TableSchema,
    },
};

/// Counters reported by [`Reconciler::update`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateStats {
    pub new_tables: usize,
    pub new_columns: usize,
    pub removed_tables: usize,
    pub removed_columns: usize,
    pub preserved_items: usize,
    /// Entries that vanished again while an older tombstone of the same name
    /// was still waiting for cleanup. The older tombstone is kept.
    pub tombstone_conflicts: usize,
    pub backup: BackupStatus,
}

impl UpdateStats {
    pub fn has_removals(&self) -> bool {
        self.removed_tables > 0 || self.removed_columns > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// A new store was written from scratch.
    Created { tables: usize },
    /// A store already existed and was merged instead.
    Updated(UpdateStats),
}

/// Column-level drift of a table known to both sides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnChanges {
    pub new_columns: Vec<String>,
    pub removed_columns: Vec<String>,
}

/// What an update would change, computed without touching the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataDiff {
    pub new_tables: Vec<String>,
    pub removed_tables: Vec<String>,
    pub modified_tables: BTreeMap<String, ColumnChanges>,
}

impl MetadataDiff {
    pub fn is_empty(&self) -> bool {
        self.new_tables.is_empty() && self.removed_tables.is_empty() && self.modified_tables.is_empty()
    }
}

/// Keeps the metadata file in step with the live schema.
///
/// The loaded store is held in memory and refreshed from disk after every
/// write, so later calls always see what the file actually contains.
pub struct Reconciler {
    file: MetadataFile,
    store: MetadataStore,
}

impl Reconciler {
    pub fn open(file: MetadataFile) -> Result<Self, DocError> {
        let store = file.load()?;
        Ok(Reconciler { file, store })
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn file(&self) -> &MetadataFile {
        &self.file
    }

    pub fn reload(&mut self) -> Result<(), DocError> {
        self.store = self.file.load()?;
        Ok(())
    }

    /// Writes a brand-new store seeded from catalog comments. Without `force`
    /// an existing file is merged through [`Reconciler::update`] instead.
    pub fn generate(
        &mut self,
        tables: &[TableSchema],
        force: bool,
    ) -> Result<GenerateOutcome, DocError> {
        if !force && self.file.exists() {
            info!("Metadata file exists, merging instead of overwriting");
            return self.update(tables, true).map(GenerateOutcome::Updated);
        }

        let store = MetadataStore::bootstrap(tables, GlobalSettings::defaults());
        self.file.persist(&store)?;
        self.reload()?;

        info!("Generated metadata for {} tables", tables.len());
        Ok(GenerateOutcome::Created {
            tables: tables.len(),
        })
    }

    /// Merges the current schema into the store, keeping every human edit and
    /// tombstoning whatever disappeared.
    pub fn update(&mut self, tables: &[TableSchema], backup: bool) -> Result<UpdateStats, DocError> {
        self.update_at(tables, backup, Local::now())
    }

    pub(crate) fn update_at(
        &mut self,
        tables: &[TableSchema],
        backup: bool,
        now: DateTime<Local>,
    ) -> Result<UpdateStats, DocError> {
        let backup = if backup {
            BackupStatus::from_result(self.file.backup_at(now))
        } else {
            BackupStatus::Skipped
        };

        let removed_at = now.format(REMOVED_AT_FORMAT).to_string();
        let (merged, mut stats) = merge(&self.store, tables, &removed_at);
        stats.backup = backup;

        self.file.persist(&merged)?;
        self.reload()?;

        info!(
            "Metadata updated: {} new tables, {} new columns, {} removed tables, {} removed columns, {} preserved",
            stats.new_tables,
            stats.new_columns,
            stats.removed_tables,
            stats.removed_columns,
            stats.preserved_items
        );
        Ok(stats)
    }

    /// Permanently drops every tombstone. Returns how many entries went.
    pub fn cleanup_removed_items(&mut self) -> Result<usize, DocError> {
        let count = self.store.tombstone_count();
        if count == 0 {
            return Ok(0);
        }

        let mut cleaned = self.store.clone();
        cleaned.removed_tables.clear();
        for table in cleaned.tables.values_mut() {
            table.removed_columns.clear();
        }

        self.file.persist(&cleaned)?;
        self.reload()?;

        info!("Cleaned up {} removed items", count);
        Ok(count)
    }

    /// Compares the current schema with the store without changing anything.
    ///
    /// Only live entries count as known, so a table that was tombstoned and
    /// has since come back is reported as new.
    pub fn diff(&self, tables: &[TableSchema]) -> MetadataDiff {
        let current: HashSet<&str> = tables.iter().map(|t| t.table_name.as_str()).collect();
        let mut diff = MetadataDiff::default();

        for table in tables {
            let Some(existing) = self.store.table(&table.table_name) else {
                diff.new_tables.push(table.table_name.clone());
                continue;
            };

            let new_columns: Vec<String> = table
                .columns
                .iter()
                .filter(|column| !existing.columns.contains_key(&column.name))
                .map(|column| column.name.clone())
                .collect();
            let removed_columns: Vec<String> = existing
                .columns
                .keys()
                .filter(|name| !table.has_column(name))
                .cloned()
                .collect();

            if !new_columns.is_empty() || !removed_columns.is_empty() {
                diff.modified_tables.insert(
                    table.table_name.clone(),
                    ColumnChanges {
                        new_columns,
                        removed_columns,
                    },
                );
            }
        }

        diff.removed_tables = self
            .store
            .tables
            .keys()
            .filter(|name| !current.contains(name.as_str()))
            .cloned()
            .collect();

        diff
    }
}

/// Derives a new store from `old` and the current schema.
fn merge(
    old: &MetadataStore,
    tables: &[TableSchema],
    removed_at: &str,
) -> (MetadataStore, UpdateStats) {
    let mut stats = UpdateStats::default();
    let mut merged = MetadataStore {
        settings: Some(old.settings_or_default()),
        removed_tables: old.removed_tables.clone(),
        ..Default::default()
    };

    for table in tables {
        let existing = old.table(&table.table_name);

        let mut entry = match existing {
            Some(existing) => {
                stats.preserved_items += 1;
                let mut entry = existing.header();
                entry.removed_columns = existing.removed_columns.clone();
                entry
            }
            None => {
                stats.new_tables += 1;
                TableMetadata::seeded(parse_comment(table.comment.as_deref()))
            }
        };

        for column in &table.columns {
            match existing.and_then(|e| e.columns.get(&column.name)) {
                Some(kept) => {
                    entry.columns.insert(column.name.clone(), kept.clone());
                    stats.preserved_items += 1;
                }
                None => {
                    let seeded =
                        ColumnMetadata::seeded(column, parse_comment(column.comment.as_deref()));
                    entry.columns.insert(column.name.clone(), seeded);
                    stats.new_columns += 1;
                }
            }
        }

        // Tombstones go in after the live columns.
        if let Some(existing) = existing {
            for (name, column) in &existing.columns {
                if table.has_column(name) {
                    continue;
                }
                if entry.removed_columns.contains_key(name) {
                    warn!(
                        "Column {}.{} is already tombstoned; keeping the older tombstone and \
                         dropping the live entry. Run cleanup before reusing removed names.",
                        table.table_name, name
                    );
                    stats.tombstone_conflicts += 1;
                    continue;
                }
                entry
                    .removed_columns
                    .insert(name.clone(), column.clone().tombstoned(removed_at));
                stats.removed_columns += 1;
            }
        }

        merged.tables.insert(table.table_name.clone(), entry);
    }

    for (name, table) in &old.tables {
        if merged.tables.contains_key(name) {
            continue;
        }
        if merged.removed_tables.contains_key(name) {
            warn!(
                "Table {} is already tombstoned; keeping the older tombstone and \
                 dropping the live entry. Run cleanup before reusing removed names.",
                name
            );
            stats.tombstone_conflicts += 1;
            continue;
        }
        merged
            .removed_tables
            .insert(name.clone(), table.clone().tombstoned(removed_at));
        stats.removed_tables += 1;
    }

    (merged, stats)
}
