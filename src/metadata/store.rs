use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::{errors::DocError, models::metadata::MetadataStore};

/// Suffix format of backup copies: `<path>.backup.<YYYYMMDDHHMMSS>`.
pub const BACKUP_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// The metadata file on disk.
#[derive(Debug, Clone)]
pub struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MetadataFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the store. A missing or blank file is an empty store; anything
    /// that does not parse is an error.
    pub fn load(&self) -> Result<MetadataStore, DocError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No metadata file at {}", self.path.display());
                return Ok(MetadataStore::default());
            }
            Err(e) => return Err(DocError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(MetadataStore::default());
        }

        toml::from_str(&content).map_err(|e| DocError::CorruptStore {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Writes the whole store, replacing the previous content.
    pub fn persist(&self, store: &MetadataStore) -> Result<(), DocError> {
        let content =
            toml::to_string_pretty(store).map_err(|e| DocError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DocError::io(parent, e))?;
        }

        fs::write(&self.path, content).map_err(|e| DocError::io(&self.path, e))?;
        info!("Metadata written to {}", self.path.display());
        Ok(())
    }

    /// Copies the current file next to itself with a timestamp suffix.
    /// Returns `Ok(None)` when there is nothing to back up.
    pub fn backup(&self) -> Result<Option<PathBuf>, DocError> {
        self.backup_at(Local::now())
    }

    pub(crate) fn backup_at(&self, now: DateTime<Local>) -> Result<Option<PathBuf>, DocError> {
        if !self.exists() {
            return Ok(None);
        }

        let backup_path = self.backup_path(now);
        fs::copy(&self.path, &backup_path).map_err(|e| DocError::io(&backup_path, e))?;
        info!("Backup created at {}", backup_path.display());
        Ok(Some(backup_path))
    }

    pub fn backup_path(&self, now: DateTime<Local>) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".backup.{}", now.format(BACKUP_SUFFIX_FORMAT)));
        PathBuf::from(name)
    }
}

/// Outcome of the backup taken before an update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackupStatus {
    /// Not requested, or no file existed yet.
    #[default]
    Skipped,
    Created(PathBuf),
    /// The copy failed; the update went ahead regardless.
    Failed(String),
}

impl BackupStatus {
    pub(crate) fn from_result(result: Result<Option<PathBuf>, DocError>) -> Self {
        match result {
            Ok(Some(path)) => BackupStatus::Created(path),
            Ok(None) => BackupStatus::Skipped,
            Err(e) => {
                warn!("Backup failed, continuing without one: {}", e);
                BackupStatus::Failed(e.to_string())
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BackupStatus::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metadata::{GlobalSettings, TableMetadata};
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let file = MetadataFile::new(dir.path().join("meta.toml"));

        let store = file.load().unwrap();
        assert!(store.tables.is_empty());
        assert!(store.settings.is_none());
    }

    #[test]
    fn test_load_blank_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.toml");
        fs::write(&path, "\n  \n").unwrap();

        let store = MetadataFile::new(&path).load().unwrap();
        assert_eq!(store, MetadataStore::default());
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.toml");
        fs::write(&path, "[tables.users\nlogical_name = ").unwrap();

        let err = MetadataFile::new(&path).load().unwrap_err();
        assert!(matches!(err, DocError::CorruptStore { .. }));
    }

    #[test]
    fn test_persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let file = MetadataFile::new(dir.path().join("nested").join("meta.toml"));

        let mut store = MetadataStore {
            settings: Some(GlobalSettings::defaults()),
            ..Default::default()
        };
        let mut users = TableMetadata {
            logical_name: Some("Users".to_string()),
            description: Some("Quotes \" and \\ backslashes\nnewlines".to_string()),
            ..Default::default()
        };
        users.columns.insert(
            "email".to_string(),
            crate::models::metadata::ColumnMetadata::common("Email", "Login address"),
        );
        store.tables.insert("users".to_string(), users);

        file.persist(&store).unwrap();
        assert_eq!(file.load().unwrap(), store);
    }

    #[test]
    fn test_backup_path_format() {
        let file = MetadataFile::new("/data/meta.toml");
        let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            file.backup_path(now),
            PathBuf::from("/data/meta.toml.backup.20260304050607")
        );
    }

    #[test]
    fn test_backup_copies_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.toml");
        fs::write(&path, "[tables]\n").unwrap();

        let backup = MetadataFile::new(&path).backup().unwrap().unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "[tables]\n");
    }

    #[test]
    fn test_backup_without_file_is_skipped() {
        let dir = tempdir().unwrap();
        let file = MetadataFile::new(dir.path().join("meta.toml"));
        assert_eq!(file.backup().unwrap(), None);
    }

    #[test]
    fn test_backup_status_from_error() {
        let status = BackupStatus::from_result(Err(DocError::Config("nope".to_string())));
        assert!(status.is_failed());
    }
}
