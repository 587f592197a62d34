use std::env;
use std::path::PathBuf;

use crate::{errors::DocError, models::connections::ConnectionConfig};

pub const DEFAULT_METADATA_PATH: &str = "table-document-metadata.toml";
pub const DEFAULT_EXCLUDE_TABLES: &[&str] = &["migrations"];

/// Runtime settings, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when `DATABASE_URL` is unset; only commands that introspect need it.
    pub connection: Option<ConnectionConfig>,
    pub metadata_path: PathBuf,
    pub exclude_tables: Vec<String>,
}

impl Config {
    /// Reads `DATABASE_URL`, `DB_DATABASE`, `TABLE_DOC_METADATA_PATH` and
    /// `TABLE_DOC_EXCLUDE_TABLES` (comma separated).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let connection = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .map(|database_url| ConnectionConfig {
                database_url,
                database: lookup("DB_DATABASE").filter(|db| !db.is_empty()),
            });

        let metadata_path = lookup("TABLE_DOC_METADATA_PATH")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_PATH));

        let exclude_tables = match lookup("TABLE_DOC_EXCLUDE_TABLES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_EXCLUDE_TABLES.iter().map(|t| t.to_string()).collect(),
        };

        Config {
            connection,
            metadata_path,
            exclude_tables,
        }
    }

    pub fn connection(&self) -> Result<&ConnectionConfig, DocError> {
        self.connection
            .as_ref()
            .ok_or_else(|| DocError::Config("DATABASE_URL must be set".to_string()))
    }
}
