use std::path::PathBuf;

use thiserror::Error;

/// Error type for introspection and metadata store operations.
#[derive(Error, Debug)]
pub enum DocError {
    /// Error reported by the database driver while reading the catalog.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// Connection error (e.g., unreachable server or bad credentials).
    #[error("Connection error: {0}")]
    Connection(String),
    /// The catalog answered, but not with something we can describe.
    #[error("Introspection error: {0}")]
    Introspection(String),
    /// The metadata file exists but is not well-formed.
    #[error("Corrupt metadata store {}: {message}", .path.display())]
    CorruptStore { path: PathBuf, message: String },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The in-memory store could not be encoded.
    #[error("Serialization error: {0}")]
    Serialize(String),
    /// Configuration error (e.g., missing DATABASE_URL).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DocError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_store_message_names_the_file() {
        let err = DocError::CorruptStore {
            path: PathBuf::from("/tmp/meta.toml"),
            message: "expected `=`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Corrupt metadata store /tmp/meta.toml: expected `=`"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = DocError::io(
            "/tmp/missing.toml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
