//! Error types for metadata store operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur reading, writing, or deleting the metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error on the backing file.
    #[error("store I/O error at '{path}': {source}")]
    Io {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The JSON backing file could not be serialized or deserialized.
    #[error("store serialization error at '{path}': {source}")]
    Serialization {
        /// Path of the backing file.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A database-level error from the sqlite backend.
    #[error("store database error: {source}")]
    Database {
        /// The underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },

    /// A record was saved with a required field left empty.
    #[error("record field '{field}' must not be empty")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// A confirm targeted a filepath with no planned record.
    #[error("no metadata record for '{filepath}'")]
    RecordNotFound {
        /// The filepath that had no record.
        filepath: String,
    },

    /// The backing file could not be removed within the retry budget.
    #[error("could not delete store file '{path}' after {attempts} attempts")]
    DeleteExhausted {
        /// Path of the backing file.
        path: PathBuf,
        /// How many removal attempts were made.
        attempts: u32,
    },
}

impl StoreError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a `Serialization` error.
    #[must_use]
    pub fn serialization(path: &Path, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Creates a `RecordNotFound` error.
    #[must_use]
    pub fn record_not_found(filepath: impl Into<String>) -> Self {
        Self::RecordNotFound {
            filepath: filepath.into(),
        }
    }

    /// Creates a `DeleteExhausted` error.
    #[must_use]
    pub fn delete_exhausted(path: impl Into<PathBuf>, attempts: u32) -> Self {
        Self::DeleteExhausted {
            path: path.into(),
            attempts,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(source: sqlx::Error) -> Self {
        Self::Database { source }
    }
}
