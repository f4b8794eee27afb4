//! Storage error types
//!
//! Defines all errors that can occur in the storage layer.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(String),

    /// Requested row does not exist
    #[error("{table} not found: {id}")]
    NotFound { table: String, id: String },

    /// A unique column already holds this value
    #[error("{table}.{field} already contains '{value}'")]
    Conflict {
        table: String,
        field: String,
        value: String,
    },

    /// A reference does not resolve, or a restrict policy blocks a delete
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    /// Record-level validation failed
    #[error("Invalid record: {0}")]
    Invalid(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl StorageError {
    pub fn not_found(table: impl ToString, id: impl ToString) -> Self {
        StorageError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
