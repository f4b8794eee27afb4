//! Storage backends
//!
//! A backend only knows rows: JSON objects keyed by table and id. Schema
//! checks, typing and change events live one level up in [`Store`].
//!
//! [`Store`]: crate::storage::Store

use crate::storage::error::StorageResult;
use crate::storage::types::{Dataset, Table};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Which backend is serving the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Primary SQLite service
    Sqlite,
    /// Demo mode blob store
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// Row-level persistence used by the store
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// All rows of a table, in insertion order
    async fn rows(&self, table: Table) -> StorageResult<Vec<Value>>;

    /// One row by id
    async fn row(&self, table: Table, id: Uuid) -> StorageResult<Option<Value>>;

    /// Insert a new row; fails with `Conflict` if the id exists
    async fn insert_row(&self, table: Table, id: Uuid, row: Value) -> StorageResult<()>;

    /// Replace an existing row; fails with `NotFound` if absent
    async fn update_row(&self, table: Table, id: Uuid, row: Value) -> StorageResult<()>;

    /// Remove a row, returning whether it existed
    async fn delete_row(&self, table: Table, id: Uuid) -> StorageResult<bool>;

    /// Everything, as one dataset
    async fn snapshot(&self) -> StorageResult<Dataset>;

    /// Replace everything with the given dataset
    async fn restore(&self, dataset: &Dataset) -> StorageResult<()>;
}
