//! SQLite backend - the primary record service
//!
//! All tables share one generic `records` table keyed by `(tbl, id)` with the
//! row stored as a JSON body. Schema rules are enforced by the store, so the
//! SQL side stays a plain key-value layout.

use crate::storage::backend::{Backend, BackendKind};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Dataset, Table, DATASET_VERSION};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// SQLite-backed row store
pub struct SqliteBackend {
    /// `Connection` is !Sync
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        tracing::info!(path = %path.display(), "Opened SQLite store");
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                tbl TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (tbl, id)
            );
            CREATE INDEX IF NOT EXISTS idx_records_tbl ON records(tbl);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with the connection locked. Never held across an await.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        f(&mut conn)
    }
}

fn parse_body(body: String) -> StorageResult<Value> {
    Ok(serde_json::from_str(&body)?)
}

fn is_constraint(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn rows(&self, table: Table) -> StorageResult<Vec<Value>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT body FROM records WHERE tbl = ?1 ORDER BY seq")?;
            let bodies = stmt
                .query_map(params![table.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            bodies.into_iter().map(parse_body).collect()
        })
    }

    async fn row(&self, table: Table, id: Uuid) -> StorageResult<Option<Value>> {
        self.with_conn(|conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM records WHERE tbl = ?1 AND id = ?2",
                    params![table.as_str(), id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(parse_body).transpose()
        })
    }

    async fn insert_row(&self, table: Table, id: Uuid, row: Value) -> StorageResult<()> {
        let body = serde_json::to_string(&row)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (tbl, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![table.as_str(), id.to_string(), body, Utc::now().to_rfc3339()],
            )
            .map_err(|e| {
                if is_constraint(&e) {
                    StorageError::Conflict {
                        table: table.to_string(),
                        field: "id".to_string(),
                        value: id.to_string(),
                    }
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    async fn update_row(&self, table: Table, id: Uuid, row: Value) -> StorageResult<()> {
        let body = serde_json::to_string(&row)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE records SET body = ?3, updated_at = ?4 WHERE tbl = ?1 AND id = ?2",
                params![table.as_str(), id.to_string(), body, Utc::now().to_rfc3339()],
            )?;
            if changed == 0 {
                return Err(StorageError::not_found(table, id));
            }
            Ok(())
        })
    }

    async fn delete_row(&self, table: Table, id: Uuid) -> StorageResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM records WHERE tbl = ?1 AND id = ?2",
                params![table.as_str(), id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    async fn snapshot(&self) -> StorageResult<Dataset> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT tbl, body FROM records ORDER BY seq")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut dataset = Dataset::new();
            for (tbl, body) in rows {
                dataset.tables.entry(tbl).or_default().push(parse_body(body)?);
            }
            Ok(dataset)
        })
    }

    async fn restore(&self, dataset: &Dataset) -> StorageResult<()> {
        if dataset.version > DATASET_VERSION {
            return Err(StorageError::Invalid(format!(
                "Unsupported dataset version {}",
                dataset.version
            )));
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM records", [])?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO records (tbl, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
                )?;
                let now = Utc::now().to_rfc3339();
                for table in Table::all() {
                    for row in dataset.rows(*table) {
                        let id = crate::storage::local::row_id(row).ok_or_else(|| {
                            StorageError::Invalid(format!("{} row without a valid id", table))
                        })?;
                        stmt.execute(params![
                            table.as_str(),
                            id.to_string(),
                            serde_json::to_string(row)?,
                            now
                        ])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{Company, Delegation};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_row_lifecycle() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let company = Company::new("Mapfre");
        let row = serde_json::to_value(&company).unwrap();

        backend
            .insert_row(Table::Companies, company.id, row.clone())
            .await
            .unwrap();
        assert!(matches!(
            backend.insert_row(Table::Companies, company.id, row).await,
            Err(StorageError::Conflict { .. })
        ));

        let fetched = backend.row(Table::Companies, company.id).await.unwrap();
        assert_eq!(fetched.unwrap()["name"], "Mapfre");
        assert!(backend
            .row(Table::Delegations, company.id)
            .await
            .unwrap()
            .is_none());

        assert!(backend.delete_row(Table::Companies, company.id).await.unwrap());
        assert!(backend.rows(Table::Companies).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_keep_insertion_order() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        for name in ["b", "a", "c"] {
            let company = Company::new(name);
            backend
                .insert_row(
                    Table::Companies,
                    company.id,
                    serde_json::to_value(&company).unwrap(),
                )
                .await
                .unwrap();
        }

        let names: Vec<_> = backend
            .rows(Table::Companies)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_snapshot_restore_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intranet.db");

        let mut data = Dataset::new();
        data.push(&Delegation::new("Madrid", "MAD")).unwrap();
        data.push(&Company::new("Allianz")).unwrap();

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.restore(&data).await.unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        let snapshot = backend.snapshot().await.unwrap();
        assert_eq!(snapshot.rows(Table::Delegations), data.rows(Table::Delegations));
        assert_eq!(snapshot.rows(Table::Companies), data.rows(Table::Companies));
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let result = backend
            .update_row(Table::News, Uuid::new_v4(), serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }
}
