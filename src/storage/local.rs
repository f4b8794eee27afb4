//! Demo-mode persistence shim
//!
//! The whole data set lives in a single JSON blob under a fixed key
//! (`intranet-demo-data`). Reads deserialize the blob, writes replace it.
//! There is no partial update, no index and no conflict resolution: the last
//! write wins.
//!
//! Several [`LocalStore`] handles may share one medium, like browser tabs
//! sharing local storage. A write from one handle is announced to the others
//! through [`LocalStore::subscribe`]; the writing handle does not see its own
//! events.
//!
//! If the data directory cannot be used, the store falls back to memory for
//! the lifetime of the process and logs a warning instead of failing.

use crate::storage::backend::{Backend, BackendKind};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Dataset, Table};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Fixed key the blob is stored under
pub const STORAGE_KEY: &str = "intranet-demo-data";

const EVENT_CAPACITY: usize = 64;

/// Announcement that the blob was rewritten by some handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEvent {
    /// Storage key that changed
    pub key: String,
    /// Handle that performed the write
    pub origin: Uuid,
    /// Monotonic write counter
    pub revision: u64,
}

enum Medium {
    File(PathBuf),
    Memory(String),
}

struct Shared {
    medium: RwLock<Medium>,
    seed: Dataset,
    revision: AtomicU64,
    write_guard: Mutex<()>,
    events: broadcast::Sender<StorageEvent>,
}

/// Handle onto the demo blob store
pub struct LocalStore {
    shared: Arc<Shared>,
    origin: Uuid,
}

impl LocalStore {
    /// Open the blob under `dir`, seeding it when absent
    pub fn open(dir: impl AsRef<Path>, seed: Dataset) -> Self {
        let dir = dir.as_ref();
        let path = dir.join(format!("{}.json", STORAGE_KEY));

        let medium = match Self::prepare_file(dir, &path, &seed) {
            Ok(()) => Medium::File(path),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Demo storage unavailable, keeping data in memory"
                );
                Medium::Memory(serde_json::to_string(&seed).unwrap_or_default())
            }
        };

        Self::with_medium(medium, seed)
    }

    /// Purely in-memory store holding `seed`
    pub fn in_memory(seed: Dataset) -> Self {
        let blob = serde_json::to_string(&seed).unwrap_or_default();
        Self::with_medium(Medium::Memory(blob), seed)
    }

    fn with_medium(medium: Medium, seed: Dataset) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                medium: RwLock::new(medium),
                seed,
                revision: AtomicU64::new(0),
                write_guard: Mutex::new(()),
                events,
            }),
            origin: Uuid::new_v4(),
        }
    }

    fn prepare_file(dir: &Path, path: &Path, seed: &Dataset) -> StorageResult<()> {
        std::fs::create_dir_all(dir)?;
        if !path.exists() {
            let blob = serde_json::to_vec_pretty(seed)?;
            write_atomic(path, &blob)?;
            tracing::info!(path = %path.display(), "Seeded demo storage");
        }
        Ok(())
    }

    /// Another handle on the same medium, with its own origin
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            origin: Uuid::new_v4(),
        }
    }

    /// Identifier of this handle in storage events
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// The dataset used when the blob is absent or unreadable
    pub fn seed(&self) -> &Dataset {
        &self.shared.seed
    }

    /// Path of the blob, or `None` when running from memory
    pub fn path(&self) -> Option<PathBuf> {
        match &*self.read_medium() {
            Medium::File(path) => Some(path.clone()),
            Medium::Memory(_) => None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.path().is_some()
    }

    /// Number of writes seen so far
    pub fn revision(&self) -> u64 {
        self.shared.revision.load(Ordering::SeqCst)
    }

    /// Read the whole dataset.
    ///
    /// A missing or corrupt blob yields the seed data; the blob itself is left
    /// untouched.
    pub fn read(&self) -> Dataset {
        let raw = match &*self.read_medium() {
            Medium::File(path) => match std::fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return self.shared.seed.clone();
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read demo storage");
                    return self.shared.seed.clone();
                }
            },
            Medium::Memory(blob) => blob.clone(),
        };

        match serde_json::from_str(&raw) {
            Ok(dataset) => dataset,
            Err(e) => {
                tracing::warn!(error = %e, "Demo storage is corrupt, using seed data");
                self.shared.seed.clone()
            }
        }
    }

    /// Replace the whole dataset and notify other handles
    pub fn write(&self, dataset: &Dataset) -> StorageResult<()> {
        let blob = serde_json::to_string_pretty(dataset)?;

        let _guard = self
            .shared
            .write_guard
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        {
            let mut medium = self
                .shared
                .medium
                .write()
                .map_err(|e| StorageError::Lock(e.to_string()))?;

            let failed = match &*medium {
                Medium::File(path) => match write_atomic(path, blob.as_bytes()) {
                    Ok(()) => false,
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Demo storage write failed, switching to memory"
                        );
                        true
                    }
                },
                Medium::Memory(_) => true,
            };

            if failed {
                *medium = Medium::Memory(blob);
            }
        }

        let revision = self.shared.revision.fetch_add(1, Ordering::SeqCst) + 1;
        // No receivers is fine
        let _ = self.shared.events.send(StorageEvent {
            key: STORAGE_KEY.to_string(),
            origin: self.origin,
            revision,
        });

        tracing::debug!(origin = %self.origin, revision, "Demo storage written");
        Ok(())
    }

    /// Restore the seed dataset
    pub fn reset(&self) -> StorageResult<()> {
        let seed = self.shared.seed.clone();
        self.write(&seed)
    }

    /// Events from writes made by *other* handles
    pub fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            rx: self.shared.events.subscribe(),
            origin: self.origin,
        }
    }

    fn read_medium(&self) -> std::sync::RwLockReadGuard<'_, Medium> {
        // A poisoned lock still holds a usable medium
        self.shared
            .medium
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiver of storage events, filtered to foreign origins
pub struct StorageSubscription {
    rx: broadcast::Receiver<StorageEvent>,
    origin: Uuid,
}

impl StorageSubscription {
    /// Next event written by another handle, or `None` once the store is gone
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.origin => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Storage subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

pub(crate) fn row_id(row: &Value) -> Option<Uuid> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

// ============================================
// BACKEND
// ============================================

/// [`Backend`] over the demo blob: every mutation rewrites the whole blob
pub struct LocalBackend {
    store: LocalStore,
    lock: tokio::sync::Mutex<()>,
}

impl LocalBackend {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn rows(&self, table: Table) -> StorageResult<Vec<Value>> {
        Ok(self.store.read().rows(table).to_vec())
    }

    async fn row(&self, table: Table, id: Uuid) -> StorageResult<Option<Value>> {
        Ok(self
            .store
            .read()
            .rows(table)
            .iter()
            .find(|row| row_id(row) == Some(id))
            .cloned())
    }

    async fn insert_row(&self, table: Table, id: Uuid, row: Value) -> StorageResult<()> {
        let _lock = self.lock.lock().await;
        let mut data = self.store.read();

        let rows = data.rows_mut(table);
        if rows.iter().any(|r| row_id(r) == Some(id)) {
            return Err(StorageError::Conflict {
                table: table.to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            });
        }
        rows.push(row);

        self.store.write(&data)
    }

    async fn update_row(&self, table: Table, id: Uuid, row: Value) -> StorageResult<()> {
        let _lock = self.lock.lock().await;
        let mut data = self.store.read();

        let slot = data
            .rows_mut(table)
            .iter_mut()
            .find(|r| row_id(r) == Some(id))
            .ok_or_else(|| StorageError::not_found(table, id))?;
        *slot = row;

        self.store.write(&data)
    }

    async fn delete_row(&self, table: Table, id: Uuid) -> StorageResult<bool> {
        let _lock = self.lock.lock().await;
        let mut data = self.store.read();

        let rows = data.rows_mut(table);
        let before = rows.len();
        rows.retain(|r| row_id(r) != Some(id));
        if rows.len() == before {
            return Ok(false);
        }

        self.store.write(&data)?;
        Ok(true)
    }

    async fn snapshot(&self) -> StorageResult<Dataset> {
        Ok(self.store.read())
    }

    async fn restore(&self, dataset: &Dataset) -> StorageResult<()> {
        let _lock = self.lock.lock().await;
        self.store.write(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Company;
    use tempfile::TempDir;

    fn seed() -> Dataset {
        let mut data = Dataset::new();
        data.push(&Company::new("Mapfre")).unwrap();
        data.push(&Company::new("Allianz")).unwrap();
        data
    }

    #[test]
    fn test_fresh_store_returns_seed() {
        let dir = TempDir::new().unwrap();
        let seed = seed();
        let store = LocalStore::open(dir.path(), seed.clone());

        assert!(store.is_persistent());
        assert_eq!(store.read(), seed);
        assert!(dir.path().join("intranet-demo-data.json").exists());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), seed());

        let mut data = Dataset::new();
        data.push(&Company::new("Zurich")).unwrap();
        store.write(&data).unwrap();

        assert_eq!(store.read(), data);
        assert_eq!(store.revision(), 1);

        // Survives reopening
        let reopened = LocalStore::open(dir.path(), seed());
        assert_eq!(reopened.read(), data);
    }

    #[test]
    fn test_last_write_wins_across_handles() {
        let dir = TempDir::new().unwrap();
        let tab_a = LocalStore::open(dir.path(), seed());
        let tab_b = tab_a.handle();

        let mut first = Dataset::new();
        first.push(&Company::new("First")).unwrap();
        let mut second = Dataset::new();
        second.push(&Company::new("Second")).unwrap();

        tab_a.write(&first).unwrap();
        tab_b.write(&second).unwrap();

        assert_eq!(tab_a.read(), second);
        assert_eq!(tab_b.read(), second);
    }

    #[test]
    fn test_corrupt_blob_returns_seed_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intranet-demo-data.json");
        std::fs::write(&path, "{not json").unwrap();

        let seed = seed();
        let store = LocalStore::open(dir.path(), seed.clone());

        assert_eq!(store.read(), seed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_unusable_directory_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let seed = seed();
        let store = LocalStore::open(blocker.join("data"), seed.clone());

        assert!(!store.is_persistent());
        assert_eq!(store.read(), seed);

        let mut data = Dataset::new();
        data.push(&Company::new("Generali")).unwrap();
        store.write(&data).unwrap();
        assert_eq!(store.read(), data);
    }

    #[test]
    fn test_reset_restores_seed() {
        let seed = seed();
        let store = LocalStore::in_memory(seed.clone());
        store.write(&Dataset::new()).unwrap();
        assert!(store.read().is_empty());

        store.reset().unwrap();
        assert_eq!(store.read(), seed);
    }

    #[tokio::test]
    async fn test_subscribers_only_see_foreign_writes() {
        let tab_a = LocalStore::in_memory(seed());
        let tab_b = tab_a.handle();
        let mut events_a = tab_a.subscribe();

        tab_a.write(&Dataset::new()).unwrap();
        tab_b.write(&seed()).unwrap();

        let event = events_a.recv().await.unwrap();
        assert_eq!(event.origin, tab_b.origin());
        assert_eq!(event.key, STORAGE_KEY);
        assert_eq!(event.revision, 2);
    }

    #[tokio::test]
    async fn test_backend_row_operations() {
        let backend = LocalBackend::new(LocalStore::in_memory(Dataset::new()));
        let company = Company::new("AXA");
        let row = serde_json::to_value(&company).unwrap();

        backend
            .insert_row(Table::Companies, company.id, row.clone())
            .await
            .unwrap();
        assert!(matches!(
            backend.insert_row(Table::Companies, company.id, row).await,
            Err(StorageError::Conflict { .. })
        ));

        let mut renamed = company.clone();
        renamed.name = "AXA Seguros".to_string();
        backend
            .update_row(
                Table::Companies,
                company.id,
                serde_json::to_value(&renamed).unwrap(),
            )
            .await
            .unwrap();

        let stored = backend.row(Table::Companies, company.id).await.unwrap().unwrap();
        assert_eq!(stored["name"], "AXA Seguros");

        assert!(backend.delete_row(Table::Companies, company.id).await.unwrap());
        assert!(!backend.delete_row(Table::Companies, company.id).await.unwrap());
        assert!(matches!(
            backend
                .update_row(Table::Companies, company.id, Value::Null)
                .await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
