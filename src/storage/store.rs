//! Typed record store
//!
//! `Store` sits on top of a [`Backend`] and gives every table the same
//! behaviour regardless of where the rows live:
//!
//! - typed CRUD over [`Record`] types
//! - case-insensitive unique columns
//! - foreign keys resolved on insert and update
//! - delete policies (restrict / cascade / set null / remove element)
//! - a broadcast of every change, consumed by the realtime hub
//!
//! ```text
//! insert/update: validate → stamp → unique + FK checks → backend → ChangeEvent
//! delete:        plan (walk referencing rows) → patches → deletes → ChangeEvents
//! ```

use crate::storage::backend::{Backend, BackendKind};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::local::row_id;
use crate::storage::types::{
    BrokerageConfig, Dataset, OnDelete, Record, Table, DATASET_VERSION,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

const CHANGE_CAPACITY: usize = 256;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
    /// The whole dataset was replaced
    Reload,
}

/// A change published after every successful mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Affected table; `None` for a full reload
    pub table: Option<Table>,
    pub id: Option<Uuid>,
    pub action: ChangeAction,
}

impl ChangeEvent {
    fn row(table: Table, id: Uuid, action: ChangeAction) -> Self {
        Self {
            table: Some(table),
            id: Some(id),
            action,
        }
    }

    fn reload() -> Self {
        Self {
            table: None,
            id: None,
            action: ChangeAction::Reload,
        }
    }
}

/// Filters and paging for list operations
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Top-level field → expected value (string form)
    pub filters: BTreeMap<String, String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add an equality filter
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Builder method: cap the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder method: skip leading results
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Does a row satisfy every filter?
    ///
    /// Arrays match when they contain the value; `null` matches a missing or
    /// null field.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|(field, expected)| {
            match row.get(field).unwrap_or(&Value::Null) {
                Value::Null => expected == "null",
                Value::String(s) => s == expected,
                Value::Array(items) => items
                    .iter()
                    .any(|item| item.as_str().map_or(item.to_string() == *expected, |s| s == expected)),
                other => other.to_string() == *expected,
            }
        })
    }
}

/// Outcome of a delete, including everything the policies touched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteReport {
    /// Rows removed, the target included
    pub deleted: usize,
    /// Rows patched by set-null or remove-element policies
    pub updated: usize,
}

#[derive(Default)]
struct DeletePlan {
    /// In discovery order; the target comes first
    deletes: Vec<(Table, Uuid)>,
    patches: HashMap<(Table, Uuid), Value>,
}

/// Typed repository over a backend
pub struct Store {
    backend: Arc<dyn Backend>,
    changes: broadcast::Sender<ChangeEvent>,
    /// Serializes check-then-write sequences
    write_lock: Mutex<()>,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            backend,
            changes,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Receive every change made through this store
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        tracing::debug!(table = ?event.table, id = ?event.id, action = ?event.action, "Store change");
        // No subscribers is fine
        let _ = self.changes.send(event);
    }

    /// Tell subscribers the dataset was replaced behind the store's back
    pub fn notify_reload(&self) {
        self.publish(ChangeEvent::reload());
    }

    // ==================== Reads ====================

    /// Raw rows of a table matching `query`, ordered by `created_at`
    pub async fn list_rows(&self, table: Table, query: &ListQuery) -> StorageResult<Vec<Value>> {
        let mut rows: Vec<Value> = self
            .backend
            .rows(table)
            .await?
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();

        rows.sort_by_cached_key(|row| {
            row.get("created_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        });

        let rows = rows.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }

    /// Typed list
    pub async fn list<T: Record>(&self, query: &ListQuery) -> StorageResult<Vec<T>> {
        self.list_rows(T::TABLE, query)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(StorageError::from))
            .collect()
    }

    /// Every record of a table
    pub async fn all<T: Record>(&self) -> StorageResult<Vec<T>> {
        self.list(&ListQuery::new()).await
    }

    pub async fn get_row(&self, table: Table, id: Uuid) -> StorageResult<Option<Value>> {
        self.backend.row(table, id).await
    }

    pub async fn get<T: Record>(&self, id: Uuid) -> StorageResult<Option<T>> {
        match self.backend.row(T::TABLE, id).await? {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing row is an error
    pub async fn require<T: Record>(&self, id: Uuid) -> StorageResult<T> {
        self.get(id)
            .await?
            .ok_or_else(|| StorageError::not_found(T::TABLE, id))
    }

    pub async fn count<T: Record>(&self) -> StorageResult<usize> {
        Ok(self.backend.rows(T::TABLE).await?.len())
    }

    // ==================== Writes ====================

    /// Insert a new record with fresh timestamps
    pub async fn insert<T: Record>(&self, mut record: T) -> StorageResult<T> {
        record.validate().map_err(StorageError::Invalid)?;
        record.stamp_created(Utc::now());

        let row = serde_json::to_value(&record)?;
        let id = record.id();

        let _guard = self.write_lock.lock().await;
        self.check_row(T::TABLE, id, &row).await?;
        self.backend.insert_row(T::TABLE, id, row).await?;
        drop(_guard);

        tracing::debug!(table = %T::TABLE, id = %id, "Inserted record");
        self.publish(ChangeEvent::row(T::TABLE, id, ChangeAction::Insert));
        Ok(record)
    }

    /// Replace an existing record; `created_at` is kept, `updated_at` bumped
    pub async fn update<T: Record>(&self, mut record: T) -> StorageResult<T> {
        record.validate().map_err(StorageError::Invalid)?;
        let id = record.id();

        let _guard = self.write_lock.lock().await;
        let existing = self
            .backend
            .row(T::TABLE, id)
            .await?
            .ok_or_else(|| StorageError::not_found(T::TABLE, id))?;
        let existing_record: T = serde_json::from_value(existing.clone())?;

        record.stamp_created(existing_record.created_at());
        record.stamp_updated(Utc::now());
        let row = serde_json::to_value(&record)?;

        for field in T::immutable_fields() {
            if *field == "created_at" {
                continue;
            }
            if existing.get(*field) != row.get(*field) {
                return Err(StorageError::Invalid(format!("{} cannot be changed", field)));
            }
        }

        self.check_row(T::TABLE, id, &row).await?;
        self.backend.update_row(T::TABLE, id, row).await?;
        drop(_guard);

        self.publish(ChangeEvent::row(T::TABLE, id, ChangeAction::Update));
        Ok(record)
    }

    /// Delete a record of type `T`
    pub async fn delete<T: Record>(&self, id: Uuid) -> StorageResult<DeleteReport> {
        self.delete_row(T::TABLE, id).await
    }

    /// Delete a row and apply the delete policy of everything referencing it
    pub async fn delete_row(&self, table: Table, id: Uuid) -> StorageResult<DeleteReport> {
        let _guard = self.write_lock.lock().await;

        if self.backend.row(table, id).await?.is_none() {
            return Err(StorageError::not_found(table, id));
        }

        let plan = self.plan_delete(table, id).await?;
        let doomed: HashSet<(Table, Uuid)> = plan.deletes.iter().copied().collect();
        let mut events = Vec::new();
        let mut report = DeleteReport::default();

        let now = serde_json::to_value(Utc::now())?;
        for ((t, row_id), mut row) in plan.patches {
            if doomed.contains(&(t, row_id)) {
                continue;
            }
            if let Some(obj) = row.as_object_mut() {
                obj.insert("updated_at".to_string(), now.clone());
            }
            self.backend.update_row(t, row_id, row).await?;
            report.updated += 1;
            events.push(ChangeEvent::row(t, row_id, ChangeAction::Update));
        }

        // Dependents before the rows they reference
        for (t, row_id) in plan.deletes.into_iter().rev() {
            if self.backend.delete_row(t, row_id).await? {
                report.deleted += 1;
                events.push(ChangeEvent::row(t, row_id, ChangeAction::Delete));
            }
        }
        drop(_guard);

        tracing::debug!(
            table = %table,
            id = %id,
            deleted = report.deleted,
            updated = report.updated,
            "Deleted record"
        );
        for event in events {
            self.publish(event);
        }
        Ok(report)
    }

    async fn plan_delete(&self, table: Table, id: Uuid) -> StorageResult<DeletePlan> {
        let mut plan = DeletePlan::default();
        let mut queue = VecDeque::from([(table, id)]);
        let mut seen = HashSet::from([(table, id)]);
        let mut cache: HashMap<Table, Vec<Value>> = HashMap::new();

        while let Some((target, target_id)) = queue.pop_front() {
            plan.deletes.push((target, target_id));

            for dependent in Table::all() {
                for key in dependent.foreign_keys().iter().filter(|k| k.target == target) {
                    if !cache.contains_key(dependent) {
                        cache.insert(*dependent, self.backend.rows(*dependent).await?);
                    }
                    let rows = cache.get(dependent).map(Vec::as_slice).unwrap_or(&[]);

                    for row in rows.iter().filter(|r| references(r, key.field, target_id)) {
                        let Some(dep_id) = row_id(row) else { continue };

                        match key.on_delete {
                            OnDelete::Restrict => {
                                return Err(StorageError::ForeignKey(format!(
                                    "cannot delete {} {}: still referenced by {} {}",
                                    target, target_id, dependent, dep_id
                                )));
                            }
                            OnDelete::Cascade => {
                                if seen.insert((*dependent, dep_id)) {
                                    queue.push_back((*dependent, dep_id));
                                }
                            }
                            OnDelete::SetNull => {
                                let patched = plan
                                    .patches
                                    .entry((*dependent, dep_id))
                                    .or_insert_with(|| row.clone());
                                if let Some(obj) = patched.as_object_mut() {
                                    obj.insert(key.field.to_string(), Value::Null);
                                }
                            }
                            OnDelete::RemoveElement => {
                                let patched = plan
                                    .patches
                                    .entry((*dependent, dep_id))
                                    .or_insert_with(|| row.clone());
                                if let Some(Value::Array(items)) = patched.get_mut(key.field) {
                                    let target_str = target_id.to_string();
                                    items.retain(|item| item.as_str() != Some(target_str.as_str()));
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(plan)
    }

    /// Unique and foreign key checks for a row about to be written
    async fn check_row(&self, table: Table, id: Uuid, row: &Value) -> StorageResult<()> {
        let unique = table.unique_fields();
        if !unique.is_empty() {
            let existing = self.backend.rows(table).await?;
            for field in unique {
                let Some(value) = row.get(*field).and_then(Value::as_str) else {
                    continue;
                };
                let needle = value.to_lowercase();
                let clash = existing.iter().any(|other| {
                    row_id(other) != Some(id)
                        && other
                            .get(*field)
                            .and_then(Value::as_str)
                            .is_some_and(|v| v.to_lowercase() == needle)
                });
                if clash {
                    return Err(StorageError::Conflict {
                        table: table.to_string(),
                        field: field.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }

        for key in table.foreign_keys() {
            let referenced: Vec<&Value> = match row.get(key.field) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items.iter().collect(),
                Some(single) => vec![single],
            };

            for value in referenced {
                let target_id = value
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| {
                        StorageError::Invalid(format!("{}.{} must hold UUIDs", table, key.field))
                    })?;

                if self.backend.row(key.target, target_id).await?.is_none() {
                    return Err(StorageError::ForeignKey(format!(
                        "{}.{} references missing {} {}",
                        table, key.field, key.target, target_id
                    )));
                }
            }
        }

        Ok(())
    }

    // ==================== Settings ====================

    /// Tenant settings, or defaults when none were saved
    pub async fn config(&self) -> StorageResult<BrokerageConfig> {
        Ok(self
            .get::<BrokerageConfig>(Uuid::nil())
            .await?
            .unwrap_or_default())
    }

    /// Create or replace tenant settings
    pub async fn put_config(&self, mut config: BrokerageConfig) -> StorageResult<BrokerageConfig> {
        config.id = Uuid::nil();
        if self.backend.row(Table::BrokerageConfig, Uuid::nil()).await?.is_some() {
            self.update(config).await
        } else {
            self.insert(config).await
        }
    }

    // ==================== Whole dataset ====================

    pub async fn export(&self) -> StorageResult<Dataset> {
        self.backend.snapshot().await
    }

    /// Replace all data with `dataset`
    pub async fn import(&self, dataset: &Dataset) -> StorageResult<()> {
        if dataset.version > DATASET_VERSION {
            return Err(StorageError::Invalid(format!(
                "Unsupported dataset version {}",
                dataset.version
            )));
        }
        for (name, rows) in &dataset.tables {
            name.parse::<Table>().map_err(StorageError::Invalid)?;
            if rows.iter().any(|row| row_id(row).is_none()) {
                return Err(StorageError::Invalid(format!("{} row without a valid id", name)));
            }
        }

        let _guard = self.write_lock.lock().await;
        self.backend.restore(dataset).await?;
        drop(_guard);

        tracing::info!(rows = dataset.len(), backend = %self.backend.kind(), "Imported dataset");
        self.notify_reload();
        Ok(())
    }
}

/// Does `row.field` point at `id` (directly or as an array element)?
fn references(row: &Value, field: &str, id: Uuid) -> bool {
    let id = id.to_string();
    match row.get(field) {
        Some(Value::String(s)) => *s == id,
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(id.as_str())),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::{LocalBackend, LocalStore};
    use crate::storage::sqlite::SqliteBackend;
    use crate::storage::types::{
        Company, Delegation, Department, DepartmentContent, ContentKind, News, Product,
        ProductCategory, Role, User, UserRole,
    };

    fn backends() -> Vec<Store> {
        vec![
            Store::new(Arc::new(SqliteBackend::open_in_memory().unwrap())),
            Store::new(Arc::new(LocalBackend::new(LocalStore::in_memory(Dataset::new())))),
        ]
    }

    fn user(email: &str, delegation_id: Option<Uuid>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: "Ana".to_string(),
            last_name: "García".to_string(),
            phone: None,
            position: None,
            avatar_url: None,
            delegation_id,
            department_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_get_list() {
        for store in backends() {
            let a = store.insert(Company::new("Mapfre")).await.unwrap();
            let b = store.insert(Company::new("Allianz")).await.unwrap();

            let fetched: Company = store.require(a.id).await.unwrap();
            assert_eq!(fetched.name, "Mapfre");

            let all: Vec<Company> = store.all().await.unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].id, a.id);

            let filtered: Vec<Company> = store
                .list(&ListQuery::new().filter("name", "Allianz"))
                .await
                .unwrap();
            assert_eq!(filtered.len(), 1);
            assert_eq!(filtered[0].id, b.id);

            let page: Vec<Company> = store
                .list(&ListQuery::new().offset(1).limit(5))
                .await
                .unwrap();
            assert_eq!(page.len(), 1);
            assert_eq!(store.count::<Company>().await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_unique_is_case_insensitive() {
        for store in backends() {
            store.insert(Delegation::new("Madrid", "MAD")).await.unwrap();
            let err = store
                .insert(Delegation::new("Madrid Centro", "mad"))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::Conflict { ref field, .. } if field == "code"));
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_must_resolve() {
        for store in backends() {
            let orphan = Product::new("Hogar", Uuid::new_v4(), Uuid::new_v4());
            assert!(matches!(
                store.insert(orphan).await,
                Err(StorageError::ForeignKey(_))
            ));

            let company = store.insert(Company::new("AXA")).await.unwrap();
            let category = store.insert(ProductCategory::new("Hogar")).await.unwrap();
            let product = store
                .insert(Product::new("Hogar Plus", company.id, category.id))
                .await
                .unwrap();

            let mut moved = product.clone();
            moved.company_id = Uuid::new_v4();
            assert!(matches!(
                store.update(moved).await,
                Err(StorageError::ForeignKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_restrict_blocks_delete() {
        for store in backends() {
            let company = store.insert(Company::new("Generali")).await.unwrap();
            let category = store.insert(ProductCategory::new("Vida")).await.unwrap();
            store
                .insert(Product::new("Vida Riesgo", company.id, category.id))
                .await
                .unwrap();

            assert!(matches!(
                store.delete::<Company>(company.id).await,
                Err(StorageError::ForeignKey(_))
            ));
            assert!(store.get::<Company>(company.id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_cascade_set_null_and_remove_element() {
        for store in backends() {
            let delegation = store.insert(Delegation::new("Sevilla", "SVQ")).await.unwrap();
            let mut department = Department::new("Siniestros");
            department.delegation_id = Some(delegation.id);
            let department = store.insert(department).await.unwrap();

            let now = Utc::now();
            store
                .insert(DepartmentContent {
                    id: Uuid::new_v4(),
                    department_id: department.id,
                    title: "Protocolo".to_string(),
                    content: Some("...".to_string()),
                    kind: ContentKind::Text,
                    url: None,
                    sort_order: 0,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();

            let author = store
                .insert(user("ana@example.com", Some(delegation.id)))
                .await
                .unwrap();
            store
                .insert(UserRole {
                    id: Uuid::new_v4(),
                    user_id: author.id,
                    role: Role::Manager,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();

            let company = store.insert(Company::new("Reale")).await.unwrap();
            let mut news = News::new("Nuevo acuerdo", "Texto");
            news.author_id = Some(author.id);
            news.company_ids = vec![company.id];
            let news = store.insert(news).await.unwrap();

            // Cascade: department takes its contents along
            let report = store.delete::<Department>(department.id).await.unwrap();
            assert_eq!(report.deleted, 2);
            assert_eq!(store.count::<DepartmentContent>().await.unwrap(), 0);

            // Set null: users keep existing without their delegation
            store.delete::<Delegation>(delegation.id).await.unwrap();
            let author: User = store.require(author.id).await.unwrap();
            assert_eq!(author.delegation_id, None);

            // Remove element: news loses the company link
            store.delete::<Company>(company.id).await.unwrap();
            let news: News = store.require(news.id).await.unwrap();
            assert!(news.company_ids.is_empty());

            // Cascade to the role, set null on the news author
            store.delete::<User>(author.id).await.unwrap();
            assert_eq!(store.count::<UserRole>().await.unwrap(), 0);
            let news: News = store.require(news.id).await.unwrap();
            assert_eq!(news.author_id, None);
        }
    }

    #[tokio::test]
    async fn test_update_keeps_created_at_and_immutable_fields() {
        for store in backends() {
            let original = store.insert(user("luis@example.com", None)).await.unwrap();

            let mut changed = original.clone();
            changed.position = Some("Director".to_string());
            changed.created_at = Utc::now() + chrono::Duration::days(1);
            let updated = store.update(changed).await.unwrap();
            assert_eq!(updated.created_at, original.created_at);
            assert!(updated.updated_at >= original.updated_at);

            let mut renamed = updated.clone();
            renamed.email = "other@example.com".to_string();
            assert!(matches!(
                store.update(renamed).await,
                Err(StorageError::Invalid(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let stores = backends();
        let store = &stores[0];
        let mut rx = store.subscribe();

        let company = store.insert(Company::new("Caser")).await.unwrap();
        store.delete::<Company>(company.id).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first, ChangeEvent::row(Table::Companies, company.id, ChangeAction::Insert));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.action, ChangeAction::Delete);
    }

    #[tokio::test]
    async fn test_config_defaults_and_upsert() {
        for store in backends() {
            assert_eq!(store.config().await.unwrap().name, "Intranet");

            let mut config = BrokerageConfig::default();
            config.name = "Correduría Norte".to_string();
            store.put_config(config.clone()).await.unwrap();
            config.primary_color = Some("#1e40af".to_string());
            store.put_config(config).await.unwrap();

            let stored = store.config().await.unwrap();
            assert_eq!(stored.name, "Correduría Norte");
            assert_eq!(stored.primary_color.as_deref(), Some("#1e40af"));
            assert_eq!(store.count::<BrokerageConfig>().await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_export_import() {
        let stores = backends();
        let source = &stores[0];
        source.insert(Company::new("Zurich")).await.unwrap();
        let data = source.export().await.unwrap();

        for target in backends() {
            let mut rx = target.subscribe();
            target.import(&data).await.unwrap();
            assert_eq!(target.count::<Company>().await.unwrap(), 1);
            assert_eq!(rx.recv().await.unwrap().action, ChangeAction::Reload);
        }

        let mut bad = Dataset::new();
        bad.tables.insert("invoices".to_string(), vec![]);
        assert!(source.import(&bad).await.is_err());
    }

    #[test]
    fn test_list_query_matching() {
        let row = serde_json::json!({
            "published": true,
            "author_id": null,
            "company_ids": ["a", "b"],
            "title": "Hola"
        });
        assert!(ListQuery::new().filter("published", "true").matches(&row));
        assert!(ListQuery::new().filter("author_id", "null").matches(&row));
        assert!(ListQuery::new().filter("company_ids", "b").matches(&row));
        assert!(!ListQuery::new().filter("title", "hola").matches(&row));
    }
}
