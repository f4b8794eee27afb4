//! Intranet data storage
//!
//! - **types**: Records, table schema (foreign keys, delete policies, unique columns)
//! - **backend**: Row-level `Backend` trait
//! - **sqlite**: Primary backend on SQLite
//! - **local**: Demo-mode blob store under a fixed key, plus its backend
//! - **store**: Typed repository enforcing the schema and broadcasting changes
//! - **seed**: Deterministic demo dataset
//! - **files**: File buckets
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Store (typed CRUD, schema checks, ChangeEvent broadcast)
//!   ├─ SqliteBackend  records(tbl, id, body JSON)
//!   └─ LocalBackend   read-modify-write of one JSON blob
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use intranet::storage::{Company, SqliteBackend, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::new(Arc::new(SqliteBackend::open("./data/intranet.db")?));
//!
//!     let company = store.insert(Company::new("Mapfre")).await?;
//!     let fetched: Option<Company> = store.get(company.id).await?;
//!     assert!(fetched.is_some());
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod files;
pub mod local;
pub mod seed;
pub mod sqlite;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::{Backend, BackendKind};
pub use error::{StorageError, StorageResult};
pub use files::{Bucket, FileError, FileStore, StoredFile};
pub use local::{LocalBackend, LocalStore, StorageEvent, StorageSubscription, STORAGE_KEY};
pub use seed::demo_dataset;
pub use sqlite::SqliteBackend;
pub use store::{ChangeAction, ChangeEvent, DeleteReport, ListQuery, Store};
pub use types::{
    Action, AlertSeverity, BrokerageConfig, Company, ContentKind, Dataset, Delegation,
    Department, DepartmentContent, Identity, NavigationShortcut, News, OnDelete, Product,
    ProductCategory, Record, Role, Section, SectionPermission, SystemAlert, Table, User,
    UserRole,
};
