//! # Intranet
//!
//! Brokerage intranet backend: a multi-tenant-ready REST API for an insurance
//! brokerage's internal portal, with role-based access, session management,
//! theming and change notifications.
//!
//! ## Features
//!
//! - **Typed records**: Delegations, departments, companies, products, news,
//!   alerts and shortcuts with foreign keys and delete policies
//! - **Two backends**: SQLite for production, a single JSON blob for demo mode
//! - **Access control**: Roles plus per-section permissions, scoped by delegation
//! - **Sessions**: Idle timeout with activity refresh and background expiry
//! - **Real-time**: WebSocket change notifications
//! - **Branding**: Theme colors rendered as CSS custom properties
//!
//! ## Modules
//!
//! - [`storage`]: Records, backends, the typed store and file buckets
//! - [`auth`]: Passwords, sessions, reset tokens and principals
//! - [`provisioning`]: User creation, roles and permissions
//! - [`theme`]: Color conversion and theme derivation
//! - [`terminology`]: Tenant-specific labels
//! - [`contact`]: Contact form and transactional email forwarding
//! - [`api`]: REST API server with Axum
//! - [`websocket`]: Change notifications
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use intranet::storage::{demo_dataset, Company, LocalBackend, LocalStore, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Demo mode: everything lives in one JSON blob
//!     let local = LocalStore::open("./data", demo_dataset());
//!     let store = Store::new(Arc::new(LocalBackend::new(local)));
//!
//!     store.insert(Company::new("Zurich")).await?;
//!
//!     let companies: Vec<Company> = store.all().await?;
//!     println!("Found {} companies", companies.len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod contact;
pub mod logging;
pub mod provisioning;
pub mod storage;
pub mod terminology;
pub mod theme;
pub mod websocket;

// Re-export top-level types for convenience
pub use storage::{
    Backend, BackendKind, BrokerageConfig, Dataset, LocalBackend, LocalStore, Record, Role,
    Section, SqliteBackend, StorageError, StorageResult, Store, Table,
};

pub use auth::{AuthError, Principal, SessionManager};

pub use provisioning::{CreateUserRequest, ProvisionError, Provisioner};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::Config;

pub use theme::{derive_theme, hex_to_hsl, ThemeMode};
