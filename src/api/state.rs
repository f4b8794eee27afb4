//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::auth::{ResetTokenStore, SessionManager};
use crate::config::Config;
use crate::contact::{ContactClient, ContactError};
use crate::provisioning::Provisioner;
use crate::storage::{FileStore, LocalStore, Store};
use crate::websocket::{ConnectionHub, HubConfig};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
pub struct AppState {
    /// Typed repository over the active backend
    pub store: Arc<Store>,
    pub sessions: Arc<SessionManager>,
    pub resets: Arc<ResetTokenStore>,
    pub provisioner: Arc<Provisioner>,
    /// Email provider client; `None` when forwarding is off
    pub contact: Option<Arc<ContactClient>>,
    pub files: Arc<FileStore>,
    /// WebSocket connection hub for change notifications
    pub ws_hub: Arc<ConnectionHub>,
    /// Demo blob store, present in demo mode only
    pub local: Option<LocalStore>,
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire every service from `config` around `store`
    pub fn new(store: Arc<Store>, config: Config) -> Self {
        let sessions = Arc::new(SessionManager::new(chrono::Duration::minutes(
            config.auth.session_idle_minutes.max(1),
        )));
        let provisioner = Arc::new(Provisioner::new(
            Arc::clone(&store),
            config.auth.setup_token.clone(),
            config.auth.bcrypt_cost,
        ));

        let contact = match ContactClient::new(config.contact.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(ContactError::NotConfigured) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Contact forwarding disabled");
                None
            }
        };

        let files = Arc::new(FileStore::new(
            config.storage.buckets_path(),
            config.api.max_upload_bytes,
        ));

        Self {
            store,
            sessions,
            resets: Arc::new(ResetTokenStore::new()),
            provisioner,
            contact,
            files,
            ws_hub: Arc::new(ConnectionHub::new(HubConfig::default())),
            local: None,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Builder method: attach the demo blob store
    pub fn with_local(mut self, local: LocalStore) -> Self {
        self.local = Some(local);
        self
    }

    /// Builder method: custom WebSocket hub configuration
    pub fn with_ws_config(mut self, hub_config: HubConfig) -> Self {
        self.ws_hub = Arc::new(ConnectionHub::new(hub_config));
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_demo(&self) -> bool {
        self.local.is_some()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.ws_hub.connection_count().await
    }
}
