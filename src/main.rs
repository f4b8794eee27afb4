//! Intranet API Server
//!
//! Run with: cargo run --bin intranet
//!
//! # Configuration
//!
//! Settings come from the first config file found (`$XDG_CONFIG_HOME/intranet/config.toml`,
//! `/etc/intranet/config.toml`, `./config.toml`) with `INTRANET_*` environment
//! overrides on top. See `intranet-cli config` for every option.
//!
//! With `INTRANET_STORAGE_BACKEND=local` the server runs in demo mode: data
//! lives in one JSON blob seeded with a sample brokerage, and a demo admin
//! account is created on first start.

use intranet::api::{serve, AppState};
use intranet::config::Config;
use intranet::logging;
use intranet::provisioning::CreateUserRequest;
use intranet::storage::{
    demo_dataset, BackendKind, LocalBackend, LocalStore, Role, SqliteBackend, Store,
};
use intranet::websocket::{start_forwarder, EventSources};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_default();
    logging::init(&config.logging)?;

    tracing::info!("Starting Intranet API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {:?}", config.storage.data_path());

    // Initialize storage
    let (state, local_events) = match config.storage.backend {
        BackendKind::Sqlite => {
            let path = config.storage.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!("Opening SQLite database at {:?}", path);
            let store = Arc::new(Store::new(Arc::new(SqliteBackend::open(&path)?)));
            (AppState::new(store, config.clone()), None)
        }
        BackendKind::Local => {
            let local = LocalStore::open(config.storage.data_path(), demo_dataset());
            if !local.is_persistent() {
                tracing::warn!("Demo data is held in memory and will not survive a restart");
            }

            let backend = LocalBackend::new(local.handle());
            let events = backend.store().subscribe();
            let store = Arc::new(Store::new(Arc::new(backend)));
            (AppState::new(store, config.clone()).with_local(local), Some(events))
        }
    };
    let state = Arc::new(state);

    if state.is_demo() {
        ensure_demo_admin(&state, &config).await?;
    } else if state.provisioner.needs_bootstrap().await? {
        if config.auth.setup_token.is_some() {
            tracing::warn!("No accounts exist yet; create the first admin with the setup token");
        } else {
            tracing::warn!("No accounts exist and no setup token is configured (set INTRANET_SETUP_TOKEN)");
        }
    }

    // Background tasks
    let sweeper = state
        .sessions
        .start_sweeper(Duration::from_secs(config.auth.sweep_interval_secs.max(1)));
    let forwarder = start_forwarder(
        Arc::clone(&state.ws_hub),
        EventSources {
            changes: state.store.subscribe(),
            sessions: state.sessions.subscribe(),
            local: local_events,
        },
    );

    // Run server
    tracing::info!(
        backend = %state.store.backend_kind(),
        "Starting server on {}",
        config.api.addr()
    );
    let result = serve(Arc::clone(&state)).await;

    sweeper.abort();
    forwarder.abort();
    result?;

    tracing::info!("Intranet API server stopped");
    Ok(())
}

/// Create the demo admin account on first start
async fn ensure_demo_admin(
    state: &AppState,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let req = CreateUserRequest {
        email: config.storage.demo_admin_email.clone(),
        password: config.storage.demo_admin_password.clone(),
        first_name: "Demo".to_string(),
        last_name: "Admin".to_string(),
        phone: None,
        position: None,
        delegation_id: None,
        department_id: None,
        role: Role::Admin,
        permissions: None,
    };

    if let Some(created) = state.provisioner.bootstrap_admin(req).await? {
        tracing::info!(
            email = %created.user.email,
            "Demo admin created; sign in with the configured demo password"
        );
    }
    Ok(())
}
