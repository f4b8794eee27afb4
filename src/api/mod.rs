//! Intranet REST API
//!
//! HTTP API layer for the intranet, built with Axum.
//!
//! # Endpoints
//!
//! ## Auth
//! - `POST /api/v1/auth/sign-in`, `/sign-out`, `/sign-up`, `/activity`
//! - `POST /api/v1/auth/password-reset`, `/password-reset/confirm`
//! - `GET /api/v1/auth/me`
//!
//! ## Records
//! - `GET|POST /api/v1/{table}` and `GET|PUT|DELETE /api/v1/{table}/:id` for
//!   `delegations`, `departments`, `department-contents`, `companies`,
//!   `product-categories`, `products`, `news`, `system-alerts`, `shortcuts`
//! - `GET /api/v1/system-alerts/active` - Alerts inside their time window
//!
//! ## Users
//! - `GET /api/v1/users`, `GET|PUT|DELETE /api/v1/users/:id`
//! - `GET|PUT /api/v1/users/:id/permissions`, `PUT /api/v1/users/:id/role`
//!
//! ## Settings
//! - `GET|PUT /api/v1/settings`, `GET /api/v1/theme`, `GET /api/v1/terminology`
//!
//! ## Functions
//! - `POST /api/v1/functions/create-user`, `/create-users`, `/contact`
//!
//! ## Files
//! - `POST|DELETE /api/v1/storage/:bucket/:name`, `GET /files/:bucket/:name`
//!
//! ## Demo
//! - `GET /api/v1/demo/export`, `POST /api/v1/demo/reset`
//!
//! ## Health
//! - `GET /health/live`, `/health/ready`, `/health`
//!
//! ## WebSocket
//! - `GET /api/v1/ws?token=...` - Change notifications
//!
//! # Example
//!
//! ```rust,no_run
//! use intranet::api::{serve, AppState};
//! use intranet::config::Config;
//! use intranet::storage::{SqliteBackend, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store = Arc::new(Store::new(Arc::new(SqliteBackend::open(
//!         config.storage.database_path(),
//!     )?)));
//!
//!     serve(Arc::new(AppState::new(store, config))).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use extract::CurrentUser;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::storage::{
    Company, Delegation, Department, DepartmentContent, NavigationShortcut, News, Product,
    ProductCategory, Record, SystemAlert,
};
use crate::websocket::websocket_handler;

/// List/create plus get/update/delete for one record type
fn record_routes<T: Record>() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(routes::records::list::<T>).post(routes::records::create::<T>))
        .route(
            "/:id",
            get(routes::records::get::<T>)
                .put(routes::records::update::<T>)
                .delete(routes::records::delete::<T>),
        )
}

/// Build the API router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/sign-in", post(routes::auth::sign_in))
        .route("/sign-out", post(routes::auth::sign_out))
        .route("/sign-up", post(routes::auth::sign_up))
        .route("/activity", post(routes::auth::activity))
        .route("/password-reset", post(routes::auth::request_password_reset))
        .route(
            "/password-reset/confirm",
            post(routes::auth::confirm_password_reset),
        )
        .route("/me", get(routes::auth::me));

    let user_routes = Router::new()
        .route("/", get(routes::users::list_users))
        .route(
            "/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route(
            "/:id/permissions",
            get(routes::users::get_permissions).put(routes::users::set_permissions),
        )
        .route("/:id/role", put(routes::users::set_role));

    let function_routes = Router::new()
        .route("/create-user", post(routes::functions::create_user))
        .route("/create-users", post(routes::functions::create_users))
        .route("/contact", post(routes::functions::contact));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/functions", function_routes)
        // Record routes
        .nest("/delegations", record_routes::<Delegation>())
        .nest("/departments", record_routes::<Department>())
        .nest("/department-contents", record_routes::<DepartmentContent>())
        .nest("/companies", record_routes::<Company>())
        .nest("/product-categories", record_routes::<ProductCategory>())
        .nest("/products", record_routes::<Product>())
        .nest("/news", record_routes::<News>())
        .nest(
            "/system-alerts",
            record_routes::<SystemAlert>().route("/active", get(routes::records::active_alerts)),
        )
        .nest("/shortcuts", record_routes::<NavigationShortcut>())
        // Settings routes
        .route(
            "/settings",
            get(routes::settings::get_settings).put(routes::settings::put_settings),
        )
        .route("/theme", get(routes::settings::get_theme))
        .route("/terminology", get(routes::settings::get_terminology))
        // File routes
        .route(
            "/storage/:bucket/:name",
            post(routes::storage::upload).delete(routes::storage::remove),
        )
        // Demo routes
        .route("/demo/export", get(routes::demo::export))
        .route("/demo/reset", post(routes::demo::reset))
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.api.request_timeout_secs.max(1),
        )))
        // WebSocket route, outside the request timeout
        .route("/ws", get(websocket_handler))
        .layer(DefaultBodyLimit::max(state.config.api.max_upload_bytes));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .nest_service("/files", ServeDir::new(state.files.root()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.api))
        .with_state(state)
}

/// CORS from the configured origins; an empty list allows any origin
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: Arc<AppState>) -> Result<(), ApiError> {
    let addr = state.config.api.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Intranet API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Intranet API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::{demo_dataset, LocalBackend, LocalStore, SqliteBackend, Store};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};
    use tower::util::ServiceExt;

    const SETUP_TOKEN: &str = "let-me-in";

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_string_lossy().to_string();
        config.auth.setup_token = Some(SETUP_TOKEN.to_string());
        config.auth.bcrypt_cost = 4;
        config.api.cors_origins.clear();
        config
    }

    fn create_test_app() -> (Router, Arc<AppState>, TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::new(Arc::new(SqliteBackend::open_in_memory().unwrap())));
        let state = Arc::new(AppState::new(store, test_config(&dir)));
        (build_router(Arc::clone(&state)), state, dir)
    }

    fn create_demo_app() -> (Router, Arc<AppState>, TempDir) {
        let dir = tempdir().unwrap();
        let local = LocalStore::open(dir.path(), demo_dataset());
        let store = Arc::new(Store::new(Arc::new(LocalBackend::new(local.handle()))));
        let state = Arc::new(AppState::new(store, test_config(&dir)).with_local(local));
        (build_router(Arc::clone(&state)), state, dir)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn bootstrap_admin(app: &Router) -> String {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/functions/create-user")
            .header("Content-Type", "application/json")
            .header("X-Setup-Token", SETUP_TOKEN)
            .body(Body::from(
                json!({
                    "email": "admin@correduria.example",
                    "password": "admin-password",
                    "first_name": "Ana",
                    "last_name": "Admin"
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        sign_in(app, "admin@correduria.example", "admin-password").await
    }

    async fn sign_in(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/auth/sign-in",
            None,
            Some(json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _state, _dir) = create_test_app();

        assert_eq!(send(&app, "GET", "/health/live", None, None).await.0, StatusCode::OK);
        assert_eq!(send(&app, "GET", "/health/ready", None, None).await.0, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "sqlite");
    }

    #[tokio::test]
    async fn test_records_require_sign_in() {
        let (app, _state, _dir) = create_test_app();

        let (status, body) = send(&app, "GET", "/api/v1/companies", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert!(body["request_id"].is_string());

        let (status, _) = send(&app, "GET", "/api/v1/companies", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bootstrap_then_crud() {
        let (app, _state, _dir) = create_test_app();
        let token = bootstrap_admin(&app).await;

        let (status, me) = send(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "admin");

        let (status, company) = send(
            &app,
            "POST",
            "/api/v1/companies",
            Some(&token),
            Some(json!({"name": "Generali"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = company["id"].as_str().unwrap().to_string();

        // Names are unique regardless of case
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/companies",
            Some(&token),
            Some(json!({"name": "GENERALI"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/v1/companies/{}", id),
            Some(&token),
            Some(json!({"website": "https://generali.es"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Generali");
        assert_eq!(updated["website"], "https://generali.es");

        let (status, list) = send(&app, "GET", "/api/v1/companies?limit=10", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/v1/companies/{}", id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/companies/{}", id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_bootstrap_is_refused() {
        let (app, _state, _dir) = create_test_app();
        bootstrap_admin(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/functions/create-user")
            .header("Content-Type", "application/json")
            .header("X-Setup-Token", SETUP_TOKEN)
            .body(Body::from(
                json!({
                    "email": "intruder@correduria.example",
                    "password": "intruder-password",
                    "first_name": "I",
                    "last_name": "N"
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/functions/create-user",
            None,
            Some(json!({
                "email": "anon@correduria.example",
                "password": "anon-password",
                "first_name": "A",
                "last_name": "N"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plain_user_cannot_write() {
        let (app, _state, _dir) = create_test_app();
        let admin = bootstrap_admin(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/functions/create-user",
            Some(&admin),
            Some(json!({
                "email": "reader@correduria.example",
                "password": "reader-password",
                "first_name": "Rosa",
                "last_name": "Reader",
                "role": "user"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let reader = sign_in(&app, "reader@correduria.example", "reader-password").await;

        let (status, _) = send(&app, "GET", "/api/v1/news", Some(&reader), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/news",
            Some(&reader),
            Some(json!({"title": "Hola", "content": "..."})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = send(&app, "POST", "/api/v1/demo/reset", Some(&reader), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_sign_out_ends_session() {
        let (app, _state, _dir) = create_test_app();
        let token = bootstrap_admin(&app).await;

        let (status, activity) = send(&app, "POST", "/api/v1/auth/activity", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(activity["idle_timeout_secs"], 30 * 60);

        let (status, _) = send(&app, "POST", "/api/v1/auth/sign-out", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (app, state, _dir) = create_test_app();
        bootstrap_admin(&app).await;

        // Unknown addresses get the same answer
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/password-reset",
            None,
            Some(json!({"email": "nobody@correduria.example"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, me) = send(
            &app,
            "POST",
            "/api/v1/auth/sign-in",
            None,
            Some(json!({"email": "admin@correduria.example", "password": "admin-password"})),
        )
        .await;
        let user_id = me["user"]["user_id"].as_str().unwrap().parse().unwrap();
        let token = state.resets.issue(user_id).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/password-reset/confirm",
            None,
            Some(json!({"token": token.token, "password": "short"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/password-reset/confirm",
            None,
            Some(json!({"token": token.token, "password": "brand-new-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        sign_in(&app, "admin@correduria.example", "brand-new-password").await;
    }

    #[tokio::test]
    async fn test_public_settings_and_theme() {
        let (app, _state, _dir) = create_demo_app();

        let (status, settings) = send(&app, "GET", "/api/v1/settings", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settings["name"], "Correduría Demo");

        let (status, theme) = send(&app, "GET", "/api/v1/theme?mode=dark", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(theme["mode"], "dark");
        assert!(theme["css"].as_str().unwrap().starts_with(".dark"));

        let (status, _) = send(&app, "GET", "/api/v1/theme?mode=sepia", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, terms) = send(&app, "GET", "/api/v1/terminology", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(terms["companies"].is_string());
    }

    #[tokio::test]
    async fn test_published_news_filter() {
        let (app, _state, _dir) = create_demo_app();
        let token = bootstrap_admin(&app).await;

        let (status, all) = send(&app, "GET", "/api/v1/news", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, published) = send(&app, "GET", "/api/v1/news?published=true", Some(&token), None).await;

        assert_eq!(all["total"], 2);
        assert_eq!(published["total"], 1);
    }

    #[tokio::test]
    async fn test_demo_reset_restores_seed() {
        let (app, _state, _dir) = create_demo_app();
        let token = bootstrap_admin(&app).await;

        send(
            &app,
            "POST",
            "/api/v1/companies",
            Some(&token),
            Some(json!({"name": "Temporal"})),
        )
        .await;
        let (_, before) = send(&app, "GET", "/api/v1/companies", Some(&token), None).await;
        assert_eq!(before["total"], 4);

        let (status, body) = send(&app, "POST", "/api/v1/demo/reset", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["persistent"], true);

        // Still signed in, and the extra company is gone
        let (status, after) = send(&app, "GET", "/api/v1/companies", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["total"], 3);

        let (status, export) = send(&app, "GET", "/api/v1/demo/export", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(export["tables"].get("identities").is_none());
    }

    #[tokio::test]
    async fn test_contact_without_provider() {
        let (app, _state, _dir) = create_test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/functions/contact",
            None,
            Some(json!({
                "name": "Cliente",
                "email": "cliente@example.com",
                "message": "Quiero un seguro",
                "consent": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "CONTACT_NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn test_contact_validates_before_provider_check() {
        let (app, _state, _dir) = create_test_app();

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/functions/contact",
            None,
            Some(json!({
                "name": "Cliente",
                "email": "not-an-email",
                "message": "Quiero un seguro",
                "consent": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/functions/contact",
            None,
            Some(json!({
                "name": "Cliente",
                "email": "cliente@example.com",
                "message": "Quiero un seguro",
                "consent": false
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_and_serve_file() {
        let (app, _state, _dir) = create_test_app();
        let token = bootstrap_admin(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/storage/logos/brand.png")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::from(vec![0x89, b'P', b'N', b'G']))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/files/logos/brand.png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);

        let (status, _) = send(&app, "POST", "/api/v1/storage/secrets/x.txt", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_users_are_scoped_to_delegation() {
        let (app, _state, _dir) = create_demo_app();
        let admin = bootstrap_admin(&app).await;

        // Seeded Madrid delegation
        let madrid = "10000000-0000-4000-8000-000000000101";
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/functions/create-user",
            Some(&admin),
            Some(json!({
                "email": "jefa.madrid@correduria.example",
                "password": "manager-password",
                "first_name": "Elena",
                "last_name": "Gil",
                "role": "manager",
                "delegation_id": madrid
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let manager = sign_in(&app, "jefa.madrid@correduria.example", "manager-password").await;
        let (status, users) = send(&app, "GET", "/api/v1/users", Some(&manager), None).await;
        assert_eq!(status, StatusCode::OK);

        let items = users["items"].as_array().unwrap();
        assert!(!items.is_empty());
        assert!(items.iter().all(|u| u["delegation_id"] == madrid));

        // Valencia user is invisible
        let (status, _) = send(
            &app,
            "GET",
            "/api/v1/users/10000000-0000-4000-8000-000000000603",
            Some(&manager),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
