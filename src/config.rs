//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `INTRANET_*` environment variable overrides.

use crate::storage::BackendKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub contact: ContactConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `sqlite` (primary) or `local` (demo mode)
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Admin account provisioned on start in demo mode
    #[serde(default = "default_demo_admin_email")]
    pub demo_admin_email: String,

    #[serde(default = "default_demo_admin_password")]
    pub demo_admin_password: String,
}

fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("intranet").to_string_lossy().to_string())
        .unwrap_or_else(|| "./intranet_data".to_string())
}

fn default_demo_admin_email() -> String {
    "admin@demo.local".to_string()
}

fn default_demo_admin_password() -> String {
    "demo-admin".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            demo_admin_email: default_demo_admin_email(),
            demo_admin_password: default_demo_admin_password(),
        }
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_path().join("intranet.db")
    }

    /// Root of the file buckets
    pub fn buckets_path(&self) -> PathBuf {
        self.data_path().join("buckets")
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_upload() -> usize {
    10 * 1024 * 1024 // 10 MB
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Idle time after which a session expires
    #[serde(default = "default_session_idle")]
    pub session_idle_minutes: i64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// One-time token for creating the first admin
    #[serde(default)]
    pub setup_token: Option<String>,

    #[serde(default)]
    pub allow_sign_up: bool,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_session_idle() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_bcrypt_cost() -> u32 {
    10
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_idle_minutes: default_session_idle(),
            sweep_interval_secs: default_sweep_interval(),
            setup_token: None,
            allow_sign_up: false,
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

/// Email marketing provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ContactConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_contact_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// List new contacts are added to
    #[serde(default = "default_list_id")]
    pub list_id: u64,

    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    #[serde(default = "default_contact_timeout")]
    pub request_timeout_ms: u64,
}

fn default_contact_url() -> String {
    "https://api.brevo.com/v3".to_string()
}

fn default_list_id() -> u64 {
    1
}

fn default_sender_email() -> String {
    "no-reply@intranet.local".to_string()
}

fn default_sender_name() -> String {
    "Intranet".to_string()
}

fn default_contact_timeout() -> u64 {
    10_000
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_contact_url(),
            api_key: String::new(),
            list_id: default_list_id(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            request_timeout_ms: default_contact_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse TOML content
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("intranet").join("config.toml")),
            Some(PathBuf::from("/etc/intranet/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(backend) = var("INTRANET_STORAGE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "sqlite" => self.storage.backend = BackendKind::Sqlite,
                "local" | "demo" => self.storage.backend = BackendKind::Local,
                other => tracing::warn!("Ignoring unknown INTRANET_STORAGE_BACKEND {:?}", other),
            }
        }
        if let Some(data_dir) = var("INTRANET_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        // API overrides
        if let Some(host) = var("INTRANET_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("INTRANET_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(origins) = var("INTRANET_CORS_ORIGINS") {
            self.api.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Auth overrides
        if let Some(token) = var("INTRANET_SETUP_TOKEN") {
            self.auth.setup_token = Some(token);
        }
        if let Some(minutes) = var("INTRANET_SESSION_IDLE_MINUTES").and_then(|m| m.parse().ok()) {
            self.auth.session_idle_minutes = minutes;
        }

        // Contact overrides
        if let Some(key) = var("INTRANET_CONTACT_API_KEY") {
            self.contact.api_key = key;
            self.contact.enabled = true;
        }
        if let Some(url) = var("INTRANET_CONTACT_URL") {
            self.contact.base_url = url;
        }

        // Logging overrides
        if let Some(level) = var("INTRANET_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("INTRANET_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Intranet Configuration
#
# Environment variables override these settings:
# - INTRANET_STORAGE_BACKEND (sqlite | local)
# - INTRANET_DATA_DIR
# - INTRANET_API_HOST
# - INTRANET_API_PORT
# - INTRANET_CORS_ORIGINS (comma separated)
# - INTRANET_SETUP_TOKEN
# - INTRANET_SESSION_IDLE_MINUTES
# - INTRANET_CONTACT_API_KEY
# - INTRANET_CONTACT_URL
# - INTRANET_LOG_LEVEL
# - INTRANET_LOG_FORMAT

[storage]
# "sqlite" for the primary store, "local" for demo mode (single JSON blob)
backend = "sqlite"

# Directory for the database, the demo blob and uploaded files
data_dir = "~/.local/share/intranet"

# Demo mode signs in with this account
demo_admin_email = "admin@demo.local"
demo_admin_password = "demo-admin"

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8080

# Allowed CORS origins (empty list allows any origin)
cors_origins = ["http://localhost:5173", "http://127.0.0.1:5173"]

# Request timeout in seconds
request_timeout_secs = 30

# Largest accepted upload (bytes)
max_upload_bytes = 10485760

[auth]
# Sessions expire after this much inactivity
session_idle_minutes = 30

# How often idle sessions are swept (seconds)
sweep_interval_secs = 60

# One-time token for creating the first admin (only while no account exists)
# setup_token = "change-me"

# Allow self sign-up with view-only access
allow_sign_up = false

# bcrypt work factor
bcrypt_cost = 10

[contact]
# Forward contact form submissions to the email marketing provider
enabled = false
base_url = "https://api.brevo.com/v3"
api_key = ""

# List that new contacts join
list_id = 1

# Sender of transactional mails (password resets)
sender_email = "no-reply@intranet.local"
sender_name = "Intranet"

request_timeout_ms = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/intranet/intranet.log"
"#
    .to_string()
}
