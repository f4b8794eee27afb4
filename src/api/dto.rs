//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::PrincipalView;
use crate::storage::{ListQuery, Role};

// ============================================
// AUTH DTOs
// ============================================

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Issued session plus who it belongs to
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: PrincipalView,
}

/// Heartbeat answer
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub expires_at: DateTime<Utc>,
    pub idle_timeout_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub password: String,
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

// ============================================
// RECORD DTOs
// ============================================

/// List response with the total before paging
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Query string of list endpoints
///
/// `limit` and `offset` page the result; every other parameter is an
/// equality filter on a top-level field (`?published=true`).
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ListParams(pub HashMap<String, String>);

impl ListParams {
    pub fn to_query(&self) -> Result<ListQuery, String> {
        let mut query = ListQuery::new();
        for (key, value) in &self.0 {
            match key.as_str() {
                "limit" => {
                    let limit = value
                        .parse()
                        .map_err(|_| format!("limit must be a number, got '{}'", value))?;
                    query = query.limit(limit);
                }
                "offset" => {
                    let offset = value
                        .parse()
                        .map_err(|_| format!("offset must be a number, got '{}'", value))?;
                    query = query.offset(offset);
                }
                _ => query = query.filter(key.clone(), value.clone()),
            }
        }
        Ok(query)
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

// ============================================
// SETTINGS DTOs
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct ThemeParams {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Theme patch plus a ready-to-inject CSS rule
#[derive(Debug, Serialize)]
pub struct ThemeResponse {
    #[serde(flatten)]
    pub patch: crate::theme::ThemePatch,
    pub css: String,
}

// ============================================
// HEALTH / DEMO DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Storage status: "ok" or "error"
    pub storage: String,
    /// Active backend: "sqlite" or "local"
    pub backend: String,
    pub sessions: usize,
    pub ws_connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}

/// Where the demo data lives
#[derive(Debug, Serialize)]
pub struct DemoResetResponse {
    pub status: String,
    pub persistent: bool,
    pub rows: usize,
}
