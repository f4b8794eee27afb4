//! Settings Routes
//!
//! Tenant branding is public: the sign-in page is themed before anyone
//! signs in.
//!
//! - GET /api/v1/settings - Brokerage config
//! - PUT /api/v1/settings - Replace brokerage config (settings:edit)
//! - GET /api/v1/theme?mode=light|dark - Derived CSS custom properties
//! - GET /api/v1/terminology - Resolved labels

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{ThemeParams, ThemeResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::storage::{Action, BrokerageConfig, Section};
use crate::terminology::Terminology;
use crate::theme::{derive_theme, ThemeMode};

/// GET /api/v1/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<Json<BrokerageConfig>> {
    Ok(Json(state.store.config().await?))
}

/// PUT /api/v1/settings
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(config): Json<BrokerageConfig>,
) -> ApiResult<Json<BrokerageConfig>> {
    user.principal.require(Section::Settings, Action::Edit)?;
    if config.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let saved = state.store.put_config(config).await?;
    tracing::info!(by = %user.principal.user_id, "Updated brokerage settings");
    Ok(Json(saved))
}

/// GET /api/v1/theme
pub async fn get_theme(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ThemeParams>,
) -> ApiResult<Json<ThemeResponse>> {
    let mode = match params.mode.as_deref() {
        Some(mode) => mode.parse::<ThemeMode>().map_err(ApiError::Validation)?,
        None => ThemeMode::default(),
    };

    let config = state.store.config().await?;
    let patch = derive_theme(&config, mode);
    let selector = match mode {
        ThemeMode::Light => ":root",
        ThemeMode::Dark => ".dark",
    };

    Ok(Json(ThemeResponse {
        css: patch.to_css(selector),
        patch,
    }))
}

/// GET /api/v1/terminology
pub async fn get_terminology(State(state): State<Arc<AppState>>) -> ApiResult<Json<Terminology>> {
    let config = state.store.config().await?;
    Ok(Json(Terminology::from_config(&config)))
}
