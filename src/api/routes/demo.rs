//! Demo Routes
//!
//! - GET /api/v1/demo/export - Full dataset as JSON (admin)
//! - POST /api/v1/demo/reset - Restore the seed dataset (admin, demo mode)
//!
//! A reset keeps the caller's own account so the session survives it.

use axum::{extract::State, Json};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::DemoResetResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::storage::{Dataset, Table};

/// GET /api/v1/demo/export
pub async fn export(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Dataset>> {
    user.principal.require_admin()?;
    let mut dataset = state.store.export().await?;
    // Password hashes never leave the server
    dataset.tables.remove(Table::Identities.as_str());
    Ok(Json(dataset))
}

/// POST /api/v1/demo/reset
pub async fn reset(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<DemoResetResponse>> {
    user.principal.require_admin()?;
    let local = state
        .local
        .as_ref()
        .ok_or_else(|| ApiError::Forbidden("reset is only available in demo mode".to_string()))?;

    let current = state.store.export().await?;
    let next = seed_keeping_user(local.seed(), &current, user.principal.user_id);
    state.store.import(&next).await?;

    tracing::warn!(by = %user.principal.user_id, rows = next.len(), "Demo data reset");
    Ok(Json(DemoResetResponse {
        status: "reset".to_string(),
        persistent: local.is_persistent(),
        rows: next.len(),
    }))
}

/// The seed plus `user_id`'s profile, identity, role and grants from `current`
pub(crate) fn seed_keeping_user(seed: &Dataset, current: &Dataset, user_id: Uuid) -> Dataset {
    let mut next = seed.clone();
    let id = Value::String(user_id.to_string());

    for table in [Table::Users, Table::Identities] {
        let keep: Vec<Value> = current
            .rows(table)
            .iter()
            .filter(|row| row.get("id") == Some(&id))
            .cloned()
            .collect();
        let rows = next.rows_mut(table);
        rows.retain(|row| row.get("id") != Some(&id));
        rows.extend(keep);
    }

    for table in [Table::UserRoles, Table::SectionPermissions] {
        let keep: Vec<Value> = current
            .rows(table)
            .iter()
            .filter(|row| row.get("user_id") == Some(&id))
            .cloned()
            .collect();
        let rows = next.rows_mut(table);
        rows.retain(|row| row.get("user_id") != Some(&id));
        rows.extend(keep);
    }

    // Links into rows the seed does not have are dropped
    for (field, target) in [
        ("delegation_id", Table::Delegations),
        ("department_id", Table::Departments),
    ] {
        let known: HashSet<String> = next
            .rows(target)
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
            .collect();
        for row in next.rows_mut(Table::Users).iter_mut() {
            if row.get("id") != Some(&id) {
                continue;
            }
            if let Some(link) = row.get_mut(field) {
                let dangling = link.as_str().is_some_and(|target_id| !known.contains(target_id));
                if dangling {
                    *link = Value::Null;
                }
            }
        }
    }

    next
}
