//! User Routes
//!
//! Users are created through the create-user function; these routes read and
//! maintain existing profiles.
//!
//! - GET /api/v1/users - List (non-admins see their delegation only)
//! - GET /api/v1/users/:id - Get a profile
//! - PUT /api/v1/users/:id - Update a profile
//! - DELETE /api/v1/users/:id - Delete a user with identity, role and grants
//! - GET /api/v1/users/:id/permissions - Section grants
//! - PUT /api/v1/users/:id/permissions - Replace section grants (admin)
//! - PUT /api/v1/users/:id/role - Change role (admin)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{ListParams, ListResponse, RoleRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::routes::records::{page, record_from_body};
use crate::api::state::AppState;
use crate::auth::Principal;
use crate::provisioning::PermissionGrant;
use crate::storage::{
    Action, DeleteReport, ListQuery, Section, SectionPermission, User, UserRole,
};

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse<User>>> {
    user.principal.require(Section::Users, Action::View)?;
    let query = params.to_query().map_err(ApiError::Validation)?;

    let unpaged = ListQuery {
        filters: query.filters.clone(),
        ..Default::default()
    };
    let visible: Vec<User> = state
        .store
        .list::<User>(&unpaged)
        .await?
        .into_iter()
        .filter(|u| user.principal.can_see_user(u))
        .collect();

    let total = visible.len();
    Ok(Json(ListResponse {
        items: page(visible, &query),
        total,
    }))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    user.principal.require(Section::Users, Action::View)?;
    Ok(Json(visible_user(&state, &user.principal, id).await?))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> ApiResult<Json<User>> {
    user.principal.require(Section::Users, Action::Edit)?;
    let existing = visible_user(&state, &user.principal, id).await?;

    let stored = serde_json::to_value(&existing).map_err(|e| ApiError::Internal(e.to_string()))?;
    let record: User = record_from_body(body, id, Some(stored))?;

    // Moving someone out of your delegation is an admin call
    if !user.principal.can_see_user(&record) {
        return Err(ApiError::Forbidden(
            "cannot move a user outside your delegation".to_string(),
        ));
    }

    let updated = state.store.update(record).await?;
    if !updated.is_active {
        state.sessions.revoke_user(id).await;
    }

    tracing::info!(user_id = %id, by = %user.principal.user_id, "Updated user");
    Ok(Json(updated))
}

/// DELETE /api/v1/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    user.principal.require(Section::Users, Action::Delete)?;
    if id == user.principal.user_id {
        return Err(ApiError::Validation("cannot delete your own account".to_string()));
    }
    visible_user(&state, &user.principal, id).await?;

    let report = state.store.delete::<User>(id).await?;
    state.sessions.revoke_user(id).await;

    tracing::info!(user_id = %id, deleted = report.deleted, by = %user.principal.user_id, "Deleted user");
    Ok(Json(report))
}

/// GET /api/v1/users/:id/permissions
pub async fn get_permissions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SectionPermission>>> {
    if id != user.principal.user_id {
        user.principal.require(Section::Users, Action::View)?;
        visible_user(&state, &user.principal, id).await?;
    }

    let by_user = ListQuery::new().filter("user_id", id.to_string());
    Ok(Json(state.store.list(&by_user).await?))
}

/// PUT /api/v1/users/:id/permissions
pub async fn set_permissions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(grants): Json<Vec<PermissionGrant>>,
) -> ApiResult<Json<Vec<SectionPermission>>> {
    let rows = state
        .provisioner
        .set_permissions(&user.principal, id, grants)
        .await?;
    Ok(Json(rows))
}

/// PUT /api/v1/users/:id/role
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<UserRole>> {
    let row = state
        .provisioner
        .set_role(&user.principal, id, req.role)
        .await?;
    Ok(Json(row))
}

/// Load `id`, hiding users outside the caller's delegation
async fn visible_user(state: &AppState, principal: &Principal, id: Uuid) -> ApiResult<User> {
    match state.store.get::<User>(id).await? {
        Some(found) if principal.can_see_user(&found) => Ok(found),
        _ => Err(ApiError::NotFound(format!("users {}", id))),
    }
}
