//! Function Routes
//!
//! Server-side functions with side effects beyond a single record.
//!
//! - POST /api/v1/functions/create-user - Create a user (admin, or `X-Setup-Token` for the first admin)
//! - POST /api/v1/functions/create-users - Bulk creation with a per-row report (admin)
//! - POST /api/v1/functions/contact - Forward a contact form submission (public)

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::extract::{setup_token, CurrentUser};
use crate::api::state::AppState;
use crate::contact::{ContactError, ContactReceipt, ContactSubmission};
use crate::provisioning::{BulkReport, CreateUserRequest, ProvisionedUser};

/// POST /api/v1/functions/create-user
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<ProvisionedUser>)> {
    let caller = user.as_ref().map(|u| &u.principal);
    let created = state
        .provisioner
        .create_user(caller, setup_token(&headers), req)
        .await?;

    tracing::info!(
        user_id = %created.user.id,
        role = %created.role,
        by = ?caller.map(|p| p.user_id),
        "Created user"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/v1/functions/create-users
///
/// Rows that fail are reported; rows that succeed stay created.
pub async fn create_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(requests): Json<Vec<CreateUserRequest>>,
) -> ApiResult<Json<BulkReport>> {
    let report = state
        .provisioner
        .create_users(&user.principal, requests)
        .await?;
    Ok(Json(report))
}

/// POST /api/v1/functions/contact
///
/// Bad submissions get 400 even when no provider is configured.
pub async fn contact(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<ContactSubmission>,
) -> ApiResult<Json<ContactReceipt>> {
    submission.validate()?;
    let client = state.contact.as_ref().ok_or(ContactError::NotConfigured)?;
    let receipt = client.submit(&submission).await?;
    Ok(Json(receipt))
}
