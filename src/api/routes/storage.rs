//! Storage Routes
//!
//! File buckets for logos, avatars, news images and department documents.
//! Uploaded objects are served read-only under `/files/{bucket}/{name}`.
//!
//! - POST /api/v1/storage/:bucket/:name - Upload (raw body)
//! - DELETE /api/v1/storage/:bucket/:name - Delete

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::storage::{Action, Bucket, Section, StoredFile};

/// Section whose permissions govern a bucket
fn bucket_section(bucket: Bucket) -> Section {
    match bucket {
        Bucket::Logos => Section::Settings,
        Bucket::Avatars => Section::Users,
        Bucket::News => Section::News,
        Bucket::Documents => Section::Departments,
    }
}

/// POST /api/v1/storage/:bucket/:name
pub async fn upload(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((bucket, name)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StoredFile>)> {
    let bucket: Bucket = bucket.parse()?;
    user.principal.require(bucket_section(bucket), Action::Create)?;

    let stored = state.files.upload(bucket, &name, &body).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// DELETE /api/v1/storage/:bucket/:name
pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((bucket, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let bucket: Bucket = bucket.parse()?;
    user.principal.require(bucket_section(bucket), Action::Delete)?;

    state.files.remove(bucket, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
