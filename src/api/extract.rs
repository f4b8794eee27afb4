//! Request extractors

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::{Principal, Session};

/// Header carrying the one-time bootstrap token
pub const SETUP_TOKEN_HEADER: &str = "x-setup-token";

/// The signed-in caller
///
/// Extracting it validates the bearer token, which also counts as activity
/// and resets the idle timer.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub principal: Principal,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

        let session = state.sessions.validate(token).await?;
        let principal = match Principal::load(&state.store, session.user_id).await {
            Ok(principal) => principal,
            Err(e) => {
                // Deleted or disabled since sign-in
                state.sessions.revoke(token).await;
                return Err(e.into());
            }
        };

        Ok(CurrentUser { principal, session })
    }
}

/// `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn setup_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SETUP_TOKEN_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
