//! Auth Routes
//!
//! - POST /api/v1/auth/sign-in - Exchange credentials for a session token
//! - POST /api/v1/auth/sign-out - End the current session
//! - POST /api/v1/auth/sign-up - Self sign-up (when enabled)
//! - POST /api/v1/auth/activity - Activity heartbeat
//! - POST /api/v1/auth/password-reset - Request a reset mail
//! - POST /api/v1/auth/password-reset/confirm - Set a new password
//! - GET /api/v1/auth/me - Current principal and permissions

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{
    ActivityResponse, PasswordResetConfirm, PasswordResetRequest, SessionResponse,
    SignInRequest, StatusResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::auth::{self, password::MIN_PASSWORD_LEN, PrincipalView};
use crate::contact::escape_html;
use crate::provisioning::{ProvisionedUser, SignUpRequest};
use crate::storage::{Identity, ListQuery, StorageError, User};

/// POST /api/v1/auth/sign-in
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let (session, principal) =
        auth::sign_in(&state.store, &state.sessions, &req.email, &req.password).await?;

    tracing::info!(user_id = %principal.user_id, role = %principal.role, "Signed in");

    Ok(Json(SessionResponse {
        expires_at: session.expires_at(state.sessions.idle_timeout()),
        token: session.token,
        user: PrincipalView::from(&principal),
    }))
}

/// POST /api/v1/auth/sign-out
pub async fn sign_out(State(state): State<Arc<AppState>>, user: CurrentUser) -> StatusCode {
    state.sessions.revoke(&user.session.token).await;
    StatusCode::NO_CONTENT
}

/// POST /api/v1/auth/sign-up
///
/// Creates a plain user with view-only access.
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<ProvisionedUser>)> {
    if !state.config.auth.allow_sign_up {
        return Err(ApiError::Forbidden("sign-up is disabled".to_string()));
    }

    let created = state.provisioner.sign_up(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/v1/auth/activity
///
/// Extracting the caller already reset the idle timer and notified the
/// other tabs; this only reports the new deadline.
pub async fn activity(State(state): State<Arc<AppState>>, user: CurrentUser) -> Json<ActivityResponse> {
    let idle = state.sessions.idle_timeout();
    Json(ActivityResponse {
        expires_at: user.session.expires_at(idle),
        idle_timeout_secs: idle.num_seconds(),
    })
}

/// GET /api/v1/auth/me
pub async fn me(user: CurrentUser) -> Json<PrincipalView> {
    Json(PrincipalView::from(&user.principal))
}

/// POST /api/v1/auth/password-reset
///
/// Always 202, whether or not the email belongs to an account. The lookup and
/// the mail run in a background task, so the reply takes the same time either way.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    let email = req.email.trim().to_lowercase();
    tokio::spawn(send_reset_mail(state, email));

    Ok((StatusCode::ACCEPTED, Json(StatusResponse::new("accepted"))))
}

async fn send_reset_mail(state: Arc<AppState>, email: String) {
    if let Err(e) = try_send_reset_mail(&state, &email).await {
        tracing::error!(error = %e, "Password reset lookup failed");
    }
}

async fn try_send_reset_mail(state: &AppState, email: &str) -> Result<(), StorageError> {
    let identity = state
        .store
        .list::<Identity>(&ListQuery::new().filter("email", email))
        .await?
        .into_iter()
        .next();
    let Some(identity) = identity else {
        return Ok(());
    };

    let token = state.resets.issue(identity.id).await;
    let Some(contact) = &state.contact else {
        tracing::warn!(user_id = %identity.id, "No mail provider configured, reset token not delivered");
        return Ok(());
    };

    let name = state
        .store
        .get::<User>(identity.id)
        .await?
        .map(|u| u.full_name())
        .unwrap_or_else(|| email.to_string());
    let html = reset_mail_html(&name, &token.token);
    if let Err(e) = contact
        .send_transactional(email, &name, "Restablecer contraseña", &html)
        .await
    {
        tracing::error!(user_id = %identity.id, error = %e, "Failed to send reset mail");
    }
    Ok(())
}

fn reset_mail_html(name: &str, token: &str) -> String {
    format!(
        "<p>Hola {},</p><p>Usa este código para restablecer tu contraseña: \
         <strong>{}</strong></p><p>Caduca en {} minutos.</p>",
        escape_html(name),
        escape_html(token),
        auth::reset::RESET_TOKEN_TTL_MINUTES
    )
}

/// POST /api/v1/auth/password-reset/confirm
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirm>,
) -> ApiResult<Json<StatusResponse>> {
    // Checked first so a weak password does not burn the token
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user_id = state.resets.redeem(req.token.trim()).await?;
    state.provisioner.set_password(user_id, &req.password).await?;
    let revoked = state.sessions.revoke_user(user_id).await;

    tracing::info!(user_id = %user_id, revoked, "Password reset");
    Ok(Json(StatusResponse::new("ok")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_mail_escapes_name() {
        let html = reset_mail_html("<img src=x onerror=alert(1)> & Co", "abc123");
        assert!(html.contains("Hola &lt;img src=x onerror=alert(1)&gt; &amp; Co,"));
        assert!(!html.contains("<img"));
        assert!(html.contains("<strong>abc123</strong>"));
    }
}
