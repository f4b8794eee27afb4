//! Single-use password reset tokens

use super::AuthError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// How long a reset token stays valid
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct ResetToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ResetTokenStore {
    tokens: Mutex<HashMap<String, ResetToken>>,
}

impl ResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for `user_id`, replacing any earlier one
    pub async fn issue(&self, user_id: Uuid) -> ResetToken {
        let token = ResetToken {
            token: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        };

        let mut tokens = self.tokens.lock().await;
        tokens.retain(|_, t| t.user_id != user_id);
        tokens.insert(token.token.clone(), token.clone());
        token
    }

    /// Consume a token; it cannot be used twice
    pub async fn redeem(&self, token: &str) -> Result<Uuid, AuthError> {
        self.redeem_at(token, Utc::now()).await
    }

    pub async fn redeem_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, AuthError> {
        let entry = self
            .tokens
            .lock()
            .await
            .remove(token)
            .ok_or(AuthError::InvalidResetToken)?;

        if now >= entry.expires_at {
            return Err(AuthError::InvalidResetToken);
        }
        Ok(entry.user_id)
    }
}
