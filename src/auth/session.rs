//! Session tokens with inactivity expiry
//!
//! Tabs of the same browser share a token, so activity in any tab keeps the
//! session alive. Each reset is announced as [`SessionEvent::Activity`] so the
//! other tabs can restart their local idle timers; the sweeper announces
//! [`SessionEvent::Expired`] when a session times out and sign-out announces
//! [`SessionEvent::Revoked`]. Both carry the token so sockets opened with it
//! can be closed.

use super::AuthError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn expires_at(&self, idle: Duration) -> DateTime<Utc> {
        self.last_activity + idle
    }
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Activity {
        user_id: Uuid,
        at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Expired {
        user_id: Uuid,
        #[serde(skip)]
        token: String,
        at: DateTime<Utc>,
    },
    Revoked {
        user_id: Uuid,
        #[serde(skip)]
        token: String,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            SessionEvent::Activity { user_id, .. }
            | SessionEvent::Expired { user_id, .. }
            | SessionEvent::Revoked { user_id, .. } => *user_id,
        }
    }

    /// Token that stopped being valid, if any
    pub fn ended_token(&self) -> Option<&str> {
        match self {
            SessionEvent::Activity { .. } => None,
            SessionEvent::Expired { token, .. } | SessionEvent::Revoked { token, .. } => {
                Some(token)
            }
        }
    }
}

/// In-memory session table
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    idle: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(idle: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle,
            events,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Open a session for `user_id`
    pub async fn create(&self, user_id: Uuid) -> Session {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            last_activity: now,
        };

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        tracing::info!(user_id = %user_id, "Session created");
        session
    }

    /// Validate a token and reset its idle timer
    pub async fn validate(&self, token: &str) -> Result<Session, AuthError> {
        self.validate_at(token, Utc::now()).await
    }

    /// [`validate`](Self::validate) with an explicit clock
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let mut sessions = self.sessions.write().await;

        let session = sessions.get_mut(token).ok_or(AuthError::Unauthenticated)?;
        if now - session.last_activity > self.idle {
            let user_id = session.user_id;
            sessions.remove(token);
            drop(sessions);

            tracing::info!(user_id = %user_id, "Session expired on use");
            self.emit(SessionEvent::Expired {
                user_id,
                token: token.to_string(),
                at: now,
            });
            return Err(AuthError::SessionExpired);
        }

        session.last_activity = session.last_activity.max(now);
        let session = session.clone();
        drop(sessions);

        self.emit(SessionEvent::Activity {
            user_id: session.user_id,
            at: now,
            expires_at: session.expires_at(self.idle),
        });
        Ok(session)
    }

    fn emit_revoked(&self, session: Session) {
        self.emit(SessionEvent::Revoked {
            user_id: session.user_id,
            token: session.token,
            at: Utc::now(),
        });
    }

    /// End one session
    pub async fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token);
        match removed {
            Some(session) => {
                tracing::info!(user_id = %session.user_id, "Session revoked");
                self.emit_revoked(session);
                true
            }
            None => false,
        }
    }

    /// End every session of a user, returning how many were open
    pub async fn revoke_user(&self, user_id: Uuid) -> usize {
        let revoked: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            let tokens: Vec<String> = sessions
                .values()
                .filter(|s| s.user_id == user_id)
                .map(|s| s.token.clone())
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| sessions.remove(&token))
                .collect()
        };

        let count = revoked.len();
        for session in revoked {
            self.emit_revoked(session);
        }
        if count > 0 {
            tracing::info!(user_id = %user_id, count, "Sessions revoked");
        }
        count
    }

    /// Drop sessions idle for longer than the timeout
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<String> = sessions
                .values()
                .filter(|s| now - s.last_activity > self.idle)
                .map(|s| s.token.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|token| sessions.remove(&token))
                .collect()
        };

        for session in &expired {
            self.emit(SessionEvent::Expired {
                user_id: session.user_id,
                token: session.token.clone(),
                at: now,
            });
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired idle sessions");
        }
        expired.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Periodically expire idle sessions
    pub fn start_sweeper(self: &Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);

            loop {
                ticker.tick().await;
                manager.sweep_at(Utc::now()).await;
            }
        })
    }
}
