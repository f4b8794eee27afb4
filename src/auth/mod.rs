//! Identities, sessions and permissions
//!
//! - **password**: bcrypt hashing off the async runtime
//! - **session**: opaque session tokens with an idle timeout
//! - **reset**: single-use password reset tokens
//!
//! Authorization is role plus per-section grants. Admins may do anything;
//! everyone else needs the matching `section:action` grant. The one row-level
//! rule is delegation scoping of the users list.

pub mod password;
pub mod reset;
pub mod session;

pub use reset::{ResetToken, ResetTokenStore};
pub use session::{Session, SessionEvent, SessionManager};

use crate::storage::{
    Action, Identity, ListQuery, Role, Section, SectionPermission, StorageError, Store, User,
    UserRole,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Errors from authentication and authorization
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    Inactive,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The authenticated caller of a request
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub delegation_id: Option<Uuid>,
    grants: HashSet<(Section, Action)>,
}

impl Principal {
    pub fn new(user_id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
            delegation_id: None,
            grants: HashSet::new(),
        }
    }

    /// Builder method: set the delegation
    pub fn with_delegation(mut self, delegation_id: Option<Uuid>) -> Self {
        self.delegation_id = delegation_id;
        self
    }

    /// Builder method: add one grant
    pub fn grant(mut self, section: Section, action: Action) -> Self {
        self.grants.insert((section, action));
        self
    }

    /// Load the principal of `user_id` from the store
    pub async fn load(store: &Store, user_id: Uuid) -> Result<Self, AuthError> {
        let user: User = store
            .get(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        let by_user = ListQuery::new().filter("user_id", user_id.to_string());
        let role = store
            .list::<UserRole>(&by_user)
            .await?
            .first()
            .map(|r| r.role)
            .unwrap_or_default();

        let mut principal = Principal::new(user.id, user.email, role).with_delegation(user.delegation_id);
        for permission in store.list::<SectionPermission>(&by_user).await? {
            for action in ALL_ACTIONS {
                if permission.allows(*action) {
                    principal.grants.insert((permission.section, *action));
                }
            }
        }

        Ok(principal)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can(&self, section: Section, action: Action) -> bool {
        self.is_admin() || self.grants.contains(&(section, action))
    }

    /// `Forbidden` unless [`can`](Self::can) holds
    pub fn require(&self, section: Section, action: Action) -> Result<(), AuthError> {
        if self.can(section, action) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!("{}:{}", section, action)))
        }
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("admin role".to_string()))
        }
    }

    /// Effective grants per section (admins get everything)
    pub fn permissions(&self) -> BTreeMap<Section, Vec<Action>> {
        Section::all()
            .iter()
            .map(|section| {
                let actions = ALL_ACTIONS
                    .iter()
                    .copied()
                    .filter(|action| self.can(*section, *action))
                    .collect();
                (*section, actions)
            })
            .collect()
    }

    /// Row-level rule for the users list: non-admins only see their delegation
    pub fn can_see_user(&self, user: &User) -> bool {
        self.is_admin() || (self.delegation_id.is_some() && user.delegation_id == self.delegation_id)
    }
}

/// Serializable view of a principal for `/auth/me`
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalView {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub delegation_id: Option<Uuid>,
    pub permissions: BTreeMap<Section, Vec<Action>>,
}

impl From<&Principal> for PrincipalView {
    fn from(p: &Principal) -> Self {
        Self {
            user_id: p.user_id,
            email: p.email.clone(),
            role: p.role,
            delegation_id: p.delegation_id,
            permissions: p.permissions(),
        }
    }
}

/// Verify credentials and open a session
pub async fn sign_in(
    store: &Store,
    sessions: &SessionManager,
    email: &str,
    password: &str,
) -> Result<(Session, Principal), AuthError> {
    let email = email.trim().to_lowercase();
    let identity = store
        .list::<Identity>(&ListQuery::new().filter("email", email.clone()))
        .await?
        .into_iter()
        .next()
        .ok_or(AuthError::InvalidCredentials)?;

    if !password::verify_password(password, &identity.password_hash).await {
        tracing::info!(email = %email, "Rejected sign-in");
        return Err(AuthError::InvalidCredentials);
    }

    let principal = Principal::load(store, identity.id).await?;

    let mut identity = identity;
    identity.last_sign_in_at = Some(chrono::Utc::now());
    store.update(identity).await?;

    let session = sessions.create(principal.user_id).await;
    Ok((session, principal))
}

/// Every action, in display order
pub const ALL_ACTIONS: &[Action] = &[Action::View, Action::Create, Action::Edit, Action::Delete];

/// Actions a role gets on every section when no explicit grants are given
pub fn default_actions(role: Role) -> &'static [Action] {
    match role {
        Role::Admin => ALL_ACTIONS,
        Role::Manager => &[Action::View, Action::Create, Action::Edit],
        Role::User => &[Action::View],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_can_everything() {
        let admin = Principal::new(Uuid::new_v4(), "a@x.es", Role::Admin);
        for section in Section::all() {
            for action in ALL_ACTIONS {
                assert!(admin.can(*section, *action));
            }
        }
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn test_grants_are_per_section() {
        let user = Principal::new(Uuid::new_v4(), "u@x.es", Role::User)
            .grant(Section::News, Action::View)
            .grant(Section::News, Action::Create);

        assert!(user.can(Section::News, Action::Create));
        assert!(!user.can(Section::News, Action::Delete));
        assert!(!user.can(Section::Companies, Action::View));

        let err = user.require(Section::Companies, Action::Edit).unwrap_err();
        assert_eq!(err.to_string(), "Missing permission: companies:edit");

        let perms = user.permissions();
        assert_eq!(perms[&Section::News], vec![Action::View, Action::Create]);
        assert!(perms[&Section::Users].is_empty());
    }

    #[test]
    fn test_role_defaults() {
        assert_eq!(default_actions(Role::Admin).len(), 4);
        assert!(!default_actions(Role::Manager).contains(&Action::Delete));
        assert_eq!(default_actions(Role::User), &[Action::View]);
    }
}
