//! User provisioning
//!
//! Creating a user is a short sequence of writes:
//!
//! ```text
//! validate → users (profile + delegation link) → identities (password hash)
//!          → user_roles → section_permissions × every section
//! ```
//!
//! If a step fails the rows already written are removed (best effort; the
//! profile delete cascades to the rest) and the error is returned.
//!
//! Only admins may provision. The very first admin is created with the
//! one-time setup token, which is honoured only while no identity exists.
//! All provisioning is serialized, so two bootstrap requests racing each
//! other produce exactly one admin.

use crate::auth::{default_actions, password, AuthError, Principal};
use crate::storage::{
    Action, Delegation, Identity, ListQuery, Role, Section, SectionPermission, StorageError,
    Store, User, UserRole,
};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors from provisioning operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A user with email {0} already exists")]
    EmailTaken(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ============================================
// REQUESTS & RESULTS
// ============================================

/// Explicit grant for one section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionGrant {
    pub section: Section,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
}

impl PermissionGrant {
    /// Grant built from a list of actions
    pub fn from_actions(section: Section, actions: &[Action]) -> Self {
        Self {
            section,
            can_view: actions.contains(&Action::View),
            can_create: actions.contains(&Action::Create),
            can_edit: actions.contains(&Action::Edit),
            can_delete: actions.contains(&Action::Delete),
        }
    }
}

/// Input of the create-user function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub delegation_id: Option<Uuid>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub role: Role,
    /// Explicit grants; role defaults apply when absent
    #[serde(default)]
    pub permissions: Option<Vec<PermissionGrant>>,
}

/// Input of self sign-up
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<SignUpRequest> for CreateUserRequest {
    fn from(req: SignUpRequest) -> Self {
        Self {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: None,
            position: None,
            delegation_id: None,
            department_id: None,
            role: Role::User,
            permissions: None,
        }
    }
}

/// A freshly provisioned user
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedUser {
    pub user: User,
    pub role: Role,
    pub permissions: Vec<SectionPermission>,
}

/// Per-row failure of a bulk creation
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub index: usize,
    pub email: String,
    pub error: String,
}

/// Aggregate outcome of a bulk creation; successes are never rolled back
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub created: usize,
    pub failed: usize,
    pub users: Vec<Uuid>,
    pub errors: Vec<BulkFailure>,
}

// ============================================
// PROVISIONER
// ============================================

/// Creates users and manages their role and permission rows
pub struct Provisioner {
    store: Arc<Store>,
    lock: Mutex<()>,
    setup_token: Option<String>,
    bcrypt_cost: u32,
}

impl Provisioner {
    pub fn new(store: Arc<Store>, setup_token: Option<String>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            setup_token: setup_token.filter(|t| !t.trim().is_empty()),
            bcrypt_cost,
        }
    }

    /// Is the system still waiting for its first admin?
    pub async fn needs_bootstrap(&self) -> Result<bool, ProvisionError> {
        Ok(self.store.count::<Identity>().await? == 0)
    }

    /// The create-user function
    ///
    /// `caller` must be an admin, unless `setup_token` matches the configured
    /// token and no identity exists yet; that path always yields an admin.
    pub async fn create_user(
        &self,
        caller: Option<&Principal>,
        setup_token: Option<&str>,
        mut req: CreateUserRequest,
    ) -> Result<ProvisionedUser, ProvisionError> {
        let _guard = self.lock.lock().await;

        match (caller, setup_token) {
            (Some(principal), _) => {
                if !principal.is_admin() {
                    return Err(ProvisionError::Forbidden(
                        "only admins can create users".to_string(),
                    ));
                }
            }
            (None, Some(token)) => {
                self.check_setup_token(token).await?;
                req.role = Role::Admin;
                req.permissions = None;
                tracing::warn!(email = %req.email, "Bootstrapping first admin with setup token");
            }
            (None, None) => return Err(ProvisionError::Unauthenticated),
        }

        self.provision(req).await
    }

    /// Provision `req` as an admin if no identity exists yet
    ///
    /// Used by demo mode at startup. Returns `None` once setup is done.
    pub async fn bootstrap_admin(
        &self,
        mut req: CreateUserRequest,
    ) -> Result<Option<ProvisionedUser>, ProvisionError> {
        let _guard = self.lock.lock().await;
        if !self.needs_bootstrap().await? {
            return Ok(None);
        }

        req.role = Role::Admin;
        req.permissions = None;
        self.provision(req).await.map(Some)
    }

    /// Self sign-up: a plain user with view-only access
    pub async fn sign_up(&self, req: SignUpRequest) -> Result<ProvisionedUser, ProvisionError> {
        let _guard = self.lock.lock().await;
        self.provision(req.into()).await
    }

    /// Bulk creation; each row succeeds or fails on its own
    pub async fn create_users(
        &self,
        caller: &Principal,
        requests: Vec<CreateUserRequest>,
    ) -> Result<BulkReport, ProvisionError> {
        if !caller.is_admin() {
            return Err(ProvisionError::Forbidden(
                "only admins can create users".to_string(),
            ));
        }

        let mut report = BulkReport::default();
        for (index, req) in requests.into_iter().enumerate() {
            let email = req.email.clone();
            match self.create_user(Some(caller), None, req).await {
                Ok(created) => {
                    report.created += 1;
                    report.users.push(created.user.id);
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(BulkFailure {
                        index,
                        email,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            created = report.created,
            failed = report.failed,
            "Bulk user creation finished"
        );
        Ok(report)
    }

    async fn check_setup_token(&self, presented: &str) -> Result<(), ProvisionError> {
        let Some(expected) = &self.setup_token else {
            return Err(ProvisionError::Forbidden(
                "no setup token is configured".to_string(),
            ));
        };
        if !constant_time_eq(presented, expected) {
            return Err(ProvisionError::Forbidden("invalid setup token".to_string()));
        }
        if !self.needs_bootstrap().await? {
            return Err(ProvisionError::Forbidden(
                "setup has already been completed".to_string(),
            ));
        }
        Ok(())
    }

    /// Sequential writes; caller holds the lock
    async fn provision(&self, req: CreateUserRequest) -> Result<ProvisionedUser, ProvisionError> {
        let email = self.validate(&req).await?;
        let password_hash = password::hash_password(&req.password, self.bcrypt_cost).await?;
        let now = Utc::now();

        let user = self
            .store
            .insert(User {
                id: Uuid::new_v4(),
                email: email.clone(),
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                phone: req.phone.clone(),
                position: req.position.clone(),
                avatar_url: None,
                delegation_id: req.delegation_id,
                department_id: req.department_id,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;

        match self.write_access_rows(&user, &email, password_hash, &req).await {
            Ok(permissions) => {
                tracing::info!(user_id = %user.id, email = %email, role = %req.role, "Provisioned user");
                Ok(ProvisionedUser {
                    user,
                    role: req.role,
                    permissions,
                })
            }
            Err(e) => {
                // Cascades to whatever identity, role and permission rows made it in
                if let Err(cleanup) = self.store.delete::<User>(user.id).await {
                    tracing::warn!(user_id = %user.id, error = %cleanup, "Provisioning cleanup failed");
                }
                Err(e)
            }
        }
    }

    async fn write_access_rows(
        &self,
        user: &User,
        email: &str,
        password_hash: String,
        req: &CreateUserRequest,
    ) -> Result<Vec<SectionPermission>, ProvisionError> {
        let now = Utc::now();

        self.store
            .insert(Identity {
                id: user.id,
                email: email.to_string(),
                password_hash,
                last_sign_in_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.store
            .insert(UserRole {
                id: Uuid::new_v4(),
                user_id: user.id,
                role: req.role,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let grants = resolve_grants(req.role, req.permissions.as_deref());
        let mut permissions = Vec::with_capacity(grants.len());
        for grant in grants {
            permissions.push(self.store.insert(permission_row(user.id, &grant)).await?);
        }
        Ok(permissions)
    }

    /// Returns the normalized email
    async fn validate(&self, req: &CreateUserRequest) -> Result<String, ProvisionError> {
        let email = req.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ProvisionError::Validation(format!("invalid email: {}", req.email)));
        }
        if req.password.chars().count() < password::MIN_PASSWORD_LEN {
            return Err(ProvisionError::Validation(format!(
                "password must be at least {} characters",
                password::MIN_PASSWORD_LEN
            )));
        }
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "first and last name are required".to_string(),
            ));
        }
        if let Some(delegation_id) = req.delegation_id {
            if self.store.get::<Delegation>(delegation_id).await?.is_none() {
                return Err(ProvisionError::Validation(format!(
                    "delegation {} does not exist",
                    delegation_id
                )));
            }
        }

        let by_email = ListQuery::new().filter("email", email.clone());
        if !self.store.list::<Identity>(&by_email).await?.is_empty() {
            return Err(ProvisionError::EmailTaken(email));
        }
        // Profiles are matched case-insensitively by the unique check on insert

        Ok(email)
    }

    // ==================== Access management ====================

    /// Change a user's role; the last admin cannot be demoted
    pub async fn set_role(
        &self,
        caller: &Principal,
        user_id: Uuid,
        role: Role,
    ) -> Result<UserRole, ProvisionError> {
        caller.require_admin()?;
        let _guard = self.lock.lock().await;
        self.store.require::<User>(user_id).await?;

        let roles: Vec<UserRole> = self.store.all().await?;
        let current = roles.iter().find(|r| r.user_id == user_id).cloned();

        if role != Role::Admin && current.as_ref().is_some_and(|r| r.role == Role::Admin) {
            let admins = roles.iter().filter(|r| r.role == Role::Admin).count();
            if admins <= 1 {
                return Err(ProvisionError::Validation(
                    "cannot demote the last admin".to_string(),
                ));
            }
        }

        let updated = match current {
            Some(mut row) => {
                row.role = role;
                self.store.update(row).await?
            }
            None => {
                let now = Utc::now();
                self.store
                    .insert(UserRole {
                        id: Uuid::new_v4(),
                        user_id,
                        role,
                        created_at: now,
                        updated_at: now,
                    })
                    .await?
            }
        };

        tracing::info!(user_id = %user_id, role = %role, by = %caller.user_id, "Role changed");
        Ok(updated)
    }

    /// Replace the grants of the given sections
    pub async fn set_permissions(
        &self,
        caller: &Principal,
        user_id: Uuid,
        grants: Vec<PermissionGrant>,
    ) -> Result<Vec<SectionPermission>, ProvisionError> {
        caller.require_admin()?;
        let _guard = self.lock.lock().await;
        self.store.require::<User>(user_id).await?;

        let by_user = ListQuery::new().filter("user_id", user_id.to_string());
        let existing: Vec<SectionPermission> = self.store.list(&by_user).await?;

        for grant in grants {
            match existing.iter().find(|p| p.section == grant.section) {
                Some(row) => {
                    let mut row = row.clone();
                    row.can_view = grant.can_view;
                    row.can_create = grant.can_create;
                    row.can_edit = grant.can_edit;
                    row.can_delete = grant.can_delete;
                    self.store.update(row).await?;
                }
                None => {
                    self.store.insert(permission_row(user_id, &grant)).await?;
                }
            }
        }

        Ok(self.store.list(&by_user).await?)
    }

    /// Set a new password for `user_id`
    pub async fn set_password(&self, user_id: Uuid, new_password: &str) -> Result<(), ProvisionError> {
        if new_password.chars().count() < password::MIN_PASSWORD_LEN {
            return Err(ProvisionError::Validation(format!(
                "password must be at least {} characters",
                password::MIN_PASSWORD_LEN
            )));
        }

        let mut identity: Identity = self.store.require(user_id).await?;
        identity.password_hash = password::hash_password(new_password, self.bcrypt_cost).await?;
        self.store.update(identity).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }
}

fn resolve_grants(role: Role, explicit: Option<&[PermissionGrant]>) -> Vec<PermissionGrant> {
    let defaults = default_actions(role);
    Section::all()
        .iter()
        .map(|section| {
            explicit
                .and_then(|grants| grants.iter().find(|g| g.section == *section).cloned())
                .unwrap_or_else(|| PermissionGrant::from_actions(*section, defaults))
        })
        .collect()
}

fn permission_row(user_id: Uuid, grant: &PermissionGrant) -> SectionPermission {
    let now = Utc::now();
    SectionPermission {
        id: Uuid::new_v4(),
        user_id,
        section: grant.section,
        can_view: grant.can_view,
        can_create: grant.can_create,
        can_edit: grant.can_edit,
        can_delete: grant.can_delete,
        created_at: now,
        updated_at: now,
    }
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

/// Compares every byte regardless of where the first mismatch is
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
