//! Core record types for the intranet data store
//!
//! Every table holds flat JSON-serializable records with a UUID `id` and
//! `created_at` / `updated_at` timestamps. Table-level schema (foreign keys,
//! delete policies, unique columns) lives on [`Table`] so that both backends
//! enforce exactly the same invariants.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================
// TABLES & SCHEMA
// ============================================

/// A table in the intranet data model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Delegations,
    Departments,
    Users,
    Identities,
    UserRoles,
    SectionPermissions,
    Companies,
    ProductCategories,
    Products,
    News,
    DepartmentContents,
    SystemAlerts,
    NavigationShortcuts,
    BrokerageConfig,
}

/// What happens to dependent rows when a referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Refuse the delete while dependents exist
    Restrict,
    /// Delete dependents too
    Cascade,
    /// Null out the referencing column
    SetNull,
    /// Drop the id from a referencing array column
    RemoveElement,
}

/// A foreign key column on a table
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    /// Column holding the reference (a UUID string, or an array of them)
    pub field: &'static str,
    /// Referenced table
    pub target: Table,
    /// Delete policy applied when the referenced row goes away
    pub on_delete: OnDelete,
}

const fn fk(field: &'static str, target: Table, on_delete: OnDelete) -> ForeignKey {
    ForeignKey {
        field,
        target,
        on_delete,
    }
}

const DEPARTMENT_FKS: &[ForeignKey] =
    &[fk("delegation_id", Table::Delegations, OnDelete::SetNull)];
const USER_FKS: &[ForeignKey] = &[
    fk("delegation_id", Table::Delegations, OnDelete::SetNull),
    fk("department_id", Table::Departments, OnDelete::SetNull),
];
const IDENTITY_FKS: &[ForeignKey] = &[fk("id", Table::Users, OnDelete::Cascade)];
const USER_ROLE_FKS: &[ForeignKey] = &[fk("user_id", Table::Users, OnDelete::Cascade)];
const SECTION_PERMISSION_FKS: &[ForeignKey] =
    &[fk("user_id", Table::Users, OnDelete::Cascade)];
const PRODUCT_FKS: &[ForeignKey] = &[
    fk("company_id", Table::Companies, OnDelete::Restrict),
    fk("category_id", Table::ProductCategories, OnDelete::Restrict),
];
const NEWS_FKS: &[ForeignKey] = &[
    fk("author_id", Table::Users, OnDelete::SetNull),
    fk("company_ids", Table::Companies, OnDelete::RemoveElement),
    fk("category_ids", Table::ProductCategories, OnDelete::RemoveElement),
    fk("product_ids", Table::Products, OnDelete::RemoveElement),
];
const DEPARTMENT_CONTENT_FKS: &[ForeignKey] =
    &[fk("department_id", Table::Departments, OnDelete::Cascade)];

impl Table {
    /// All tables, in dependency-friendly order
    pub fn all() -> &'static [Table] {
        &[
            Table::Delegations,
            Table::Departments,
            Table::Users,
            Table::Identities,
            Table::UserRoles,
            Table::SectionPermissions,
            Table::Companies,
            Table::ProductCategories,
            Table::Products,
            Table::News,
            Table::DepartmentContents,
            Table::SystemAlerts,
            Table::NavigationShortcuts,
            Table::BrokerageConfig,
        ]
    }

    /// Table name as used in storage, topics and the API
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Delegations => "delegations",
            Table::Departments => "departments",
            Table::Users => "users",
            Table::Identities => "identities",
            Table::UserRoles => "user_roles",
            Table::SectionPermissions => "section_permissions",
            Table::Companies => "companies",
            Table::ProductCategories => "product_categories",
            Table::Products => "products",
            Table::News => "news",
            Table::DepartmentContents => "department_contents",
            Table::SystemAlerts => "system_alerts",
            Table::NavigationShortcuts => "navigation_shortcuts",
            Table::BrokerageConfig => "brokerage_config",
        }
    }

    /// Foreign keys declared on this table
    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        match self {
            Table::Departments => DEPARTMENT_FKS,
            Table::Users => USER_FKS,
            Table::Identities => IDENTITY_FKS,
            Table::UserRoles => USER_ROLE_FKS,
            Table::SectionPermissions => SECTION_PERMISSION_FKS,
            Table::Products => PRODUCT_FKS,
            Table::News => NEWS_FKS,
            Table::DepartmentContents => DEPARTMENT_CONTENT_FKS,
            _ => &[],
        }
    }

    /// Columns whose (case-insensitive) string value must be unique
    pub fn unique_fields(&self) -> &'static [&'static str] {
        match self {
            Table::Delegations => &["code"],
            Table::Users => &["email"],
            Table::Identities => &["email"],
            Table::UserRoles => &["user_id"],
            Table::Companies => &["name"],
            Table::ProductCategories => &["name"],
            _ => &[],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown table: {}", s))
    }
}

// ============================================
// RECORD TRAIT
// ============================================

/// A typed row of one table
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table this record lives in
    const TABLE: Table;

    fn id(&self) -> Uuid;

    fn created_at(&self) -> DateTime<Utc>;

    /// Set both timestamps for a freshly created row
    fn stamp_created(&mut self, now: DateTime<Utc>);

    /// Bump `updated_at`
    fn stamp_updated(&mut self, now: DateTime<Utc>);

    /// Columns an update may not change
    fn immutable_fields() -> &'static [&'static str] {
        &["id", "created_at"]
    }

    /// Record-level validation run before every write
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

macro_rules! impl_record {
    ($ty:ty, $table:expr) => {
        impl_record!($ty, $table, |_r: &$ty| Ok(()));
    };
    ($ty:ty, $table:expr, $validate:expr) => {
        impl Record for $ty {
            const TABLE: Table = $table;

            fn id(&self) -> Uuid {
                self.id
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn stamp_created(&mut self, now: DateTime<Utc>) {
                self.created_at = now;
                self.updated_at = now;
            }

            fn stamp_updated(&mut self, now: DateTime<Utc>) {
                self.updated_at = now;
            }

            fn validate(&self) -> Result<(), String> {
                let check: fn(&$ty) -> Result<(), String> = $validate;
                check(self)
            }
        }
    };
}

fn require(value: &str, what: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", what))
    } else {
        Ok(())
    }
}

// ============================================
// ACCESS CONTROL VOCABULARY
// ============================================

/// Account role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
            Role::User => write!(f, "user"),
        }
    }
}

/// Application section that permissions are granted on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Users,
    Delegations,
    Companies,
    Products,
    News,
    Departments,
    Alerts,
    Shortcuts,
    Settings,
}

impl Section {
    pub fn all() -> &'static [Section] {
        &[
            Section::Users,
            Section::Delegations,
            Section::Companies,
            Section::Products,
            Section::News,
            Section::Departments,
            Section::Alerts,
            Section::Shortcuts,
            Section::Settings,
        ]
    }

    /// Section guarding writes to a table
    pub fn for_table(table: Table) -> Section {
        match table {
            Table::Users | Table::Identities | Table::UserRoles | Table::SectionPermissions => {
                Section::Users
            }
            Table::Delegations => Section::Delegations,
            Table::Departments | Table::DepartmentContents => Section::Departments,
            Table::Companies => Section::Companies,
            Table::ProductCategories | Table::Products => Section::Products,
            Table::News => Section::News,
            Table::SystemAlerts => Section::Alerts,
            Table::NavigationShortcuts => Section::Shortcuts,
            Table::BrokerageConfig => Section::Settings,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Operation checked against a section permission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::View => write!(f, "view"),
            Action::Create => write!(f, "create"),
            Action::Edit => write!(f, "edit"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

// ============================================
// ORGANIZATION
// ============================================

/// A branch office; users and local data are organized under it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delegation {
    pub id: Uuid,
    pub name: String,
    /// Short unique code (e.g. "MAD")
    pub code: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delegation {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code: code.into(),
            address: None,
            city: None,
            province: None,
            postal_code: None,
            phone: None,
            email: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method: set the city
    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

impl_record!(Delegation, Table::Delegations, |d: &Delegation| {
    require(&d.name, "Delegation name")?;
    require(&d.code, "Delegation code")
});

/// A department (claims, underwriting, HR...) with its own content pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub delegation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Department {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            icon: None,
            sort_order: 0,
            delegation_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl_record!(Department, Table::Departments, |d: &Department| require(
    &d.name,
    "Department name"
));

/// Kind of a department content entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Text,
    Link,
    Document,
}

/// A content block shown on a department page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentContent {
    pub id: Uuid,
    pub department_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(DepartmentContent, Table::DepartmentContents, |c: &DepartmentContent| {
    require(&c.title, "Content title")?;
    match c.kind {
        ContentKind::Link | ContentKind::Document
            if c.url.as_deref().map_or(true, |u| u.trim().is_empty()) =>
        {
            Err("Link and document contents need a url".to_string())
        }
        _ => Ok(()),
    }
});

// ============================================
// PEOPLE & ACCESS
// ============================================

/// User profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub delegation_id: Option<Uuid>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Record for User {
    const TABLE: Table = Table::Users;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn stamp_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    fn stamp_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    // The sign-in identity is keyed by this email.
    fn immutable_fields() -> &'static [&'static str] {
        &["id", "created_at", "email"]
    }

    fn validate(&self) -> Result<(), String> {
        require(&self.email, "Email")?;
        require(&self.first_name, "First name")?;
        require(&self.last_name, "Last name")
    }
}

/// Sign-in identity; never exposed through the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    /// Same id as the user profile
    pub id: Uuid,
    /// Lowercased email
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(Identity, Table::Identities);

/// Role assignment (one per user)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(UserRole, Table::UserRoles);

/// Per-section permission flags of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub section: Section,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SectionPermission {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View => self.can_view,
            Action::Create => self.can_create,
            Action::Edit => self.can_edit,
            Action::Delete => self.can_delete,
        }
    }
}

impl_record!(SectionPermission, Table::SectionPermissions);

// ============================================
// CATALOG
// ============================================

/// Insurance company the brokerage works with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            logo_url: None,
            website: None,
            phone: None,
            email: None,
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl_record!(Company, Table::Companies, |c: &Company| require(
    &c.name,
    "Company name"
));

/// Product line (auto, home, life...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCategory {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductCategory {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            icon: None,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl_record!(ProductCategory, Table::ProductCategories, |c: &ProductCategory| {
    require(&c.name, "Category name")
});

/// An insurance product sold through a company
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub company_id: Uuid,
    pub category_id: Uuid,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, company_id: Uuid, category_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            company_id,
            category_id,
            document_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl_record!(Product, Table::Products, |p: &Product| require(
    &p.name,
    "Product name"
));

// ============================================
// COMMUNICATION
// ============================================

/// Internal news post, optionally linked to companies, categories and products
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct News {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author_id: Option<Uuid>,
    #[serde(default)]
    pub company_ids: Vec<Uuid>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl News {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            summary: None,
            content: content.into(),
            image_url: None,
            published: false,
            published_at: None,
            author_id: None,
            company_ids: Vec::new(),
            category_ids: Vec::new(),
            product_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl_record!(News, Table::News, |n: &News| {
    require(&n.title, "News title")?;
    if n.published && n.published_at.is_none() {
        return Err("Published news needs a published_at date".to_string());
    }
    Ok(())
});

/// Severity of a system alert banner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// Banner shown to every user while active
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemAlert {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SystemAlert {
    /// Active and inside its time window
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |s| s <= now)
            && self.ends_at.map_or(true, |e| now < e)
    }
}

impl_record!(SystemAlert, Table::SystemAlerts, |a: &SystemAlert| {
    require(&a.title, "Alert title")?;
    match (a.starts_at, a.ends_at) {
        (Some(s), Some(e)) if e <= s => Err("Alert must end after it starts".to_string()),
        _ => Ok(()),
    }
});

/// Quick link on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationShortcut {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_record!(NavigationShortcut, Table::NavigationShortcuts, |s: &NavigationShortcut| {
    require(&s.title, "Shortcut title")?;
    require(&s.url, "Shortcut url")
});

// ============================================
// TENANT SETTINGS
// ============================================

/// Tenant-level settings: name, logo, colors and terminology overrides.
///
/// Stored as a single row with the nil UUID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerageConfig {
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub dark_primary_color: Option<String>,
    #[serde(default)]
    pub dark_secondary_color: Option<String>,
    #[serde(default)]
    pub dark_accent_color: Option<String>,
    /// Domain noun → tenant label
    #[serde(default)]
    pub terminology: BTreeMap<String, String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for BrokerageConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            name: "Intranet".to_string(),
            logo_url: None,
            primary_color: None,
            secondary_color: None,
            accent_color: None,
            dark_primary_color: None,
            dark_secondary_color: None,
            dark_accent_color: None,
            terminology: BTreeMap::new(),
            contact_email: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl_record!(BrokerageConfig, Table::BrokerageConfig, |c: &BrokerageConfig| {
    if !c.id.is_nil() {
        return Err("Brokerage config id must be the nil UUID".to_string());
    }
    require(&c.name, "Brokerage name")
});

// ============================================
// DATASET
// ============================================

/// Current dataset format version
pub const DATASET_VERSION: u32 = 1;

/// The whole data set: table name → rows.
///
/// This is the shape of the demo blob, of seed data and of export/import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dataset {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<serde_json::Value>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self {
            version: DATASET_VERSION,
            tables: BTreeMap::new(),
        }
    }

    /// Rows of a table (empty when absent)
    pub fn rows(&self, table: Table) -> &[serde_json::Value] {
        self.tables
            .get(table.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rows_mut(&mut self, table: Table) -> &mut Vec<serde_json::Value> {
        self.tables.entry(table.as_str().to_string()).or_default()
    }

    /// Append a typed record
    pub fn push<T: Record>(&mut self, record: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(record)?;
        self.rows_mut(T::TABLE).push(value);
        Ok(())
    }

    /// Deserialize all rows of a table
    pub fn records<T: Record>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.rows(T::TABLE)
            .iter()
            .map(|row| serde_json::from_value(row.clone()))
            .collect()
    }

    /// Total number of rows across all tables
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn default_version() -> u32 {
    DATASET_VERSION
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trips_through_name() {
        for table in Table::all() {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), *table);
        }
        assert!("nope".parse::<Table>().is_err());
    }

    #[test]
    fn test_foreign_keys_point_at_real_tables() {
        for table in Table::all() {
            for key in table.foreign_keys() {
                assert!(Table::all().contains(&key.target));
                assert_ne!(key.target, *table);
            }
        }
    }

    #[test]
    fn test_foreign_key_policies() {
        let news: Vec<(&str, OnDelete)> = Table::News
            .foreign_keys()
            .iter()
            .map(|k| (k.field, k.on_delete))
            .collect();
        assert_eq!(news[0], ("author_id", OnDelete::SetNull));
        assert!(news[1..].iter().all(|(_, policy)| *policy == OnDelete::RemoveElement));

        assert_eq!(Table::Identities.foreign_keys()[0].on_delete, OnDelete::Cascade);
        assert!(Table::Products
            .foreign_keys()
            .iter()
            .all(|k| k.on_delete == OnDelete::Restrict));
        assert!(Table::Companies.foreign_keys().is_empty());
    }

    #[test]
    fn test_section_for_table() {
        assert_eq!(Section::for_table(Table::Products), Section::Products);
        assert_eq!(Section::for_table(Table::ProductCategories), Section::Products);
        assert_eq!(Section::for_table(Table::Identities), Section::Users);
        assert_eq!(Section::for_table(Table::BrokerageConfig), Section::Settings);
        assert_eq!(Section::Alerts.to_string(), "alerts");
    }

    #[test]
    fn test_alert_window() {
        let now = Utc::now();
        let mut alert = SystemAlert {
            id: Uuid::new_v4(),
            title: "Maintenance".to_string(),
            message: "Tonight".to_string(),
            severity: AlertSeverity::Warning,
            is_active: true,
            starts_at: Some(now - chrono::Duration::hours(1)),
            ends_at: Some(now + chrono::Duration::hours(1)),
            created_at: now,
            updated_at: now,
        };
        assert!(alert.is_live(now));

        alert.ends_at = Some(now);
        assert!(!alert.is_live(now));

        alert.ends_at = None;
        alert.is_active = false;
        assert!(!alert.is_live(now));
    }

    #[test]
    fn test_validation() {
        let mut company = Company::new("Mapfre");
        assert!(company.validate().is_ok());
        company.name = "  ".to_string();
        assert!(company.validate().is_err());

        let mut news = News::new("Launch", "Body");
        news.published = true;
        assert!(news.validate().is_err());
        news.published_at = Some(Utc::now());
        assert!(news.validate().is_ok());

        let config = BrokerageConfig {
            id: Uuid::new_v4(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_email_is_immutable() {
        assert!(User::immutable_fields().contains(&"email"));
        assert!(!Company::immutable_fields().contains(&"name"));
    }
}
