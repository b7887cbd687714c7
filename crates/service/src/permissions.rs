//! Permission engine boundary and the field-level access it grants.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use models::Item;
use tracing::debug;

use crate::errors::ServiceError;

/// Who is acting. Computed upstream; this layer only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accountability {
    pub user: Option<String>,
    pub role: Option<String>,
    pub admin: bool,
    pub app: bool,
}

impl Accountability {
    pub fn admin() -> Self { Self { admin: true, app: true, ..Default::default() } }

    pub fn user(user: impl Into<String>, role: Option<&str>) -> Self {
        Self { user: Some(user.into()), role: role.map(str::to_string), admin: false, app: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
}

impl PermissionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Fields an action may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAccess {
    All,
    Only(BTreeSet<String>),
}

impl FieldAccess {
    pub fn only<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::Only(fields.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(fields) => fields.contains(field) || fields.contains("*"),
        }
    }

    /// Drop every field this access does not cover.
    pub fn retain(&self, item: &mut Item) {
        if let Self::Only(_) = self {
            item.retain(|field, _| self.allows(field));
        }
    }
}

#[async_trait]
pub trait PermissionEngine: Send + Sync {
    async fn authorize(
        &self,
        accountability: &Accountability,
        collection: &str,
        action: PermissionAction,
    ) -> Result<FieldAccess, ServiceError>;
}

/// Grants everything. Used when callers act without accountability.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionEngine for AllowAll {
    async fn authorize(&self, _: &Accountability, _: &str, _: PermissionAction) -> Result<FieldAccess, ServiceError> {
        Ok(FieldAccess::All)
    }
}

/// Static rules keyed by role, collection and action. Anything without a rule is forbidden.
#[derive(Debug, Clone, Default)]
pub struct PolicyPermissions {
    rules: HashMap<(String, String, PermissionAction), FieldAccess>,
}

/// Role name used for accountability without a role.
pub const PUBLIC_ROLE: &str = "$public";

impl PolicyPermissions {
    pub fn new() -> Self { Self::default() }

    pub fn allow(mut self, role: &str, collection: &str, action: PermissionAction, access: FieldAccess) -> Self {
        self.rules.insert((role.to_string(), collection.to_string(), action), access);
        self
    }
}

#[async_trait]
impl PermissionEngine for PolicyPermissions {
    async fn authorize(
        &self,
        accountability: &Accountability,
        collection: &str,
        action: PermissionAction,
    ) -> Result<FieldAccess, ServiceError> {
        let role = accountability.role.as_deref().unwrap_or(PUBLIC_ROLE);
        match self.rules.get(&(role.to_string(), collection.to_string(), action)) {
            Some(access) => Ok(access.clone()),
            None => {
                debug!(role, collection, action = action.as_str(), "permission_denied");
                Err(ServiceError::Forbidden(format!("{} on {collection} is not allowed", action.as_str())))
            }
        }
    }
}

/// Resolve field access. No accountability and admins bypass the engine.
pub async fn authorize(
    engine: &dyn PermissionEngine,
    accountability: Option<&Accountability>,
    collection: &str,
    action: PermissionAction,
) -> Result<FieldAccess, ServiceError> {
    match accountability {
        None => Ok(FieldAccess::All),
        Some(a) if a.admin => Ok(FieldAccess::All),
        Some(a) => engine.authorize(a, collection, action).await,
    }
}
