//! Pre-commit checks over the user population.

use bitflags::bitflags;
use configs::UserLimitsConfig;
use models::schema::{ROLES_COLLECTION, USERS_COLLECTION};
use models::{role, user, Item};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::permissions::PermissionAction;

bitflags! {
    /// Checks a mutation asks to run before its transaction commits.
    /// Requests from nested calls are OR-ed together.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserIntegrityCheckFlag: u8 {
        /// At least one active administrator must remain.
        const REMAINING_ADMINS = 1 << 0;
        /// Active users must fit the configured seat ceilings.
        const USER_LIMITS = 1 << 1;
        const ALL = Self::REMAINING_ADMINS.bits() | Self::USER_LIMITS.bits();
    }
}

/// User fields that move a user between seat categories or out of the active set.
const USER_ACCESS_FIELDS: &[&str] = &["role", "status"];
/// Role fields that change the access level of every user holding the role.
const ROLE_ACCESS_FIELDS: &[&str] = &["admin_access", "app_access"];

/// Checks a write to `collection` must request. Only users and roles carry any.
pub fn required_checks(collection: &str, action: PermissionAction, payload: Option<&Item>) -> UserIntegrityCheckFlag {
    let touches = |fields: &[&str]| payload.is_some_and(|p| fields.iter().any(|f| p.contains_key(*f)));
    match (collection, action) {
        (USERS_COLLECTION, PermissionAction::Create) => UserIntegrityCheckFlag::USER_LIMITS,
        (USERS_COLLECTION, PermissionAction::Update) if touches(USER_ACCESS_FIELDS) => UserIntegrityCheckFlag::ALL,
        (USERS_COLLECTION, PermissionAction::Delete) => UserIntegrityCheckFlag::REMAINING_ADMINS,
        (ROLES_COLLECTION, PermissionAction::Update) if touches(ROLE_ACCESS_FIELDS) => UserIntegrityCheckFlag::ALL,
        (ROLES_COLLECTION, PermissionAction::Delete) => UserIntegrityCheckFlag::ALL,
        _ => UserIntegrityCheckFlag::empty(),
    }
}

/// Active users split by the access level their role grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounts {
    pub admin: u64,
    pub app: u64,
    pub api: u64,
}

impl UserCounts {
    /// Count active users as they stand inside `conn` (staged writes included).
    pub async fn load<C: ConnectionTrait>(conn: &C) -> Result<Self, ServiceError> {
        let rows = user::Entity::find()
            .filter(user::Column::Status.eq(user::STATUS_ACTIVE))
            .find_also_related(role::Entity)
            .all(conn)
            .await?;
        let mut counts = UserCounts::default();
        for (_, role) in rows {
            match role {
                Some(r) if r.admin_access => counts.admin += 1,
                Some(r) if r.app_access => counts.app += 1,
                _ => counts.api += 1,
            }
        }
        Ok(counts)
    }
}

/// Runs the requested checks against the open transaction.
#[derive(Debug, Clone, Default)]
pub struct UserIntegrityChecker {
    limits: UserLimitsConfig,
}

impl UserIntegrityChecker {
    pub fn new(limits: UserLimitsConfig) -> Self { Self { limits } }

    pub fn limits(&self) -> &UserLimitsConfig { &self.limits }

    pub async fn check<C: ConnectionTrait>(&self, conn: &C, flags: UserIntegrityCheckFlag) -> Result<(), ServiceError> {
        if flags.is_empty() {
            return Ok(());
        }
        let counts = UserCounts::load(conn).await?;
        debug!(?flags, ?counts, "user_integrity_check");
        if flags.contains(UserIntegrityCheckFlag::REMAINING_ADMINS) && counts.admin == 0 {
            warn!("user_integrity_no_admins_left");
            return Err(ServiceError::IntegrityViolation("at least one active administrator must remain".into()));
        }
        if flags.contains(UserIntegrityCheckFlag::USER_LIMITS) {
            let checks = [
                ("admin", counts.admin, self.limits.max_admin_users),
                ("app", counts.app, self.limits.max_app_users),
                ("api", counts.api, self.limits.max_api_users),
            ];
            for (kind, count, limit) in checks {
                if let Some(limit) = limit {
                    if count > limit {
                        warn!(kind, count, limit, "user_integrity_limit_exceeded");
                        return Err(ServiceError::IntegrityViolation(format!(
                            "active {kind} users ({count}) exceed the limit of {limit}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
