use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{TenantId, UserId};

use crate::permission::{Permission, PermissionCode, ScopeLevel};

/// Immutable role definition with its effective permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier.
    pub id: Uuid,
    /// Unique role code in its scope.
    pub code: String,
    /// Ordinal position in the role hierarchy.
    pub role_level: i32,
    /// Breadth at which the role applies.
    pub scope_level: ScopeLevel,
    /// Assignment priority; only actors at or above it may grant the role.
    pub priority: i32,
    /// Permissions granted through this role.
    pub permissions: Vec<Permission>,
}

impl Role {
    /// Returns whether this role grants the requested permission code.
    #[must_use]
    pub fn grants(&self, code: &PermissionCode) -> bool {
        self.permissions
            .iter()
            .any(|permission| permission.code.implies(code))
    }
}

/// Grant of a role to a user, owned by the role service.
///
/// `tenant_id = None` denotes a platform-scope assignment, valid in every
/// tenant context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// User the role is granted to.
    pub user_id: UserId,
    /// Granted role identifier.
    pub role_id: Uuid,
    /// Tenant the assignment is scoped to, if any.
    pub tenant_id: Option<TenantId>,
    /// Actor that granted the role.
    pub granted_by: UserId,
    /// When the role was granted.
    pub granted_at: DateTime<Utc>,
    /// Optional expiry; `None` means the assignment does not lapse.
    pub expires_at: Option<DateTime<Utc>>,
    /// Soft-delete flag cleared on revocation.
    pub is_active: bool,
}

impl RoleAssignment {
    /// Returns whether the assignment is in force at `now`.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use warden_core::UserId;

    use crate::permission::{Permission, PermissionCode, ScopeLevel};

    use super::{Role, RoleAssignment};

    fn assignment(is_active: bool, expires_in_hours: Option<i64>) -> RoleAssignment {
        let now = Utc::now();
        RoleAssignment {
            user_id: UserId::new("u-1"),
            role_id: Uuid::new_v4(),
            tenant_id: None,
            granted_by: UserId::new("admin"),
            granted_at: now,
            expires_at: expires_in_hours.map(|hours| now + Duration::hours(hours)),
            is_active,
        }
    }

    #[test]
    fn assignment_without_expiry_is_valid_while_active() {
        assert!(assignment(true, None).is_valid(Utc::now()));
        assert!(!assignment(false, None).is_valid(Utc::now()));
    }

    #[test]
    fn assignment_lapses_at_expiry() {
        assert!(assignment(true, Some(1)).is_valid(Utc::now()));
        assert!(!assignment(true, Some(-1)).is_valid(Utc::now()));
    }

    #[test]
    fn role_grants_through_wildcard_permission() {
        let Ok(wildcard) = PermissionCode::parse("users:*") else {
            panic!("code must parse");
        };
        let role = Role {
            id: Uuid::new_v4(),
            code: "tenant_admin".to_owned(),
            role_level: 2,
            scope_level: ScopeLevel::Tenant,
            priority: 50,
            permissions: vec![Permission {
                id: Uuid::new_v4(),
                code: wildcard,
                scope_level: ScopeLevel::Tenant,
                is_dangerous: false,
                requires_mfa: false,
                requires_approval: false,
            }],
        };

        let Ok(read) = PermissionCode::parse("users:read") else {
            panic!("code must parse");
        };
        let Ok(other) = PermissionCode::parse("orders:read") else {
            panic!("code must parse");
        };
        assert!(role.grants(&read));
        assert!(!role.grants(&other));
    }
}
