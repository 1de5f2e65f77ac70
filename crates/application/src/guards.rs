use warden_core::{AppError, AppResult, TenantId, UserContext};
use warden_domain::AccessLevel;

use crate::access_control_service::AccessControlService;
use crate::permission_service::PermissionService;
use crate::role_service::RoleService;

/// Guard primitives wrapping the decision services for external callers.
///
/// This façade is the only surface callers consume: a "denied" decision
/// becomes `AppError::Forbidden` carrying the decision's reason, while
/// infrastructure failures pass through unchanged so callers can
/// distinguish "lacks permission" from "authorization subsystem
/// unavailable".
#[derive(Clone)]
pub struct AuthGuard {
    permissions: PermissionService,
    roles: RoleService,
    access_control: AccessControlService,
}

impl AuthGuard {
    /// Creates a new guard façade over the decision services.
    #[must_use]
    pub fn new(
        permissions: PermissionService,
        roles: RoleService,
        access_control: AccessControlService,
    ) -> Self {
        Self {
            permissions,
            roles,
            access_control,
        }
    }

    /// Requires one permission; superadmins always pass.
    pub async fn require_permission(
        &self,
        actor: &UserContext,
        permission_code: &str,
    ) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        let result = self
            .permissions
            .check_permission(actor.user_id(), permission_code, actor.tenant_id())
            .await?;
        if result.granted {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{}' is denied '{permission_code}': {}",
            actor.user_id(),
            result.reason
        )))
    }

    /// Requires at least one of the permissions.
    pub async fn require_any_permission(
        &self,
        actor: &UserContext,
        permission_codes: &[&str],
    ) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        if self
            .permissions
            .has_any_permission(actor.user_id(), permission_codes, actor.tenant_id())
            .await?
        {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{}' holds none of [{}]",
            actor.user_id(),
            permission_codes.join(", ")
        )))
    }

    /// Requires a role held through the role service, not token claims.
    pub async fn require_role(&self, actor: &UserContext, role_code: &str) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        if self
            .roles
            .has_role(actor.user_id(), role_code, actor.tenant_id())
            .await?
        {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{}' does not hold role '{role_code}'",
            actor.user_id()
        )))
    }

    /// Requires a resource access level.
    pub async fn require_resource_access(
        &self,
        actor: &UserContext,
        resource_type: &str,
        resource_id: &str,
        required: AccessLevel,
    ) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        let result = self
            .access_control
            .check_resource_access(
                actor.user_id(),
                resource_type,
                resource_id,
                required,
                actor.tenant_id(),
            )
            .await?;
        if result.granted {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{}' is denied '{required}' on {resource_type}/{resource_id}: {}",
            actor.user_id(),
            result.reason
        )))
    }

    /// Requires the actor to operate inside the tenant.
    ///
    /// Platform-scope identities and superadmins may enter any tenant;
    /// a tenant-bound identity only its own.
    pub fn require_tenant_access(&self, actor: &UserContext, tenant_id: TenantId) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        match actor.tenant_id() {
            None => Ok(()),
            Some(bound) if bound == tenant_id => Ok(()),
            Some(bound) => Err(AppError::Forbidden(format!(
                "user '{}' is bound to tenant '{bound}' and may not access tenant '{tenant_id}'",
                actor.user_id()
            ))),
        }
    }

    /// Requires the platform superadmin flag.
    pub fn require_superadmin(&self, actor: &UserContext) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{}' is not a superadmin",
            actor.user_id()
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use warden_core::{
        AppError, AppResult, ScopeContext, TenantId, UserContext, UserId,
    };
    use warden_domain::{
        AccessControlEntry, AccessLevel, Permission, PermissionCode, Role, ScopeLevel,
    };

    use crate::access_control_service::{AccessControlRepository, AccessControlService};
    use crate::permission_service::{
        EffectivePermission, PermissionRepository, PermissionService,
    };
    use crate::role_service::{RoleRepository, RoleService};
    use crate::test_support::{FakeAuditRepository, FakeAuthCache};

    use super::AuthGuard;

    struct StaticAuthStore {
        permissions: Vec<&'static str>,
        roles: Vec<&'static str>,
        broken: bool,
    }

    #[async_trait]
    impl PermissionRepository for StaticAuthStore {
        async fn list_effective_permissions(
            &self,
            _scope: ScopeContext,
            _user_id: &UserId,
        ) -> AppResult<Vec<EffectivePermission>> {
            if self.broken {
                return Err(AppError::Unavailable("store is down".to_owned()));
            }
            self.permissions
                .iter()
                .map(|code| {
                    Ok(EffectivePermission {
                        permission: Permission {
                            id: uuid::Uuid::new_v4(),
                            code: PermissionCode::parse(code)?,
                            scope_level: ScopeLevel::Tenant,
                            is_dangerous: false,
                            requires_mfa: false,
                            requires_approval: false,
                        },
                        via_role: None,
                    })
                })
                .collect()
        }

        async fn find_permission_by_code(
            &self,
            _scope: ScopeContext,
            _code: &PermissionCode,
        ) -> AppResult<Option<Permission>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl RoleRepository for StaticAuthStore {
        async fn list_roles_for_user(
            &self,
            _scope: ScopeContext,
            _user_id: &UserId,
        ) -> AppResult<Vec<Role>> {
            Ok(self
                .roles
                .iter()
                .map(|code| Role {
                    id: uuid::Uuid::new_v4(),
                    code: (*code).to_owned(),
                    role_level: 1,
                    scope_level: ScopeLevel::Tenant,
                    priority: 10,
                    permissions: Vec::new(),
                })
                .collect())
        }

        async fn find_role_by_code(
            &self,
            _scope: ScopeContext,
            _role_code: &str,
        ) -> AppResult<Option<Role>> {
            Ok(None)
        }

        async fn insert_assignment(
            &self,
            _scope: ScopeContext,
            _user_id: &UserId,
            _role_id: uuid::Uuid,
            _granted_by: &UserId,
            _expires_at: Option<chrono::DateTime<chrono::Utc>>,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn deactivate_assignment(
            &self,
            _scope: ScopeContext,
            _user_id: &UserId,
            _role_id: uuid::Uuid,
        ) -> AppResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl AccessControlRepository for StaticAuthStore {
        async fn find_entry(
            &self,
            _scope: ScopeContext,
            user_id: &UserId,
            resource_type: &str,
            resource_id: &str,
        ) -> AppResult<Option<AccessControlEntry>> {
            if user_id.as_str() == "owner" {
                return Ok(Some(AccessControlEntry {
                    user_id: user_id.clone(),
                    resource_type: resource_type.to_owned(),
                    resource_id: resource_id.to_owned(),
                    access_level: AccessLevel::Owner,
                    tenant_id: None,
                }));
            }
            Ok(None)
        }

        async fn upsert_entry(
            &self,
            _entry: &AccessControlEntry,
            _granted_by: &UserId,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn deactivate_entry(
            &self,
            _scope: ScopeContext,
            _user_id: &UserId,
            _resource_type: &str,
            _resource_id: &str,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn transfer_ownership(
            &self,
            _scope: ScopeContext,
            _resource_type: &str,
            _resource_id: &str,
            _from_user: &UserId,
            _to_user: &UserId,
            _transferred_by: &UserId,
        ) -> AppResult<()> {
            Ok(())
        }
    }

    fn guard(store: StaticAuthStore) -> AuthGuard {
        let store = Arc::new(store);
        let cache = Arc::new(FakeAuthCache::default());
        let audit_repository = Arc::new(FakeAuditRepository::default());
        let permissions = PermissionService::new(store.clone(), cache.clone(), 300);
        let roles = RoleService::new(
            store.clone(),
            permissions.clone(),
            audit_repository.clone(),
            cache.clone(),
            300,
        );
        let access_control = AccessControlService::new(store, audit_repository, cache, 300);
        AuthGuard::new(permissions, roles, access_control)
    }

    fn actor(subject: &str, tenant_id: Option<TenantId>, is_superadmin: bool) -> UserContext {
        UserContext::new(
            UserId::new(subject),
            None,
            None,
            tenant_id,
            is_superadmin,
            Vec::new(),
            None,
        )
    }

    #[tokio::test]
    async fn require_permission_distinguishes_denial_from_outage() {
        let denied_guard = guard(StaticAuthStore {
            permissions: vec![],
            roles: vec![],
            broken: false,
        });
        let broken_guard = guard(StaticAuthStore {
            permissions: vec![],
            roles: vec![],
            broken: true,
        });
        let user = actor("u-1", None, false);

        let denied = denied_guard.require_permission(&user, "users:read").await;
        let broken = broken_guard.require_permission(&user, "users:read").await;

        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        assert!(matches!(broken, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn require_permission_passes_holders_and_superadmins() {
        let guard = guard(StaticAuthStore {
            permissions: vec!["users:read"],
            roles: vec![],
            broken: false,
        });

        let holder = guard
            .require_permission(&actor("u-1", None, false), "users:read")
            .await;
        let root = guard
            .require_permission(&actor("root", None, true), "anything:else")
            .await;

        assert!(holder.is_ok());
        assert!(root.is_ok());
    }

    #[tokio::test]
    async fn require_any_permission_needs_one_grant() {
        let guard = guard(StaticAuthStore {
            permissions: vec!["orders:read"],
            roles: vec![],
            broken: false,
        });
        let user = actor("u-1", None, false);

        let passed = guard
            .require_any_permission(&user, &["users:read", "orders:read"])
            .await;
        let failed = guard
            .require_any_permission(&user, &["users:read", "users:write"])
            .await;

        assert!(passed.is_ok());
        assert!(matches!(failed, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn require_role_follows_the_role_service() {
        let guard = guard(StaticAuthStore {
            permissions: vec![],
            roles: vec!["auditor"],
            broken: false,
        });
        let user = actor("u-1", None, false);

        let held = guard.require_role(&user, "auditor").await;
        let missing = guard.require_role(&user, "admin").await;

        assert!(held.is_ok());
        assert!(matches!(missing, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn require_resource_access_follows_the_entry() {
        let guard = guard(StaticAuthStore {
            permissions: vec![],
            roles: vec![],
            broken: false,
        });

        let owner = guard
            .require_resource_access(
                &actor("owner", None, false),
                "document",
                "doc-42",
                AccessLevel::Write,
            )
            .await;
        let stranger = guard
            .require_resource_access(
                &actor("stranger", None, false),
                "document",
                "doc-42",
                AccessLevel::Read,
            )
            .await;

        assert!(owner.is_ok());
        assert!(matches!(stranger, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn require_tenant_access_enforces_the_binding() {
        let guard = guard(StaticAuthStore {
            permissions: vec![],
            roles: vec![],
            broken: false,
        });
        let home = TenantId::new();
        let other = TenantId::new();

        assert!(guard
            .require_tenant_access(&actor("u-1", Some(home), false), home)
            .is_ok());
        assert!(matches!(
            guard.require_tenant_access(&actor("u-1", Some(home), false), other),
            Err(AppError::Forbidden(_))
        ));
        assert!(guard
            .require_tenant_access(&actor("platform-svc", None, false), other)
            .is_ok());
        assert!(guard
            .require_tenant_access(&actor("root", Some(home), true), other)
            .is_ok());
    }

    #[tokio::test]
    async fn require_superadmin_rejects_everyone_else() {
        let guard = guard(StaticAuthStore {
            permissions: vec![],
            roles: vec![],
            broken: false,
        });

        assert!(guard.require_superadmin(&actor("root", None, true)).is_ok());
        assert!(matches!(
            guard.require_superadmin(&actor("u-1", None, false)),
            Err(AppError::Forbidden(_))
        ));
    }
}
