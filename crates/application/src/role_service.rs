use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;
use warden_core::{AppError, AppResult, ScopeContext, TenantId, UserContext, UserId};
use warden_domain::Role;

use crate::audit::{AuditAction, AuditEvent, AuditRepository};
use crate::auth_cache::{self, AuthCache};
use crate::permission_service::PermissionService;

/// Repository port for role definitions and assignments.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists roles a user holds through valid assignments in a scope.
    ///
    /// Platform-scope assignments are included in every tenant scope.
    async fn list_roles_for_user(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
    ) -> AppResult<Vec<Role>>;

    /// Finds a role definition by code in a scope.
    async fn find_role_by_code(&self, scope: ScopeContext, role_code: &str)
    -> AppResult<Option<Role>>;

    /// Records an assignment in one transaction, replacing any prior one.
    async fn insert_assignment(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        role_id: Uuid,
        granted_by: &UserId,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    /// Deactivates an assignment; `NotFound` when none is active.
    async fn deactivate_assignment(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        role_id: Uuid,
    ) -> AppResult<()>;
}

/// Application service for role membership and role administration.
#[derive(Clone)]
pub struct RoleService {
    repository: Arc<dyn RoleRepository>,
    permission_service: PermissionService,
    audit_repository: Arc<dyn AuditRepository>,
    cache: Arc<dyn AuthCache>,
    cache_ttl_seconds: u32,
}

impl RoleService {
    /// Creates a new role service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRepository>,
        permission_service: PermissionService,
        audit_repository: Arc<dyn AuditRepository>,
        cache: Arc<dyn AuthCache>,
        cache_ttl_seconds: u32,
    ) -> Self {
        Self {
            repository,
            permission_service,
            audit_repository,
            cache,
            cache_ttl_seconds,
        }
    }

    /// Lists the roles a user currently holds in a scope.
    pub async fn get_user_roles(
        &self,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<Vec<Role>> {
        let scope = ScopeContext::from_tenant(tenant_id);
        let key = auth_cache::user_roles_key(scope, user_id);

        if let Some(encoded) = auth_cache::get_or_miss(self.cache.as_ref(), &key).await {
            match serde_json::from_str::<Vec<Role>>(&encoded) {
                Ok(roles) => return Ok(roles),
                Err(error) => {
                    tracing::warn!(%key, %error, "discarding undecodable role list cache entry");
                }
            }
        }

        let roles = self.repository.list_roles_for_user(scope, user_id).await?;

        let encoded = serde_json::to_string(&roles)
            .map_err(|error| AppError::Internal(format!("failed to encode role list: {error}")))?;
        auth_cache::set_best_effort(self.cache.as_ref(), &key, &encoded, self.cache_ttl_seconds)
            .await;

        Ok(roles)
    }

    /// Returns whether the user holds a role, derived from the role list.
    pub async fn has_role(
        &self,
        user_id: &UserId,
        role_code: &str,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let roles = self.get_user_roles(user_id, tenant_id).await?;
        Ok(roles.iter().any(|role| role.code == role_code))
    }

    /// Returns the union of permission codes across the user's roles.
    pub async fn get_effective_permissions(
        &self,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<BTreeSet<String>> {
        let roles = self.get_user_roles(user_id, tenant_id).await?;
        Ok(roles
            .iter()
            .flat_map(|role| role.permissions.iter())
            .map(|permission| permission.code.to_string())
            .collect())
    }

    /// Returns whether the actor may grant the role.
    ///
    /// A superadmin always may; anyone else needs a held role priority
    /// at or above the target role's priority. Unknown roles are
    /// `NotFound`.
    pub async fn can_assign_role(
        &self,
        assigner: &UserContext,
        role_code: &str,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let target = self.resolve_role(tenant_id, role_code).await?;
        if assigner.is_superadmin() {
            return Ok(true);
        }

        let held = self.get_user_roles(assigner.user_id(), tenant_id).await?;
        let max_priority = held.iter().map(|role| role.priority).max();
        Ok(max_priority.is_some_and(|priority| priority >= target.priority))
    }

    /// Assigns a role to a user and drops the user's cached answers.
    pub async fn assign_role(
        &self,
        actor: &UserContext,
        user_id: &UserId,
        role_code: &str,
        tenant_id: Option<TenantId>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let role = self.resolve_role(tenant_id, role_code).await?;
        if !self.can_assign_role(actor, role_code, tenant_id).await? {
            return Err(AppError::Forbidden(format!(
                "actor '{}' may not grant role '{role_code}'",
                actor.user_id()
            )));
        }

        let scope = ScopeContext::from_tenant(tenant_id);
        self.repository
            .insert_assignment(scope, user_id, role.id, actor.user_id(), expires_at)
            .await?;
        info!(%scope, user = %user_id, role = role_code, "role assigned");

        self.invalidate_user_role_cache(user_id, tenant_id).await;
        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.user_id().to_string(),
                action: AuditAction::RoleAssigned,
                resource_type: "role_assignment".to_owned(),
                resource_id: format!("{user_id}:{role_code}"),
                detail: Some(format!("assigned role '{role_code}' to '{user_id}'")),
            })
            .await
    }

    /// Revokes a role from a user and drops the user's cached answers.
    pub async fn revoke_role(
        &self,
        actor: &UserContext,
        user_id: &UserId,
        role_code: &str,
        tenant_id: Option<TenantId>,
    ) -> AppResult<()> {
        let role = self.resolve_role(tenant_id, role_code).await?;
        if !self.can_assign_role(actor, role_code, tenant_id).await? {
            return Err(AppError::Forbidden(format!(
                "actor '{}' may not revoke role '{role_code}'",
                actor.user_id()
            )));
        }

        let scope = ScopeContext::from_tenant(tenant_id);
        self.repository
            .deactivate_assignment(scope, user_id, role.id)
            .await?;
        info!(%scope, user = %user_id, role = role_code, "role revoked");

        self.invalidate_user_role_cache(user_id, tenant_id).await;
        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.user_id().to_string(),
                action: AuditAction::RoleRevoked,
                resource_type: "role_assignment".to_owned(),
                resource_id: format!("{user_id}:{role_code}"),
                detail: Some(format!("revoked role '{role_code}' from '{user_id}'")),
            })
            .await
    }

    async fn resolve_role(&self, tenant_id: Option<TenantId>, role_code: &str) -> AppResult<Role> {
        let scope = ScopeContext::from_tenant(tenant_id);
        self.repository
            .find_role_by_code(scope, role_code)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("role '{role_code}' was not found in scope '{scope}'"))
            })
    }

    /// Drops exactly the mutated user's role cache entry, then the
    /// user's permission caches. No cross-user scan is ever needed for
    /// an assignment change.
    async fn invalidate_user_role_cache(&self, user_id: &UserId, tenant_id: Option<TenantId>) {
        let scope = ScopeContext::from_tenant(tenant_id);
        auth_cache::delete_best_effort(
            self.cache.as_ref(),
            &auth_cache::user_roles_key(scope, user_id),
        )
        .await;
        self.permission_service
            .invalidate_user_permission_cache(user_id, tenant_id)
            .await;
    }
}
