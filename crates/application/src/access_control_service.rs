use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use warden_core::{AppError, AppResult, ScopeContext, TenantId, UserContext, UserId};
use warden_domain::{AccessControlEntry, AccessLevel, DecisionSource, PermissionResult};

use crate::audit::{AuditAction, AuditEvent, AuditRepository};
use crate::auth_cache::{self, AuthCache, CachedDecision};

#[cfg(test)]
mod tests;

/// Repository port for resource-level access entries.
#[async_trait]
pub trait AccessControlRepository: Send + Sync {
    /// Finds the active entry for one (user, resource) pair.
    async fn find_entry(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<Option<AccessControlEntry>>;

    /// Stores an entry in one transaction, replacing any prior one.
    async fn upsert_entry(&self, entry: &AccessControlEntry, granted_by: &UserId) -> AppResult<()>;

    /// Deactivates the entry; `NotFound` when none is active.
    async fn deactivate_entry(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<()>;

    /// Moves ownership between users in one transaction.
    ///
    /// Fails without side effects when `from_user` does not hold
    /// ownership; there is never an intermediate state where both or
    /// neither user owns the resource.
    async fn transfer_ownership(
        &self,
        scope: ScopeContext,
        resource_type: &str,
        resource_id: &str,
        from_user: &UserId,
        to_user: &UserId,
        transferred_by: &UserId,
    ) -> AppResult<()>;
}

/// Application service for resource-level grants with ownership semantics.
///
/// Decisions are independent of role membership: an entry's level is
/// compared against the requested level by total order.
#[derive(Clone)]
pub struct AccessControlService {
    repository: Arc<dyn AccessControlRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    cache: Arc<dyn AuthCache>,
    cache_ttl_seconds: u32,
}

impl AccessControlService {
    /// Creates a new access control service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AccessControlRepository>,
        audit_repository: Arc<dyn AuditRepository>,
        cache: Arc<dyn AuthCache>,
        cache_ttl_seconds: u32,
    ) -> Self {
        Self {
            repository,
            audit_repository,
            cache,
            cache_ttl_seconds,
        }
    }

    /// Decides whether a user holds at least `required` on a resource.
    pub async fn check_resource_access(
        &self,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
        required: AccessLevel,
        tenant_id: Option<TenantId>,
    ) -> AppResult<PermissionResult> {
        let scope = ScopeContext::from_tenant(tenant_id);
        let key =
            auth_cache::resource_access_key(scope, user_id, resource_type, resource_id, required);

        if let Some(encoded) = auth_cache::get_or_miss(self.cache.as_ref(), &key).await {
            match serde_json::from_str::<CachedDecision>(&encoded) {
                Ok(decision) if decision.granted => {
                    return Ok(PermissionResult::granted(
                        decision.reason,
                        DecisionSource::Cache,
                    ));
                }
                Ok(decision) => {
                    return Ok(PermissionResult::denied(
                        decision.reason,
                        DecisionSource::Cache,
                    ));
                }
                Err(error) => {
                    tracing::warn!(%key, %error, "discarding undecodable access cache entry");
                }
            }
        }

        let entry = self
            .repository
            .find_entry(scope, user_id, resource_type, resource_id)
            .await?;
        let result = match entry {
            Some(entry) if entry.satisfies(required) => PermissionResult::granted(
                format!(
                    "access level '{}' satisfies required '{required}'",
                    entry.access_level
                ),
                DecisionSource::Store,
            ),
            Some(entry) => PermissionResult::denied(
                format!(
                    "access level '{}' is below required '{required}'",
                    entry.access_level
                ),
                DecisionSource::Store,
            ),
            None => PermissionResult::denied(
                format!("no access entry for {resource_type}/{resource_id}"),
                DecisionSource::Store,
            ),
        };

        let decision = CachedDecision {
            granted: result.granted,
            reason: result.reason.clone(),
        };
        match serde_json::to_string(&decision) {
            Ok(encoded) => {
                auth_cache::set_best_effort(
                    self.cache.as_ref(),
                    &key,
                    &encoded,
                    self.cache_ttl_seconds,
                )
                .await;
            }
            Err(error) => {
                tracing::warn!(%key, %error, "failed to encode access cache entry");
            }
        }

        Ok(result)
    }

    /// Decides whether a user owns a resource.
    pub async fn check_ownership(
        &self,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
        tenant_id: Option<TenantId>,
    ) -> AppResult<PermissionResult> {
        self.check_resource_access(
            user_id,
            resource_type,
            resource_id,
            AccessLevel::Owner,
            tenant_id,
        )
        .await
    }

    /// Grants an access level on a resource.
    ///
    /// Gated: only a superadmin or an actor holding admin-level access
    /// on the same resource may grant.
    pub async fn grant_resource_access(
        &self,
        actor: &UserContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
        access_level: AccessLevel,
        tenant_id: Option<TenantId>,
    ) -> AppResult<()> {
        let scope = ScopeContext::from_tenant(tenant_id);
        self.require_admin_access(actor, resource_type, resource_id, scope)
            .await?;

        let entry = AccessControlEntry {
            user_id: user_id.clone(),
            resource_type: resource_type.to_owned(),
            resource_id: resource_id.to_owned(),
            access_level,
            tenant_id,
        };
        self.repository.upsert_entry(&entry, actor.user_id()).await?;
        info!(%scope, user = %user_id, resource_type, resource_id, level = %access_level, "resource access granted");

        self.invalidate_resource_cache(scope, user_id, resource_type, resource_id)
            .await;
        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.user_id().to_string(),
                action: AuditAction::AccessGranted,
                resource_type: resource_type.to_owned(),
                resource_id: resource_id.to_owned(),
                detail: Some(format!("granted '{access_level}' to '{user_id}'")),
            })
            .await
    }

    /// Revokes a user's access entry on a resource.
    ///
    /// Gated like `grant_resource_access`.
    pub async fn revoke_resource_access(
        &self,
        actor: &UserContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
        tenant_id: Option<TenantId>,
    ) -> AppResult<()> {
        let scope = ScopeContext::from_tenant(tenant_id);
        self.require_admin_access(actor, resource_type, resource_id, scope)
            .await?;

        self.repository
            .deactivate_entry(scope, user_id, resource_type, resource_id)
            .await?;
        info!(%scope, user = %user_id, resource_type, resource_id, "resource access revoked");

        self.invalidate_resource_cache(scope, user_id, resource_type, resource_id)
            .await;
        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.user_id().to_string(),
                action: AuditAction::AccessRevoked,
                resource_type: resource_type.to_owned(),
                resource_id: resource_id.to_owned(),
                detail: Some(format!("revoked access from '{user_id}'")),
            })
            .await
    }

    /// Transfers ownership between users atomically.
    ///
    /// Gated like `grant_resource_access`; both users' cached answers
    /// are dropped afterwards.
    pub async fn transfer_ownership(
        &self,
        actor: &UserContext,
        resource_type: &str,
        resource_id: &str,
        from_user: &UserId,
        to_user: &UserId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<()> {
        let scope = ScopeContext::from_tenant(tenant_id);
        self.require_admin_access(actor, resource_type, resource_id, scope)
            .await?;

        self.repository
            .transfer_ownership(
                scope,
                resource_type,
                resource_id,
                from_user,
                to_user,
                actor.user_id(),
            )
            .await?;
        info!(%scope, from = %from_user, to = %to_user, resource_type, resource_id, "ownership transferred");

        self.invalidate_resource_cache(scope, from_user, resource_type, resource_id)
            .await;
        self.invalidate_resource_cache(scope, to_user, resource_type, resource_id)
            .await;
        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.user_id().to_string(),
                action: AuditAction::OwnershipTransferred,
                resource_type: resource_type.to_owned(),
                resource_id: resource_id.to_owned(),
                detail: Some(format!("transferred ownership from '{from_user}' to '{to_user}'")),
            })
            .await
    }

    /// Gates administrative operations.
    ///
    /// Always resolved fresh from the store; these calls are infrequent
    /// and a stale answer here would let a revoked administrator keep
    /// administering.
    async fn require_admin_access(
        &self,
        actor: &UserContext,
        resource_type: &str,
        resource_id: &str,
        scope: ScopeContext,
    ) -> AppResult<()> {
        if actor.is_superadmin() {
            return Ok(());
        }

        let entry = self
            .repository
            .find_entry(scope, actor.user_id(), resource_type, resource_id)
            .await?;
        if entry.is_some_and(|entry| entry.satisfies(AccessLevel::Admin)) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "actor '{}' lacks admin access on {resource_type}/{resource_id}",
            actor.user_id()
        )))
    }

    /// Drops every access-level key for one (user, resource) pair.
    async fn invalidate_resource_cache(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) {
        for key in
            auth_cache::resource_access_keys(scope, user_id, resource_type, resource_id)
        {
            auth_cache::delete_best_effort(self.cache.as_ref(), &key).await;
        }
    }
}
