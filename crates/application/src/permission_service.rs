use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{AppError, AppResult, ScopeContext, TenantId, UserId};
use warden_domain::{
    DecisionSource, Permission, PermissionCheck, PermissionCode, PermissionResult,
};

use crate::auth_cache::{self, AuthCache, CachedDecision};

mod batch;


/// One permission a user effectively holds, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermission {
    /// The held permission.
    pub permission: Permission,
    /// Role code the permission came through; `None` for a direct grant.
    pub via_role: Option<String>,
}

/// Repository port for permission lookups.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Lists permissions a user holds in a scope.
    ///
    /// The result is the union of permissions reachable through valid
    /// role assignments and direct grants. Platform-scope assignments
    /// are included in every tenant scope.
    async fn list_effective_permissions(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
    ) -> AppResult<Vec<EffectivePermission>>;

    /// Finds a permission definition by code in a scope.
    async fn find_permission_by_code(
        &self,
        scope: ScopeContext,
        code: &PermissionCode,
    ) -> AppResult<Option<Permission>>;
}

/// Application service answering permission questions.
///
/// Consults the cache first and the store on miss; a cache outage
/// degrades latency, not correctness. Store errors propagate so callers
/// fail closed.
#[derive(Clone)]
pub struct PermissionService {
    repository: Arc<dyn PermissionRepository>,
    cache: Arc<dyn AuthCache>,
    cache_ttl_seconds: u32,
}

impl PermissionService {
    /// Creates a new permission service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn PermissionRepository>,
        cache: Arc<dyn AuthCache>,
        cache_ttl_seconds: u32,
    ) -> Self {
        Self {
            repository,
            cache,
            cache_ttl_seconds,
        }
    }

    /// Decides whether a user holds a permission code.
    ///
    /// A malformed code is a validation error, raised before any cache
    /// or store traffic and never cached as a negative result.
    pub async fn check_permission(
        &self,
        user_id: &UserId,
        permission_code: &str,
        tenant_id: Option<TenantId>,
    ) -> AppResult<PermissionResult> {
        let code = PermissionCode::parse(permission_code)?;
        self.check(&PermissionCheck {
            user_id: user_id.clone(),
            code,
            tenant_id,
        })
        .await
    }

    /// Decides one already-validated permission check.
    pub async fn check(&self, check: &PermissionCheck) -> AppResult<PermissionResult> {
        let key = auth_cache::permission_check_key(check.scope(), &check.user_id, &check.code);
        if let Some(result) = self.cached_decision(&key).await {
            return Ok(result);
        }

        self.resolve_and_cache(check).await
    }

    /// Lists a user's effective permissions in a scope.
    ///
    /// With `use_cache`, the cached list is served when present; the
    /// fresh list is cached either way. Mutations invalidate the whole
    /// list, never parts of it.
    pub async fn get_user_permissions(
        &self,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
        use_cache: bool,
    ) -> AppResult<Vec<Permission>> {
        let scope = ScopeContext::from_tenant(tenant_id);
        let key = auth_cache::user_permissions_key(scope, user_id);

        if use_cache
            && let Some(encoded) = auth_cache::get_or_miss(self.cache.as_ref(), &key).await
        {
            match serde_json::from_str::<Vec<Permission>>(&encoded) {
                Ok(permissions) => return Ok(permissions),
                Err(error) => {
                    tracing::warn!(%key, %error, "discarding undecodable permission list cache entry");
                }
            }
        }

        let permissions: Vec<Permission> = self
            .repository
            .list_effective_permissions(scope, user_id)
            .await?
            .into_iter()
            .map(|effective| effective.permission)
            .collect();

        let encoded = serde_json::to_string(&permissions).map_err(|error| {
            AppError::Internal(format!("failed to encode permission list: {error}"))
        })?;
        auth_cache::set_best_effort(self.cache.as_ref(), &key, &encoded, self.cache_ttl_seconds)
            .await;

        Ok(permissions)
    }

    /// Drops every cached permission answer for one user in one scope.
    ///
    /// Invoked by the role and access-control services after any
    /// mutation. Best-effort: a failed delete leaves entries to lapse
    /// through their TTL.
    pub async fn invalidate_user_permission_cache(
        &self,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
    ) {
        let scope = ScopeContext::from_tenant(tenant_id);
        auth_cache::delete_best_effort(
            self.cache.as_ref(),
            &auth_cache::user_permissions_key(scope, user_id),
        )
        .await;
        auth_cache::delete_pattern_best_effort(
            self.cache.as_ref(),
            &auth_cache::permission_check_pattern(scope, user_id),
        )
        .await;
    }

    /// Pre-populates a user's permission list cache, e.g. after login.
    ///
    /// Returns the number of permissions warmed.
    pub async fn warm_user_cache(
        &self,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<usize> {
        let permissions = self.get_user_permissions(user_id, tenant_id, false).await?;
        Ok(permissions.len())
    }

    async fn cached_decision(&self, key: &str) -> Option<PermissionResult> {
        let encoded = auth_cache::get_or_miss(self.cache.as_ref(), key).await?;
        match serde_json::from_str::<CachedDecision>(&encoded) {
            Ok(decision) if decision.granted => Some(PermissionResult::granted(
                decision.reason,
                DecisionSource::Cache,
            )),
            Ok(decision) => Some(PermissionResult::denied(
                decision.reason,
                DecisionSource::Cache,
            )),
            Err(error) => {
                tracing::warn!(%key, %error, "discarding undecodable decision cache entry");
                None
            }
        }
    }

    async fn resolve_and_cache(&self, check: &PermissionCheck) -> AppResult<PermissionResult> {
        let result = self.resolve_from_store(check).await?;

        let key = auth_cache::permission_check_key(check.scope(), &check.user_id, &check.code);
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
                tracing::warn!(%key, %error, "failed to encode decision cache entry");
            }
        }

        Ok(result)
    }

    async fn resolve_from_store(&self, check: &PermissionCheck) -> AppResult<PermissionResult> {
        let scope = check.scope();
        let effective = self
            .repository
            .list_effective_permissions(scope, &check.user_id)
            .await
            .inspect_err(|error| {
                tracing::error!(%scope, user = %check.user_id, %error, "permission store lookup failed");
            })?;

        let mut matched_codes = Vec::new();
        let mut active_roles = Vec::new();
        let mut direct_match: Option<PermissionCode> = None;
        for held in &effective {
            if !held.permission.code.implies(&check.code) {
                continue;
            }

            matched_codes.push(held.permission.code.clone());
            match &held.via_role {
                Some(role_code) if !active_roles.contains(role_code) => {
                    active_roles.push(role_code.clone());
                }
                Some(_) => {}
                None => {
                    direct_match.get_or_insert_with(|| held.permission.code.clone());
                }
            }
        }

        if !matched_codes.is_empty() {
            let reason = match active_roles.first() {
                Some(role_code) => format!("granted via role '{role_code}'"),
                None => match &direct_match {
                    Some(code) => format!("granted by direct grant '{code}'"),
                    None => "granted".to_owned(),
                },
            };
            return Ok(PermissionResult::granted(reason, DecisionSource::Store)
                .with_evidence(matched_codes, active_roles));
        }

        let reason = match self
            .repository
            .find_permission_by_code(scope, &check.code)
            .await?
        {
            Some(_) => format!("no role or direct grant matches '{}'", check.code),
            None => format!(
                "permission '{}' is not defined in scope '{scope}'",
                check.code
            ),
        };

        Ok(PermissionResult::denied(reason, DecisionSource::Store))
    }
}
