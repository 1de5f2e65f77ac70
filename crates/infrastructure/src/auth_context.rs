//! Process-start wiring for the authorization core.

use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use warden_application::{
    AccessControlService, AuthConfig, AuthGuard, PermissionService, RateLimitService,
    RoleService, TokenValidationService,
};
use warden_core::AppResult;

use crate::jwks_token_verifier::JwksTokenVerifier;
use crate::postgres_access_control_repository::PostgresAccessControlRepository;
use crate::postgres_audit_repository::PostgresAuditRepository;
use crate::postgres_permission_repository::PostgresPermissionRepository;
use crate::postgres_role_repository::PostgresRoleRepository;
use crate::postgres_session_repository::PostgresSessionRepository;
use crate::redis_auth_cache::RedisAuthCache;
use crate::redis_rate_limit_repository::RedisRateLimitRepository;

/// Fully wired authorization services.
///
/// Constructed once at process start and passed down to callers; there
/// is no global lookup and nothing is patched after construction.
#[derive(Clone)]
pub struct AuthContext {
    /// Permission checks and permission cache administration.
    pub permissions: PermissionService,
    /// Role membership and role administration.
    pub roles: RoleService,
    /// Resource-level grants and ownership.
    pub access_control: AccessControlService,
    /// Token verification and session lifecycle.
    pub token_validation: TokenValidationService,
    /// Windowed rate limiting.
    pub rate_limits: RateLimitService,
    /// Guard primitives exposed to request handlers.
    pub guard: AuthGuard,
}

impl AuthContext {
    /// Wires every service from shared process-wide resources.
    pub fn new(
        pool: PgPool,
        redis_client: redis::Client,
        http_client: reqwest::Client,
        config: &AuthConfig,
    ) -> AppResult<Self> {
        let cache = Arc::new(RedisAuthCache::new(redis_client.clone(), "warden"));
        let audit_repository = Arc::new(PostgresAuditRepository::new(pool.clone()));

        let permissions = PermissionService::new(
            Arc::new(PostgresPermissionRepository::new(pool.clone())),
            cache.clone(),
            config.permission_cache_ttl_seconds,
        );
        let roles = RoleService::new(
            Arc::new(PostgresRoleRepository::new(pool.clone())),
            permissions.clone(),
            audit_repository.clone(),
            cache.clone(),
            config.role_cache_ttl_seconds,
        );
        let access_control = AccessControlService::new(
            Arc::new(PostgresAccessControlRepository::new(pool.clone())),
            audit_repository.clone(),
            cache.clone(),
            config.access_cache_ttl_seconds,
        );

        let rate_limits = RateLimitService::new(Arc::new(RedisRateLimitRepository::new(
            redis_client,
            "warden:rate_limit",
        )));
        let verifier = JwksTokenVerifier::new(
            http_client,
            cache.clone(),
            config.issuer_url.as_str(),
            config.audience.clone(),
            config.issuer_keys_ttl_seconds,
        )?;
        let token_validation = TokenValidationService::new(
            Arc::new(verifier),
            Arc::new(PostgresSessionRepository::new(pool)),
            rate_limits.clone(),
            audit_repository,
            cache,
            config.token_validation.clone(),
        );

        let guard = AuthGuard::new(
            permissions.clone(),
            roles.clone(),
            access_control.clone(),
        );

        Ok(Self {
            permissions,
            roles,
            access_control,
            token_validation,
            rate_limits,
            guard,
        })
    }
}

/// Installs the process-wide tracing subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
