//! Infrastructure adapters for the authorization core.

#![forbid(unsafe_code)]

mod auth_context;
mod jwks_token_verifier;
mod postgres_access_control_repository;
mod postgres_audit_repository;
mod postgres_permission_repository;
mod postgres_role_repository;
mod postgres_session_repository;
mod redis_auth_cache;
mod redis_rate_limit_repository;

pub use auth_context::{AuthContext, init_tracing};
pub use jwks_token_verifier::JwksTokenVerifier;
pub use postgres_access_control_repository::PostgresAccessControlRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_permission_repository::PostgresPermissionRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use postgres_session_repository::PostgresSessionRepository;
pub use redis_auth_cache::RedisAuthCache;
pub use redis_rate_limit_repository::RedisRateLimitRepository;
