//! Application services and ports for the authorization core.

#![forbid(unsafe_code)]

mod access_control_service;
mod audit;
mod auth_cache;
mod config;
mod guards;
mod permission_service;
mod rate_limit_service;
mod role_service;
#[cfg(test)]
mod test_support;
mod token_validation_service;

pub use access_control_service::{AccessControlRepository, AccessControlService};
pub use audit::{AuditAction, AuditEvent, AuditRepository};
pub use auth_cache::{
    AuthCache, issuer_keys_key, permission_check_key, permission_check_pattern,
    resource_access_key, resource_access_keys, session_validity_key, session_validity_pattern,
    user_permissions_key, user_roles_key,
};
pub use config::AuthConfig;
pub use guards::AuthGuard;
pub use permission_service::{EffectivePermission, PermissionRepository, PermissionService};
pub use rate_limit_service::{
    AttemptInfo, RateLimitRepository, RateLimitRule, RateLimitService,
};
pub use role_service::{RoleRepository, RoleService};
pub use token_validation_service::{
    SessionRepository, TokenClaims, TokenValidationConfig, TokenValidationService, TokenVerifier,
};
