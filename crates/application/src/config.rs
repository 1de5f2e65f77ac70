use std::env;

use warden_core::{AppError, AppResult};

use crate::rate_limit_service::RateLimitRule;
use crate::token_validation_service::TokenValidationConfig;

/// Typed configuration for the authorization core.
///
/// Every option is enumerated with an explicit default; nothing is
/// resolved through reflection or hidden fallbacks.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider realm URL tokens must be issued by.
    pub issuer_url: String,
    /// Audience tokens must be minted for.
    pub audience: String,
    /// TTL for cached issuer public keys.
    pub issuer_keys_ttl_seconds: u32,
    /// TTL for cached permission decisions and permission lists.
    pub permission_cache_ttl_seconds: u32,
    /// TTL for cached role lists.
    pub role_cache_ttl_seconds: u32,
    /// TTL for cached resource-access decisions.
    pub access_cache_ttl_seconds: u32,
    /// Session behavior of the token validation service.
    pub token_validation: TokenValidationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer_url: "http://localhost:8080/realms/platform".to_owned(),
            audience: "warden".to_owned(),
            issuer_keys_ttl_seconds: 3600,
            permission_cache_ttl_seconds: 300,
            role_cache_ttl_seconds: 300,
            access_cache_ttl_seconds: 300,
            token_validation: TokenValidationConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Loads configuration from the process environment.
    ///
    /// `WARDEN_ISSUER_URL` and `WARDEN_AUDIENCE` are required; every other
    /// option falls back to its default when unset.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        let token_defaults = defaults.token_validation;

        Ok(Self {
            issuer_url: required_env("WARDEN_ISSUER_URL")?,
            audience: required_env("WARDEN_AUDIENCE")?,
            issuer_keys_ttl_seconds: env_u32(
                "WARDEN_ISSUER_KEYS_TTL_SECONDS",
                defaults.issuer_keys_ttl_seconds,
            )?,
            permission_cache_ttl_seconds: env_u32(
                "WARDEN_PERMISSION_CACHE_TTL_SECONDS",
                defaults.permission_cache_ttl_seconds,
            )?,
            role_cache_ttl_seconds: env_u32(
                "WARDEN_ROLE_CACHE_TTL_SECONDS",
                defaults.role_cache_ttl_seconds,
            )?,
            access_cache_ttl_seconds: env_u32(
                "WARDEN_ACCESS_CACHE_TTL_SECONDS",
                defaults.access_cache_ttl_seconds,
            )?,
            token_validation: TokenValidationConfig {
                session_cache_ttl_seconds: env_u32(
                    "WARDEN_SESSION_CACHE_TTL_SECONDS",
                    token_defaults.session_cache_ttl_seconds,
                )?,
                session_lifetime_hours: env_i64(
                    "WARDEN_SESSION_LIFETIME_HOURS",
                    token_defaults.session_lifetime_hours,
                )?,
                superadmin_role: env::var("WARDEN_SUPERADMIN_ROLE")
                    .unwrap_or(token_defaults.superadmin_role),
                session_rate_limit: RateLimitRule {
                    max_attempts: env_i32(
                        "WARDEN_SESSION_RATE_LIMIT_MAX_ATTEMPTS",
                        token_defaults.session_rate_limit.max_attempts,
                    )?,
                    window_seconds: env_i64(
                        "WARDEN_SESSION_RATE_LIMIT_WINDOW_SECONDS",
                        token_defaults.session_rate_limit.window_seconds,
                    )?,
                    ..token_defaults.session_rate_limit
                },
            },
        })
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn env_u32(name: &str, default: u32) -> AppResult<u32> {
    parse_env(name, default)
}

fn env_i32(name: &str, default: i32) -> AppResult<i32> {
    parse_env(name, default)
}

fn env_i64(name: &str, default: i64) -> AppResult<i64> {
    parse_env(name, default)
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}
