//! Cache port and the shared cache-key schema.
//!
//! Every key is namespaced by the scope segment (`platform` or
//! `tenant:{id}`) so no lookup can silently cross a tenant boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_core::{AppResult, ScopeContext, UserId};
use warden_domain::{AccessLevel, PermissionCode};

/// Distributed key-value cache port with TTL and pattern enumeration.
#[async_trait]
pub trait AuthCache: Send + Sync {
    /// Returns the cached value for one key.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores a value under one key with a TTL.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u32) -> AppResult<()>;

    /// Deletes one key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Deletes every key matching a glob-style pattern, returning the count.
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64>;
}

/// Cached boolean decision with the reason it was made.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CachedDecision {
    pub granted: bool,
    pub reason: String,
}

/// Key for one cached permission check decision.
#[must_use]
pub fn permission_check_key(scope: ScopeContext, user_id: &UserId, code: &PermissionCode) -> String {
    format!("perm_check:{scope}:{user_id}:{code}")
}

/// Pattern matching every cached permission check for one user in one scope.
#[must_use]
pub fn permission_check_pattern(scope: ScopeContext, user_id: &UserId) -> String {
    format!("perm_check:{scope}:{user_id}:*")
}

/// Key for one user's cached effective permission list.
#[must_use]
pub fn user_permissions_key(scope: ScopeContext, user_id: &UserId) -> String {
    format!("user_perms:{scope}:{user_id}")
}

/// Key for one user's cached role list.
#[must_use]
pub fn user_roles_key(scope: ScopeContext, user_id: &UserId) -> String {
    format!("user_roles:{scope}:{user_id}")
}

/// Key for one cached resource-access decision at one level.
#[must_use]
pub fn resource_access_key(
    scope: ScopeContext,
    user_id: &UserId,
    resource_type: &str,
    resource_id: &str,
    level: AccessLevel,
) -> String {
    format!("access:{scope}:{user_id}:{resource_type}:{resource_id}:{level}")
}

/// Keys for every access level of one (user, resource) pair.
///
/// A grant at one level changes the answer at all lower levels, so
/// invalidation always expands to the full set.
#[must_use]
pub fn resource_access_keys(
    scope: ScopeContext,
    user_id: &UserId,
    resource_type: &str,
    resource_id: &str,
) -> Vec<String> {
    AccessLevel::all()
        .iter()
        .map(|level| resource_access_key(scope, user_id, resource_type, resource_id, *level))
        .collect()
}

/// Key for one cached session-validity decision.
#[must_use]
pub fn session_validity_key(session_id: &str, user_id: &UserId) -> String {
    format!("session_valid:{session_id}:{user_id}")
}

/// Pattern matching every cached session-validity decision for one user.
#[must_use]
pub fn session_validity_pattern(user_id: &UserId) -> String {
    format!("session_valid:*:{user_id}")
}

/// Key for an issuer realm's cached public key set.
#[must_use]
pub fn issuer_keys_key(realm: &str) -> String {
    format!("realm_keys:{realm}")
}

/// Reads a key, degrading a cache failure to a miss.
///
/// A cache outage costs latency, never correctness: the caller falls
/// through to the store.
pub(crate) async fn get_or_miss(cache: &dyn AuthCache, key: &str) -> Option<String> {
    match cache.get(key).await {
        Ok(value) => value,
        Err(error) => {
            warn!(key, %error, "cache read failed, treating as miss");
            None
        }
    }
}

/// Writes a key, logging and swallowing cache failures.
pub(crate) async fn set_best_effort(cache: &dyn AuthCache, key: &str, value: &str, ttl_seconds: u32) {
    if let Err(error) = cache.set(key, value, ttl_seconds).await {
        warn!(key, %error, "cache write failed, entry not stored");
    }
}

/// Deletes a key, logging and swallowing cache failures.
///
/// A failed invalidation leaves the entry to lapse through its TTL.
pub(crate) async fn delete_best_effort(cache: &dyn AuthCache, key: &str) {
    if let Err(error) = cache.delete(key).await {
        warn!(key, %error, "cache delete failed, entry expires via ttl");
    }
}

/// Deletes every key matching a pattern, logging and swallowing failures.
pub(crate) async fn delete_pattern_best_effort(cache: &dyn AuthCache, pattern: &str) {
    if let Err(error) = cache.delete_pattern(pattern).await {
        warn!(pattern, %error, "cache pattern delete failed, entries expire via ttl");
    }
}
