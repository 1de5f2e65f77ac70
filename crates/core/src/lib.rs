//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Request-scoped identity value objects.
pub mod context;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use context::{SessionContext, UserContext};

/// Result type used across Warden crates.
pub type AppResult<T> = Result<T, AppError>;

/// Tenant identifier used as the partition key for every persisted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a random tenant identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tenant identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Stable user identifier, carried as the identity provider subject claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from an identity provider subject.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying subject string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// Tenant boundary a request operates in.
///
/// Every cache key and store lookup is namespaced by this value so no
/// resolution can silently cross a tenant boundary. `Platform` denotes
/// platform-wide scope; rows and keys in that scope carry no tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeContext {
    /// Platform-wide scope, valid in every tenant context.
    Platform,
    /// A single tenant's scope.
    Tenant(TenantId),
}

impl ScopeContext {
    /// Builds a scope from an optional tenant identifier.
    #[must_use]
    pub fn from_tenant(tenant_id: Option<TenantId>) -> Self {
        match tenant_id {
            Some(tenant_id) => Self::Tenant(tenant_id),
            None => Self::Platform,
        }
    }

    /// Returns the tenant identifier, if this is a tenant scope.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Self::Platform => None,
            Self::Tenant(tenant_id) => Some(*tenant_id),
        }
    }
}

impl Display for ScopeContext {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Platform => write!(formatter, "platform"),
            Self::Tenant(tenant_id) => write!(formatter, "tenant:{tenant_id}"),
        }
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is not authenticated or presented an invalid credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Caller exceeded a rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A backing store or upstream dependency could not be reached.
    ///
    /// Callers must treat this as "cannot confirm access" and deny,
    /// never as a grant.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
