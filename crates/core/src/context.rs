use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ScopeContext, TenantId, UserId};

/// Session details attached to an authenticated request.
///
/// Rebuilt from the validated token on every request, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    session_id: String,
    expires_at: DateTime<Utc>,
    scopes: Vec<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl SessionContext {
    /// Creates a session context from token and transport data.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            expires_at,
            scopes,
            client_ip,
            user_agent,
        }
    }

    /// Returns the stable session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session_id.as_str()
    }

    /// Returns the session expiry timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the space-separated OAuth scopes granted to the session.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        self.scopes.as_slice()
    }

    /// Returns the client IP recorded at validation time.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Returns the user agent recorded at validation time.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// Identity resolved from a validated token for the duration of one request.
///
/// The role list mirrors the token's role claims and is advisory only;
/// authorization decisions always come from the role and permission
/// services, not from this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    user_id: UserId,
    username: Option<String>,
    email: Option<String>,
    tenant_id: Option<TenantId>,
    is_superadmin: bool,
    advisory_roles: Vec<String>,
    session: Option<SessionContext>,
}

impl UserContext {
    /// Creates a user context from validated token data.
    #[must_use]
    pub fn new(
        user_id: UserId,
        username: Option<String>,
        email: Option<String>,
        tenant_id: Option<TenantId>,
        is_superadmin: bool,
        advisory_roles: Vec<String>,
        session: Option<SessionContext>,
    ) -> Self {
        Self {
            user_id,
            username,
            email,
            tenant_id,
            is_superadmin,
            advisory_roles,
            session,
        }
    }

    /// Returns a copy of this context bound to a different tenant.
    #[must_use]
    pub fn with_tenant(&self, tenant_id: Option<TenantId>) -> Self {
        Self {
            tenant_id,
            ..self.clone()
        }
    }

    /// Returns the stable user identifier.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the preferred username, if the provider returned one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the email, if the provider returned one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the tenant the request is bound to, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Returns the scope this identity operates in.
    #[must_use]
    pub fn scope(&self) -> ScopeContext {
        ScopeContext::from_tenant(self.tenant_id)
    }

    /// Returns whether the identity holds the platform superadmin role.
    #[must_use]
    pub fn is_superadmin(&self) -> bool {
        self.is_superadmin
    }

    /// Returns the advisory role codes carried by the token.
    #[must_use]
    pub fn advisory_roles(&self) -> &[String] {
        self.advisory_roles.as_slice()
    }

    /// Returns the session context, if the token carried a session id.
    #[must_use]
    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }
}
