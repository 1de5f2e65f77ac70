use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use warden_core::{
    AppError, AppResult, SessionContext, TenantId, UserContext, UserId,
};
use warden_domain::{Session, SessionStatus};

use crate::audit::{AuditAction, AuditEvent, AuditRepository};
use crate::auth_cache::{self, AuthCache};
use crate::rate_limit_service::{RateLimitRule, RateLimitService};

/// Claims extracted from a verified identity provider token.
///
/// The verifier has already checked signature, issuer, audience, and
/// expiry; these values are trusted transport data, not decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject claim; maps to the user id.
    pub subject: String,
    /// Preferred username, if present.
    pub preferred_username: Option<String>,
    /// Email, if present.
    pub email: Option<String>,
    /// Realm-level role claims. Advisory only.
    pub realm_roles: Vec<String>,
    /// Per-client role claims. Advisory only.
    pub client_roles: BTreeMap<String, Vec<String>>,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
    /// Identity provider session id, if present.
    pub session_id: Option<String>,
    /// Space-separated scope claim, split.
    pub scopes: Vec<String>,
    /// Issuer URL the token was minted by.
    pub issuer: String,
    /// Authorized party, if present.
    pub authorized_party: Option<String>,
}

/// Port verifying externally issued signed tokens.
///
/// Implementations check signature against the issuer's published keys,
/// plus issuer, audience, and expiry. A failed verification is an
/// `Unauthorized` error, never a cached negative.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies a raw token and returns its claims.
    async fn verify(&self, raw_token: &str) -> AppResult<TokenClaims>;
}

/// Repository port for session persistence.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates or refreshes a session row.
    ///
    /// A terminal session is never resurrected; the refresh only
    /// applies while the stored row is still active.
    async fn upsert_session(&self, session: &Session) -> AppResult<()>;

    /// Finds a session by id.
    async fn find_session(&self, session_id: &str) -> AppResult<Option<Session>>;

    /// Moves one active session to a terminal status.
    ///
    /// Returns the number of rows updated; `0` when the session is
    /// absent or already terminal.
    async fn mark_session(&self, session_id: &str, status: SessionStatus) -> AppResult<u64>;

    /// Moves every active session of one user to a terminal status in
    /// one bulk update.
    async fn mark_user_sessions(&self, user_id: &UserId, status: SessionStatus)
    -> AppResult<u64>;

    /// Expires active sessions past their expiry or creation cutoff.
    async fn expire_sessions(
        &self,
        expired_before: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> AppResult<u64>;
}

/// Session behavior of the token validation service.
#[derive(Debug, Clone)]
pub struct TokenValidationConfig {
    /// TTL for cached session-validity answers. Short by design:
    /// sessions can be revoked at any time and staleness here has
    /// direct security impact.
    pub session_cache_ttl_seconds: u32,
    /// Age after which `cleanup_expired_sessions` retires sessions.
    pub session_lifetime_hours: i64,
    /// Role claim that marks a platform superadmin.
    pub superadmin_role: String,
    /// Per-session request limit.
    pub session_rate_limit: RateLimitRule,
}

impl Default for TokenValidationConfig {
    fn default() -> Self {
        Self {
            session_cache_ttl_seconds: 60,
            session_lifetime_hours: 24,
            superadmin_role: "superadmin".to_owned(),
            session_rate_limit: RateLimitRule::session_default(),
        }
    }
}

/// Application service turning validated tokens into request identities.
#[derive(Clone)]
pub struct TokenValidationService {
    verifier: Arc<dyn TokenVerifier>,
    sessions: Arc<dyn SessionRepository>,
    rate_limits: RateLimitService,
    audit_repository: Arc<dyn AuditRepository>,
    cache: Arc<dyn AuthCache>,
    config: TokenValidationConfig,
}

impl TokenValidationService {
    /// Creates a new token validation service.
    #[must_use]
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        sessions: Arc<dyn SessionRepository>,
        rate_limits: RateLimitService,
        audit_repository: Arc<dyn AuditRepository>,
        cache: Arc<dyn AuthCache>,
        config: TokenValidationConfig,
    ) -> Self {
        Self {
            verifier,
            sessions,
            rate_limits,
            audit_repository,
            cache,
            config,
        }
    }

    /// Verifies a token and builds the request identity.
    ///
    /// The token's role claims are carried as advisory data only;
    /// authorization decisions come from the role and permission
    /// services. When the token carries a session id, the per-session
    /// rate limit is enforced and the session row persisted or
    /// refreshed.
    pub async fn extract_user_context(
        &self,
        raw_token: &str,
        tenant_id: Option<TenantId>,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> AppResult<UserContext> {
        let claims = self.verifier.verify(raw_token).await?;

        let subject = claims.subject.trim();
        if subject.is_empty() {
            return Err(AppError::Validation(
                "token is missing the subject claim".to_owned(),
            ));
        }
        let user_id = UserId::new(subject);

        let mut advisory_roles = claims.realm_roles.clone();
        for roles in claims.client_roles.values() {
            for role in roles {
                if !advisory_roles.contains(role) {
                    advisory_roles.push(role.clone());
                }
            }
        }
        let is_superadmin = claims
            .realm_roles
            .iter()
            .any(|role| role == &self.config.superadmin_role);

        let session = match &claims.session_id {
            Some(session_id) => {
                let remaining = self
                    .rate_limits
                    .check_rate_limit(&self.config.session_rate_limit, session_id)
                    .await?;

                let row = Session {
                    id: session_id.clone(),
                    user_id: user_id.clone(),
                    tenant_id,
                    status: SessionStatus::Active,
                    created_at: Utc::now(),
                    expires_at: claims.expires_at,
                    rate_limit_remaining: remaining,
                };
                self.sessions.upsert_session(&row).await?;

                Some(SessionContext::new(
                    session_id.clone(),
                    claims.expires_at,
                    claims.scopes.clone(),
                    client_ip.map(str::to_owned),
                    user_agent.map(str::to_owned),
                ))
            }
            None => None,
        };

        Ok(UserContext::new(
            user_id,
            claims.preferred_username,
            claims.email,
            tenant_id,
            is_superadmin,
            advisory_roles,
            session,
        ))
    }

    /// Returns whether a session is currently valid for a user.
    pub async fn validate_session(
        &self,
        session_id: &str,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        let key = auth_cache::session_validity_key(session_id, user_id);
        if let Some(encoded) = auth_cache::get_or_miss(self.cache.as_ref(), &key).await {
            match serde_json::from_str::<bool>(&encoded) {
                Ok(valid) => return Ok(valid),
                Err(error) => {
                    tracing::warn!(%key, %error, "discarding undecodable session cache entry");
                }
            }
        }

        let valid = match self.sessions.find_session(session_id).await? {
            Some(session) => {
                session.user_id == *user_id
                    && session.is_active(Utc::now())
                    && (session.tenant_id.is_none() || session.tenant_id == tenant_id)
            }
            None => false,
        };

        let encoded = if valid { "true" } else { "false" };
        auth_cache::set_best_effort(
            self.cache.as_ref(),
            &key,
            encoded,
            self.config.session_cache_ttl_seconds,
        )
        .await;

        Ok(valid)
    }

    /// Invalidates one session on explicit logout.
    ///
    /// Fail-closed: a store failure propagates instead of reporting a
    /// successful logout. Invalidating an absent or already-terminal
    /// session is a no-op.
    pub async fn invalidate_session(&self, session_id: &str, user_id: &UserId) -> AppResult<()> {
        let updated = self
            .sessions
            .mark_session(session_id, SessionStatus::Invalidated)
            .await?;
        if updated == 0 {
            info!(session_id, "session was already terminal or absent");
        }

        auth_cache::delete_best_effort(
            self.cache.as_ref(),
            &auth_cache::session_validity_key(session_id, user_id),
        )
        .await;

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: None,
                subject: user_id.to_string(),
                action: AuditAction::SessionInvalidated,
                resource_type: "session".to_owned(),
                resource_id: session_id.to_owned(),
                detail: None,
            })
            .await
    }

    /// Revokes every active session of one user in one bulk update.
    ///
    /// Returns the number of sessions revoked.
    pub async fn invalidate_user_sessions(&self, user_id: &UserId) -> AppResult<u64> {
        let revoked = self
            .sessions
            .mark_user_sessions(user_id, SessionStatus::Revoked)
            .await?;
        info!(user = %user_id, revoked, "revoked all user sessions");

        auth_cache::delete_pattern_best_effort(
            self.cache.as_ref(),
            &auth_cache::session_validity_pattern(user_id),
        )
        .await;

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: None,
                subject: user_id.to_string(),
                action: AuditAction::UserSessionsRevoked,
                resource_type: "session".to_owned(),
                resource_id: user_id.to_string(),
                detail: Some(format!("revoked {revoked} sessions")),
            })
            .await?;

        Ok(revoked)
    }

    /// Retires active sessions whose expiry lapsed or that outlived
    /// `expiry_hours`. Intended to run on a schedule, not per-request.
    pub async fn cleanup_expired_sessions(&self, expiry_hours: i64) -> AppResult<u64> {
        let now = Utc::now();
        let created_cutoff = now - chrono::Duration::hours(expiry_hours);
        let expired = self.sessions.expire_sessions(now, created_cutoff).await?;
        if expired > 0 {
            info!(expired, "retired expired sessions");
        }

        Ok(expired)
    }
}
