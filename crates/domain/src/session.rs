use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, TenantId, UserId};

/// Session lifecycle state.
///
/// `Active` is the only non-terminal state. A session that leaves it never
/// returns; a new token produces a new session row instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session accepts requests.
    Active,
    /// Session lapsed through its TTL.
    Expired,
    /// Session terminated by administrative action.
    Revoked,
    /// Session terminated by explicit logout.
    Invalidated,
}

impl SessionStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Invalidated => "invalidated",
        }
    }

    /// Returns whether the status admits no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Returns whether the lifecycle permits moving to `target`.
    #[must_use]
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        matches!(self, Self::Active) && target.is_terminal()
    }
}

impl Display for SessionStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "invalidated" => Ok(Self::Invalidated),
            _ => Err(AppError::Validation(format!(
                "unknown session status value '{value}'"
            ))),
        }
    }
}

/// Session record owned exclusively by the token validation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable session identifier from the identity provider.
    pub id: String,
    /// User the session belongs to.
    pub user_id: UserId,
    /// Tenant the session is bound to, if any.
    pub tenant_id: Option<TenantId>,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// When the session row was created.
    pub created_at: DateTime<Utc>,
    /// When the session lapses.
    pub expires_at: DateTime<Utc>,
    /// Requests left in the current rate-limit window.
    pub rate_limit_remaining: i32,
}

impl Session {
    /// Returns whether the session accepts requests at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && now < self.expires_at
    }
}
