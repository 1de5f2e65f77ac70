use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::{AppError, TenantId, UserId};

/// Resource access level, totally ordered.
///
/// `Owner > Admin > Write > Read > None`; holding a higher level implies
/// every capability of the lower ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// No access.
    None,
    /// Read the resource.
    Read,
    /// Modify the resource.
    Write,
    /// Administer grants on the resource.
    Admin,
    /// Full ownership, including transfer.
    Owner,
}

impl AccessLevel {
    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Returns every level, lowest first.
    ///
    /// Used to expand cache invalidation across all level-keyed entries
    /// for one (user, resource) pair.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AccessLevel] = &[
            AccessLevel::None,
            AccessLevel::Read,
            AccessLevel::Write,
            AccessLevel::Admin,
            AccessLevel::Owner,
        ];

        ALL
    }
}

impl Display for AccessLevel {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            _ => Err(AppError::Validation(format!(
                "unknown access level value '{value}'"
            ))),
        }
    }
}

/// Resolved per-resource access decision, independent of role membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    /// User the entry applies to.
    pub user_id: UserId,
    /// Kind of resource, e.g. `"document"`.
    pub resource_type: String,
    /// Resource identifier within its type.
    pub resource_id: String,
    /// Granted access level.
    pub access_level: AccessLevel,
    /// Tenant the entry is scoped to, if any.
    pub tenant_id: Option<TenantId>,
}

impl AccessControlEntry {
    /// Returns whether this entry satisfies a request for `required`.
    #[must_use]
    pub fn satisfies(&self, required: AccessLevel) -> bool {
        self.access_level >= required
    }
}
