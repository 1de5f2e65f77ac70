use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::AppError;

/// Action value that implies every other action on the same resource.
pub const WILDCARD_ACTION: &str = "*";

/// Validated permission code in `"resource:action"` form.
///
/// `"resource:*"` is the wildcard form. Codes on different resources never
/// imply each other, regardless of action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionCode {
    resource: String,
    action: String,
}

impl PermissionCode {
    /// Parses a permission code from its transport form.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let Some((resource, action)) = value.split_once(':') else {
            return Err(AppError::Validation(format!(
                "permission code '{value}' must use the 'resource:action' form"
            )));
        };

        validate_segment(resource, "resource", value)?;
        validate_segment(action, "action", value)?;

        if resource == WILDCARD_ACTION {
            return Err(AppError::Validation(format!(
                "permission code '{value}' may not use a wildcard resource"
            )));
        }

        Ok(Self {
            resource: resource.to_owned(),
            action: action.to_owned(),
        })
    }

    /// Returns the wildcard code for a resource.
    pub fn wildcard(resource: &str) -> Result<Self, AppError> {
        Self::parse(&format!("{resource}:{WILDCARD_ACTION}"))
    }

    /// Returns the resource segment.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the action segment.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns whether this is the wildcard form for its resource.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.action == WILDCARD_ACTION
    }

    /// Returns whether holding this code satisfies a request for `other`.
    ///
    /// True only on the same resource, for the exact action or the wildcard.
    #[must_use]
    pub fn implies(&self, other: &PermissionCode) -> bool {
        self.resource == other.resource
            && (self.action == WILDCARD_ACTION || self.action == other.action)
    }
}

impl Display for PermissionCode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for PermissionCode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for PermissionCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<PermissionCode> for String {
    fn from(value: PermissionCode) -> Self {
        value.to_string()
    }
}

fn validate_segment(segment: &str, name: &str, code: &str) -> Result<(), AppError> {
    if segment.is_empty() {
        return Err(AppError::Validation(format!(
            "permission code '{code}' has an empty {name} segment"
        )));
    }

    if segment.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(format!(
            "permission code '{code}' has whitespace in its {name} segment"
        )));
    }

    Ok(())
}

/// Breadth at which a permission or role applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    /// Applies platform-wide.
    Platform,
    /// Applies within one tenant.
    Tenant,
    /// Applies within one team.
    Team,
    /// Applies to a single user.
    User,
}

impl ScopeLevel {
    /// Returns a stable storage value for this scope level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Tenant => "tenant",
            Self::Team => "team",
            Self::User => "user",
        }
    }
}

impl FromStr for ScopeLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "platform" => Ok(Self::Platform),
            "tenant" => Ok(Self::Tenant),
            "team" => Ok(Self::Team),
            "user" => Ok(Self::User),
            _ => Err(AppError::Validation(format!(
                "unknown scope level value '{value}'"
            ))),
        }
    }
}

/// Immutable permission definition owned by the administrative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Stable permission identifier.
    pub id: Uuid,
    /// Permission code in `"resource:action"` form.
    pub code: PermissionCode,
    /// Breadth at which the permission applies.
    pub scope_level: ScopeLevel,
    /// Marks operations with destructive potential.
    pub is_dangerous: bool,
    /// Requires a recent multi-factor challenge to exercise.
    pub requires_mfa: bool,
    /// Requires an approval workflow to exercise.
    pub requires_approval: bool,
}
