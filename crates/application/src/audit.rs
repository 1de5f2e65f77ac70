use async_trait::async_trait;
use warden_core::{AppResult, TenantId};

/// Stable audit actions emitted by authorization mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// Emitted when a role is assigned to a user.
    RoleAssigned,
    /// Emitted when a role assignment is revoked.
    RoleRevoked,
    /// Emitted when resource access is granted.
    AccessGranted,
    /// Emitted when resource access is revoked.
    AccessRevoked,
    /// Emitted when resource ownership is transferred.
    OwnershipTransferred,
    /// Emitted when a session is invalidated by logout.
    SessionInvalidated,
    /// Emitted when every session of one user is revoked.
    UserSessionsRevoked,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleAssigned => "role.assigned",
            Self::RoleRevoked => "role.revoked",
            Self::AccessGranted => "access.granted",
            Self::AccessRevoked => "access.revoked",
            Self::OwnershipTransferred => "access.ownership_transferred",
            Self::SessionInvalidated => "session.invalidated",
            Self::UserSessionsRevoked => "session.user_sessions_revoked",
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Tenant the mutation happened in; `None` for platform scope.
    pub tenant_id: Option<TenantId>,
    /// Actor subject that performed the mutation.
    pub subject: String,
    /// Stable action identifier.
    pub action: AuditAction,
    /// Mutated resource type.
    pub resource_type: String,
    /// Mutated resource identifier.
    pub resource_id: String,
    /// Optional free-form detail.
    pub detail: Option<String>,
}

/// Repository port for appending audit events.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one event to the audit trail.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
