use warden_core::{ScopeContext, TenantId, UserId};

use crate::permission::PermissionCode;

/// Where a decision was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Answered from the cache without touching the store.
    Cache,
    /// Derived from store rows on a cache miss.
    Store,
    /// Computed in-process from other decisions.
    Derived,
}

/// One permission question: who asks for what, in which tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheck {
    /// User the check is about.
    pub user_id: UserId,
    /// Requested permission code.
    pub code: PermissionCode,
    /// Tenant context of the check, if any.
    pub tenant_id: Option<TenantId>,
}

impl PermissionCheck {
    /// Returns the scope the check resolves in.
    #[must_use]
    pub fn scope(&self) -> ScopeContext {
        ScopeContext::from_tenant(self.tenant_id)
    }
}

/// Outcome of a permission or resource-access check.
///
/// A denial is a normal result, not an error; infrastructure failures
/// surface as errors instead. The evidence fields support audit logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResult {
    /// Whether access was granted.
    pub granted: bool,
    /// Human-readable reason for the decision.
    pub reason: String,
    /// Where the decision was resolved.
    pub source: DecisionSource,
    /// Permission codes that matched the request.
    pub matched_codes: Vec<PermissionCode>,
    /// Role codes that contributed matching permissions.
    pub active_roles: Vec<String>,
}

impl PermissionResult {
    /// Creates a granted result without evidence.
    #[must_use]
    pub fn granted(reason: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            granted: true,
            reason: reason.into(),
            source,
            matched_codes: Vec::new(),
            active_roles: Vec::new(),
        }
    }

    /// Creates a denied result.
    #[must_use]
    pub fn denied(reason: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            granted: false,
            reason: reason.into(),
            source,
            matched_codes: Vec::new(),
            active_roles: Vec::new(),
        }
    }

    /// Returns a copy carrying the supporting evidence.
    #[must_use]
    pub fn with_evidence(
        self,
        matched_codes: Vec<PermissionCode>,
        active_roles: Vec<String>,
    ) -> Self {
        Self {
            matched_codes,
            active_roles,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use warden_core::{ScopeContext, TenantId, UserId};

    use crate::permission::PermissionCode;

    use super::{DecisionSource, PermissionCheck, PermissionResult};

    #[test]
    fn check_scope_follows_tenant() {
        let Ok(code) = PermissionCode::parse("users:read") else {
            panic!("code must parse");
        };
        let tenant_id = TenantId::new();
        let check = PermissionCheck {
            user_id: UserId::new("u-1"),
            code,
            tenant_id: Some(tenant_id),
        };

        assert_eq!(check.scope(), ScopeContext::Tenant(tenant_id));
    }

    #[test]
    fn evidence_is_attached_without_mutation() {
        let Ok(code) = PermissionCode::parse("users:read") else {
            panic!("code must parse");
        };
        let result = PermissionResult::granted("granted via role 'ops'", DecisionSource::Store)
            .with_evidence(vec![code], vec!["ops".to_owned()]);

        assert!(result.granted);
        assert_eq!(result.active_roles, vec!["ops".to_owned()]);
        assert_eq!(result.matched_codes.len(), 1);
    }
}
