use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use warden_core::{AppError, AppResult, ScopeContext, TenantId, UserContext, UserId};
use warden_domain::{AccessControlEntry, AccessLevel, DecisionSource};

use crate::test_support::{FakeAuditRepository, FakeAuthCache};

use super::{AccessControlRepository, AccessControlService};

#[derive(Default)]
struct FakeAccessControlRepository {
    entries: Mutex<Vec<(ScopeContext, AccessControlEntry)>>,
    find_calls: Mutex<usize>,
}

impl FakeAccessControlRepository {
    async fn seed(&self, scope: ScopeContext, entry: AccessControlEntry) {
        self.entries.lock().await.push((scope, entry));
    }

    async fn find_call_count(&self) -> usize {
        *self.find_calls.lock().await
    }
}

#[async_trait]
impl AccessControlRepository for FakeAccessControlRepository {
    async fn find_entry(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<Option<AccessControlEntry>> {
        *self.find_calls.lock().await += 1;
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .find(|(stored_scope, entry)| {
                *stored_scope == scope
                    && entry.user_id == *user_id
                    && entry.resource_type == resource_type
                    && entry.resource_id == resource_id
            })
            .map(|(_, entry)| entry.clone()))
    }

    async fn upsert_entry(&self, entry: &AccessControlEntry, _granted_by: &UserId) -> AppResult<()> {
        let scope = ScopeContext::from_tenant(entry.tenant_id);
        let mut entries = self.entries.lock().await;
        entries.retain(|(stored_scope, stored)| {
            !(*stored_scope == scope
                && stored.user_id == entry.user_id
                && stored.resource_type == entry.resource_type
                && stored.resource_id == entry.resource_id)
        });
        entries.push((scope, entry.clone()));
        Ok(())
    }

    async fn deactivate_entry(
        &self,
        scope: ScopeContext,
        user_id: &UserId,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(stored_scope, entry)| {
            !(*stored_scope == scope
                && entry.user_id == *user_id
                && entry.resource_type == resource_type
                && entry.resource_id == resource_id)
        });

        if entries.len() == before {
            return Err(AppError::NotFound(format!(
                "no active access entry for '{user_id}' on {resource_type}/{resource_id}"
            )));
        }
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        scope: ScopeContext,
        resource_type: &str,
        resource_id: &str,
        from_user: &UserId,
        to_user: &UserId,
        _transferred_by: &UserId,
    ) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let owner_held = entries.iter().any(|(stored_scope, entry)| {
            *stored_scope == scope
                && entry.user_id == *from_user
                && entry.resource_type == resource_type
                && entry.resource_id == resource_id
                && entry.access_level == AccessLevel::Owner
        });
        if !owner_held {
            return Err(AppError::Conflict(format!(
                "'{from_user}' does not own {resource_type}/{resource_id}"
            )));
        }

        entries.retain(|(stored_scope, entry)| {
            !(*stored_scope == scope
                && (entry.user_id == *from_user || entry.user_id == *to_user)
                && entry.resource_type == resource_type
                && entry.resource_id == resource_id)
        });
        entries.push((
            scope,
            AccessControlEntry {
                user_id: to_user.clone(),
                resource_type: resource_type.to_owned(),
                resource_id: resource_id.to_owned(),
                access_level: AccessLevel::Owner,
                tenant_id: scope.tenant_id(),
            },
        ));
        Ok(())
    }
}

struct Fixture {
    service: AccessControlService,
    repository: Arc<FakeAccessControlRepository>,
    audit_repository: Arc<FakeAuditRepository>,
    cache: Arc<FakeAuthCache>,
}

fn fixture() -> Fixture {
    let repository = Arc::new(FakeAccessControlRepository::default());
    let audit_repository = Arc::new(FakeAuditRepository::default());
    let cache = Arc::new(FakeAuthCache::default());
    let service = AccessControlService::new(
        repository.clone(),
        audit_repository.clone(),
        cache.clone(),
        300,
    );
    Fixture {
        service,
        repository,
        audit_repository,
        cache,
    }
}

fn superadmin() -> UserContext {
    UserContext::new(
        UserId::new("root"),
        None,
        None,
        None,
        true,
        Vec::new(),
        None,
    )
}

fn member(subject: &str) -> UserContext {
    UserContext::new(
        UserId::new(subject),
        None,
        None,
        None,
        false,
        Vec::new(),
        None,
    )
}

#[tokio::test]
async fn owner_grant_satisfies_every_lower_level() {
    let fixture = fixture();
    let user_id = UserId::new("u-1");

    let granted = fixture
        .service
        .grant_resource_access(&superadmin(), &user_id, "document", "doc-42", AccessLevel::Owner, None)
        .await;
    assert!(granted.is_ok());

    for level in [
        AccessLevel::Read,
        AccessLevel::Write,
        AccessLevel::Admin,
        AccessLevel::Owner,
    ] {
        let result = fixture
            .service
            .check_resource_access(&user_id, "document", "doc-42", level, None)
            .await;
        let Ok(result) = result else {
            panic!("check must resolve");
        };
        assert!(result.granted, "owner must satisfy {level}");
    }
}

#[tokio::test]
async fn read_grant_does_not_satisfy_write_or_admin() {
    let fixture = fixture();
    let user_id = UserId::new("u-1");

    let granted = fixture
        .service
        .grant_resource_access(&superadmin(), &user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;
    assert!(granted.is_ok());

    let read = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;
    let write = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Write, None)
        .await;
    let admin = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Admin, None)
        .await;

    let (Ok(read), Ok(write), Ok(admin)) = (read, write, admin) else {
        panic!("checks must resolve");
    };
    assert!(read.granted);
    assert!(!write.granted);
    assert!(!admin.granted);
}

#[tokio::test]
async fn decisions_are_cached_per_level() {
    let fixture = fixture();
    let user_id = UserId::new("u-1");

    let granted = fixture
        .service
        .grant_resource_access(&superadmin(), &user_id, "document", "doc-42", AccessLevel::Write, None)
        .await;
    assert!(granted.is_ok());

    let first = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;
    let second = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;

    let (Ok(first), Ok(second)) = (first, second) else {
        panic!("checks must resolve");
    };
    assert_eq!(first.source, DecisionSource::Store);
    assert_eq!(second.source, DecisionSource::Cache);
}

#[tokio::test]
async fn grant_invalidates_every_level_key_for_the_user() {
    let fixture = fixture();
    let user_id = UserId::new("u-1");
    let root = superadmin();

    let granted = fixture
        .service
        .grant_resource_access(&root, &user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;
    assert!(granted.is_ok());

    // Cache a denial at write level, then raise the grant.
    let denied = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Write, None)
        .await;
    let Ok(denied) = denied else {
        panic!("check must resolve");
    };
    assert!(!denied.granted);

    let raised = fixture
        .service
        .grant_resource_access(&root, &user_id, "document", "doc-42", AccessLevel::Admin, None)
        .await;
    assert!(raised.is_ok());

    let rechecked = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Write, None)
        .await;
    let Ok(rechecked) = rechecked else {
        panic!("recheck must resolve");
    };
    assert!(rechecked.granted);
    assert_eq!(rechecked.source, DecisionSource::Store);
}

#[tokio::test]
async fn administrative_operations_are_gated() {
    let fixture = fixture();
    let outsider = member("mallory");

    let denied = fixture
        .service
        .grant_resource_access(
            &outsider,
            &UserId::new("u-1"),
            "document",
            "doc-42",
            AccessLevel::Read,
            None,
        )
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    // Resource admins may administer the same resource.
    fixture
        .repository
        .seed(
            ScopeContext::Platform,
            AccessControlEntry {
                user_id: UserId::new("alice"),
                resource_type: "document".to_owned(),
                resource_id: "doc-42".to_owned(),
                access_level: AccessLevel::Admin,
                tenant_id: None,
            },
        )
        .await;
    let allowed = fixture
        .service
        .grant_resource_access(
            &member("alice"),
            &UserId::new("u-1"),
            "document",
            "doc-42",
            AccessLevel::Read,
            None,
        )
        .await;
    assert!(allowed.is_ok());
}

#[tokio::test]
async fn admin_gate_is_always_resolved_fresh() {
    let fixture = fixture();
    let root = superadmin();
    let user_id = UserId::new("u-1");

    let granted = fixture
        .service
        .grant_resource_access(&root, &user_id, "document", "doc-42", AccessLevel::Admin, None)
        .await;
    assert!(granted.is_ok());

    let baseline = fixture.repository.find_call_count().await;
    for _ in 0..2 {
        let result = fixture
            .service
            .revoke_resource_access(&member("u-1"), &user_id, "document", "doc-42", None)
            .await;
        // Second pass fails: the first revocation removed the admin entry.
        let _ = result;
    }

    assert_eq!(fixture.repository.find_call_count().await - baseline, 2);
}

#[tokio::test]
async fn ownership_transfer_is_atomic_and_exclusive() {
    let fixture = fixture();
    let root = superadmin();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let granted = fixture
        .service
        .grant_resource_access(&root, &alice, "document", "doc-42", AccessLevel::Owner, None)
        .await;
    assert!(granted.is_ok());

    let transferred = fixture
        .service
        .transfer_ownership(&root, "document", "doc-42", &alice, &bob, None)
        .await;
    assert!(transferred.is_ok());

    let alice_owns = fixture
        .service
        .check_ownership(&alice, "document", "doc-42", None)
        .await;
    let bob_owns = fixture
        .service
        .check_ownership(&bob, "document", "doc-42", None)
        .await;

    let (Ok(alice_owns), Ok(bob_owns)) = (alice_owns, bob_owns) else {
        panic!("checks must resolve");
    };
    assert!(!alice_owns.granted);
    assert!(bob_owns.granted);
}

#[tokio::test]
async fn transfer_from_a_non_owner_fails_without_side_effects() {
    let fixture = fixture();
    let root = superadmin();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let granted = fixture
        .service
        .grant_resource_access(&root, &alice, "document", "doc-42", AccessLevel::Write, None)
        .await;
    assert!(granted.is_ok());

    let transferred = fixture
        .service
        .transfer_ownership(&root, "document", "doc-42", &alice, &bob, None)
        .await;
    assert!(matches!(transferred, Err(AppError::Conflict(_))));

    let alice_access = fixture
        .service
        .check_resource_access(&alice, "document", "doc-42", AccessLevel::Write, None)
        .await;
    let Ok(alice_access) = alice_access else {
        panic!("check must resolve");
    };
    assert!(alice_access.granted);
}

#[tokio::test]
async fn mutations_append_audit_events() {
    let fixture = fixture();
    let root = superadmin();
    let user_id = UserId::new("u-1");

    let granted = fixture
        .service
        .grant_resource_access(&root, &user_id, "document", "doc-42", AccessLevel::Owner, None)
        .await;
    let transferred = fixture
        .service
        .transfer_ownership(&root, "document", "doc-42", &user_id, &UserId::new("u-2"), None)
        .await;

    assert!(granted.is_ok());
    assert!(transferred.is_ok());
    let events = fixture.audit_repository.events.lock().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action.as_str(), "access.granted");
    assert_eq!(events[1].action.as_str(), "access.ownership_transferred");
}

#[tokio::test]
async fn cache_outage_degrades_to_store_lookups() {
    let fixture = fixture();
    let user_id = UserId::new("u-1");

    let granted = fixture
        .service
        .grant_resource_access(&superadmin(), &user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;
    assert!(granted.is_ok());
    fixture.cache.set_failing(true);

    let result = fixture
        .service
        .check_resource_access(&user_id, "document", "doc-42", AccessLevel::Read, None)
        .await;

    let Ok(result) = result else {
        panic!("check must resolve despite the cache outage");
    };
    assert!(result.granted);
    assert_eq!(result.source, DecisionSource::Store);
}
