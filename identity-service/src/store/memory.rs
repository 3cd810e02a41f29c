//! In-memory store used by tests and local development.
//!
//! Mirrors the Postgres semantics closely enough for the domain services to
//! be exercised end to end: the failure-counter bump is applied under a
//! single lock acquisition, ledger and audit collections are append-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditLogEntry, Branch, BranchMembership, Identity, LoginAttempt, Permission,
    RefreshToken, Role, UserPermissionGrant,
};

use super::{
    AccessStore, AuditStore, FailureOutcome, IdentityStore, LedgerStore, StoreError, TokenStore,
};

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    roles: HashMap<Uuid, Role>,
    identity_roles: Vec<(Uuid, Uuid)>,
    permissions: HashMap<Uuid, Permission>,
    role_permissions: Vec<(Uuid, Uuid)>,
    user_grants: Vec<UserPermissionGrant>,
    branches: HashMap<Uuid, Branch>,
    memberships: Vec<MembershipRow>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    login_attempts: Vec<LoginAttempt>,
    audit_log: Vec<AuditLogEntry>,
}

struct MembershipRow {
    identity_id: Uuid,
    branch_id: Uuid,
    access_level: String,
    is_default: bool,
}

/// Mutex-guarded map store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Seeding helpers for tests and local bootstrap.

    pub fn add_role(&self, role: Role) -> Uuid {
        let id = role.role_id;
        self.lock().roles.insert(id, role);
        id
    }

    pub fn assign_role(&self, identity_id: Uuid, role_id: Uuid) {
        self.lock().identity_roles.push((identity_id, role_id));
    }

    pub fn add_permission(&self, permission: Permission) -> Uuid {
        let id = permission.permission_id;
        self.lock().permissions.insert(id, permission);
        id
    }

    pub fn grant_role_permission(&self, role_id: Uuid, permission_id: Uuid) {
        self.lock().role_permissions.push((role_id, permission_id));
    }

    pub fn add_user_grant(&self, grant: UserPermissionGrant) {
        self.lock().user_grants.push(grant);
    }

    pub fn add_branch(&self, branch: Branch) -> Uuid {
        let id = branch.branch_id;
        self.lock().branches.insert(id, branch);
        id
    }

    pub fn add_membership(
        &self,
        identity_id: Uuid,
        branch_id: Uuid,
        access_level: &str,
        is_default: bool,
    ) {
        self.lock().memberships.push(MembershipRow {
            identity_id,
            branch_id,
            access_level: access_level.to_string(),
            is_default,
        });
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_identity_by_login(&self, login: &str) -> Result<Option<Identity>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .identities
            .values()
            .find(|i| i.email == login || i.handle == login)
            .cloned())
    }

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock().identities.get(&identity_id).cloned())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.lock()
            .identities
            .insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn record_login_failure(
        &self,
        identity_id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<FailureOutcome, StoreError> {
        let mut inner = self.lock();
        let identity = inner
            .identities
            .get_mut(&identity_id)
            .ok_or(StoreError::Unavailable(sqlx::Error::RowNotFound))?;

        identity.failed_login_attempts += 1;
        if identity.failed_login_attempts >= threshold {
            identity.is_locked = true;
            identity.lock_until = Some(lock_until);
        }
        identity.updated_at = Utc::now();

        Ok(FailureOutcome {
            failed_login_attempts: identity.failed_login_attempts,
            is_locked: identity.is_locked,
            lock_until: identity.lock_until,
        })
    }

    async fn record_login_success(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.failed_login_attempts = 0;
            identity.is_locked = false;
            identity.lock_until = None;
            identity.last_login = Some(at);
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_lockout(&self, identity_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.failed_login_attempts = 0;
            identity.is_locked = false;
            identity.lock_until = None;
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_identity_status(
        &self,
        identity_id: Uuid,
        status: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.status = status.to_string();
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(identity) = inner.identities.get_mut(&identity_id) {
            identity.password_hash = password_hash.to_string();
            identity.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn roles_for(&self, identity_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let inner = self.lock();
        let mut roles: Vec<Role> = inner
            .identity_roles
            .iter()
            .filter(|(id, _)| *id == identity_id)
            .filter_map(|(_, role_id)| inner.roles.get(role_id).cloned())
            .collect();
        roles.sort_by_key(|r| r.priority);
        Ok(roles)
    }

    async fn role_permissions_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError> {
        let inner = self.lock();
        let role_ids: Vec<Uuid> = inner
            .identity_roles
            .iter()
            .filter(|(id, _)| *id == identity_id)
            .map(|(_, role_id)| *role_id)
            .collect();

        let mut seen = std::collections::HashSet::new();
        let permissions = inner
            .role_permissions
            .iter()
            .filter(|(role_id, _)| role_ids.contains(role_id))
            .filter(|(_, permission_id)| seen.insert(*permission_id))
            .filter_map(|(_, permission_id)| inner.permissions.get(permission_id).cloned())
            .collect();
        Ok(permissions)
    }

    async fn grants_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<UserPermissionGrant>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .user_grants
            .iter()
            .filter(|g| g.identity_id == identity_id)
            .cloned()
            .collect())
    }

    async fn branch_memberships_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<BranchMembership>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .memberships
            .iter()
            .filter(|m| m.identity_id == identity_id)
            .filter_map(|m| {
                let branch = inner.branches.get(&m.branch_id)?;
                if !branch.is_active {
                    return None;
                }
                Some(BranchMembership {
                    branch_id: m.branch_id,
                    branch_code: branch.code.clone(),
                    access_level: m.access_level.clone(),
                    is_default: m.is_default,
                })
            })
            .collect())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.lock()
            .refresh_tokens
            .insert(token.token_id, token.clone());
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_id: Uuid,
    ) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.lock().refresh_tokens.get(&token_id).cloned())
    }

    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        revoked_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.refresh_tokens.get_mut(&token_id) {
            Some(token) if !token.is_revoked => {
                token.is_revoked = true;
                token.revoked_at = Some(at);
                token.revoked_by = Some(revoked_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_identity(
        &self,
        identity_id: Uuid,
        revoked_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut count = 0;
        for token in inner.refresh_tokens.values_mut() {
            if token.identity_id == identity_id && !token.is_revoked {
                token.is_revoked = true;
                token.revoked_at = Some(at);
                token.revoked_by = Some(revoked_by);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), StoreError> {
        self.lock().login_attempts.push(attempt.clone());
        Ok(())
    }

    async fn login_attempts(
        &self,
        login: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, StoreError> {
        let inner = self.lock();
        let mut attempts: Vec<LoginAttempt> = inner
            .login_attempts
            .iter()
            .filter(|a| login.map_or(true, |l| a.login == l))
            .filter(|a| since.map_or(true, |s| a.attempted_at >= s))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at));
        attempts.truncate(limit.clamp(1, 1000) as usize);
        Ok(attempts)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.lock().audit_log.push(entry.clone());
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let inner = self.lock();
        let mut entries: Vec<AuditLogEntry> = inner
            .audit_log
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        entries.truncate(filter.limit.unwrap_or(100).clamp(1, 1000) as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OriginMeta;

    fn identity() -> Identity {
        Identity::new(
            "Alice".to_string(),
            "Okafor".to_string(),
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$fake".to_string(),
        )
    }

    #[tokio::test]
    async fn test_find_by_email_or_handle() {
        let store = MemoryStore::new();
        let id = identity();
        store.insert_identity(&id).await.unwrap();

        let by_email = store.find_identity_by_login("alice@x.com").await.unwrap();
        assert!(by_email.is_some());

        let by_handle = store.find_identity_by_login("alice").await.unwrap();
        assert_eq!(by_handle.unwrap().identity_id, id.identity_id);

        assert!(store
            .find_identity_by_login("bob")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failure_counter_locks_at_threshold() {
        let store = MemoryStore::new();
        let id = identity();
        store.insert_identity(&id).await.unwrap();

        let lock_until = Utc::now() + chrono::Duration::minutes(30);
        for n in 1..=4 {
            let outcome = store
                .record_login_failure(id.identity_id, 5, lock_until)
                .await
                .unwrap();
            assert_eq!(outcome.failed_login_attempts, n);
            assert!(!outcome.is_locked);
        }

        let outcome = store
            .record_login_failure(id.identity_id, 5, lock_until)
            .await
            .unwrap();
        assert_eq!(outcome.failed_login_attempts, 5);
        assert!(outcome.is_locked);
        assert_eq!(outcome.lock_until, Some(lock_until));
    }

    #[tokio::test]
    async fn test_success_resets_counter_and_lock() {
        let store = MemoryStore::new();
        let id = identity();
        store.insert_identity(&id).await.unwrap();

        let lock_until = Utc::now() + chrono::Duration::minutes(30);
        for _ in 0..5 {
            store
                .record_login_failure(id.identity_id, 5, lock_until)
                .await
                .unwrap();
        }

        let at = Utc::now();
        store.record_login_success(id.identity_id, at).await.unwrap();

        let stored = store.find_identity(id.identity_id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(!stored.is_locked);
        assert!(stored.lock_until.is_none());
        assert_eq!(stored.last_login, Some(at));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = MemoryStore::new();
        let token = RefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "tok",
            7,
            "10.0.0.1".to_string(),
            None,
        );
        store.insert_refresh_token(&token).await.unwrap();

        let actor = Uuid::new_v4();
        let now = Utc::now();
        assert!(store
            .revoke_refresh_token(token.token_id, actor, now)
            .await
            .unwrap());
        assert!(!store
            .revoke_refresh_token(token.token_id, actor, now)
            .await
            .unwrap());

        let stored = store
            .find_refresh_token(token.token_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_revoked);
        assert_eq!(stored.revoked_by, Some(actor));
    }

    #[tokio::test]
    async fn test_ledger_filters() {
        let store = MemoryStore::new();
        let origin = OriginMeta::new("10.0.0.1", None);
        for login in ["alice", "alice", "bob"] {
            store
                .insert_login_attempt(&LoginAttempt::new(
                    None,
                    login.to_string(),
                    crate::models::AttemptReason::BadPassword,
                    &origin,
                ))
                .await
                .unwrap();
        }

        let alice = store
            .login_attempts(Some("alice"), None, 100)
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);

        let all = store.login_attempts(None, None, 100).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
