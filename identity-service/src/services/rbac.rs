use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{BranchScope, GrantType, PermissionCode};
use crate::services::AuthError;
use crate::store::Store;

/// Resolves an identity's effective permission set and branch scope.
///
/// Effective permissions are the union of role-derived permissions and
/// direct grants, minus direct denies. A deny always wins over any grant,
/// regardless of source. Stored codes that fail to parse are skipped and
/// logged instead of silently widening or failing the decision.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn Store + Send + Sync>,
    admin_role_code: String,
}

/// Snapshot of one identity's resolved access at a point in time.
#[derive(Debug, Clone)]
pub struct ResolvedAccess {
    pub role_codes: Vec<String>,
    pub permissions: HashSet<PermissionCode>,
    pub branch_scope: BranchScope,
}

impl ResolvedAccess {
    pub fn has(&self, code: &PermissionCode) -> bool {
        self.permissions.contains(code)
    }
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn Store + Send + Sync>, admin_role_code: String) -> Self {
        Self {
            store,
            admin_role_code,
        }
    }

    /// Compute the full access snapshot for an identity.
    pub async fn resolve(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedAccess, AuthError> {
        let roles = self.store.roles_for(identity_id).await?;
        let role_codes: Vec<String> = roles.iter().map(|r| r.code.clone()).collect();

        let permissions = self.effective_permissions(identity_id, now).await?;
        let branch_scope = self.branch_scope_for(identity_id, &role_codes).await?;

        Ok(ResolvedAccess {
            role_codes,
            permissions,
            branch_scope,
        })
    }

    /// Role permissions ∪ direct grants − direct denies, expiry-aware.
    pub async fn effective_permissions(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<HashSet<PermissionCode>, AuthError> {
        let mut effective = HashSet::new();

        for permission in self.store.role_permissions_for(identity_id).await? {
            match PermissionCode::parse(&permission.code) {
                Ok(code) => {
                    effective.insert(code);
                }
                Err(_) => {
                    tracing::warn!(
                        code = %permission.code,
                        permission_id = %permission.permission_id,
                        "Skipping malformed permission code on role"
                    );
                }
            }
        }

        let grants = self.store.grants_for(identity_id).await?;

        // Apply grants first so a same-code deny cannot be re-added
        for grant in grants.iter().filter(|g| g.is_effective(now)) {
            if grant.grant_type() != Some(GrantType::Grant) {
                continue;
            }
            match PermissionCode::parse(&grant.permission_code) {
                Ok(code) => {
                    effective.insert(code);
                }
                Err(_) => {
                    tracing::warn!(
                        code = %grant.permission_code,
                        identity_id = %identity_id,
                        "Skipping malformed permission code on direct grant"
                    );
                }
            }
        }

        for deny in grants.iter().filter(|g| g.is_effective(now)) {
            if deny.grant_type() != Some(GrantType::Deny) {
                continue;
            }
            if let Ok(code) = PermissionCode::parse(&deny.permission_code) {
                effective.remove(&code);
            }
        }

        Ok(effective)
    }

    /// Branch visibility: holders of the designated administrative role see
    /// every branch; everyone else sees exactly their membership list.
    async fn branch_scope_for(
        &self,
        identity_id: Uuid,
        role_codes: &[String],
    ) -> Result<BranchScope, AuthError> {
        if role_codes.iter().any(|c| c == &self.admin_role_code) {
            return Ok(BranchScope::All);
        }

        let branches = self.store.branch_memberships_for(identity_id).await?;
        Ok(BranchScope::Memberships { branches })
    }

    /// Check that an identity holds every one of `required`. Returns the
    /// missing codes on denial so the caller can audit them.
    pub async fn authorize(
        &self,
        identity_id: Uuid,
        required: &[PermissionCode],
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let effective = self.effective_permissions(identity_id, now).await?;

        let missing: Vec<String> = required
            .iter()
            .filter(|code| !effective.contains(code))
            .map(|code| code.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Forbidden { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Branch, BranchLevel, GrantType, Identity, Permission, Role};
    use crate::store::{IdentityStore, MemoryStore};
    use chrono::Duration;

    const ADMIN_ROLE: &str = "SUPER_ADMIN";

    fn code(s: &str) -> PermissionCode {
        PermissionCode::parse(s).unwrap()
    }

    fn grant(
        identity_id: Uuid,
        code_str: &str,
        grant_type: GrantType,
        expires_at: Option<DateTime<Utc>>,
    ) -> crate::models::UserPermissionGrant {
        crate::models::UserPermissionGrant::new(identity_id, &code(code_str), grant_type, expires_at)
    }

    async fn setup() -> (PermissionResolver, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let resolver = PermissionResolver::new(store.clone(), ADMIN_ROLE.to_string());

        let identity = Identity::new(
            "Alice".to_string(),
            "Okafor".to_string(),
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$fake".to_string(),
        );
        let id = identity.identity_id;
        store.insert_identity(&identity).await.unwrap();

        (resolver, store, id)
    }

    #[tokio::test]
    async fn test_union_of_roles_and_grants() {
        let (resolver, store, id) = setup().await;

        let role = Role::new("OPERATOR".to_string(), "Operator".to_string());
        let read = Permission::new(&code("ledger.account.read"), "Read accounts".to_string());
        store.add_role(role.clone());
        store.add_permission(read.clone());
        store.grant_role_permission(role.role_id, read.permission_id);
        store.assign_role(id, role.role_id);

        store.add_user_grant(grant(id, "ledger.account.update", GrantType::Grant, None));

        let effective = resolver.effective_permissions(id, Utc::now()).await.unwrap();
        assert!(effective.contains(&code("ledger.account.read")));
        assert!(effective.contains(&code("ledger.account.update")));
        assert_eq!(effective.len(), 2);
    }

    #[tokio::test]
    async fn test_deny_overrides_role_grant() {
        let (resolver, store, id) = setup().await;

        let role = Role::new("OPERATOR".to_string(), "Operator".to_string());
        let read = Permission::new(&code("ledger.account.read"), "Read accounts".to_string());
        store.add_role(role.clone());
        store.add_permission(read.clone());
        store.grant_role_permission(role.role_id, read.permission_id);
        store.assign_role(id, role.role_id);

        store.add_user_grant(grant(id, "ledger.account.read", GrantType::Deny, None));

        let effective = resolver.effective_permissions(id, Utc::now()).await.unwrap();
        assert!(!effective.contains(&code("ledger.account.read")));
    }

    #[tokio::test]
    async fn test_deny_overrides_direct_grant_same_code() {
        let (resolver, store, id) = setup().await;

        store.add_user_grant(grant(id, "ledger.account.read", GrantType::Grant, None));
        store.add_user_grant(grant(id, "ledger.account.read", GrantType::Deny, None));

        let effective = resolver.effective_permissions(id, Utc::now()).await.unwrap();
        assert!(effective.is_empty());
    }

    #[tokio::test]
    async fn test_expired_overrides_ignored() {
        let (resolver, store, id) = setup().await;
        let past = Some(Utc::now() - Duration::hours(1));

        store.add_user_grant(grant(id, "ledger.account.read", GrantType::Grant, past));

        let role = Role::new("OPERATOR".to_string(), "Operator".to_string());
        let update = Permission::new(&code("ledger.account.update"), "Update".to_string());
        store.add_role(role.clone());
        store.add_permission(update.clone());
        store.grant_role_permission(role.role_id, update.permission_id);
        store.assign_role(id, role.role_id);

        // Expired deny must not remove the role-derived permission
        store.add_user_grant(grant(id, "ledger.account.update", GrantType::Deny, past));

        let effective = resolver.effective_permissions(id, Utc::now()).await.unwrap();
        assert!(!effective.contains(&code("ledger.account.read")));
        assert!(effective.contains(&code("ledger.account.update")));
    }

    #[tokio::test]
    async fn test_malformed_stored_code_skipped() {
        let (resolver, store, id) = setup().await;

        let role = Role::new("OPERATOR".to_string(), "Operator".to_string());
        let mut bad = Permission::new(&code("ledger.account.read"), "Read".to_string());
        bad.code = "not a code".to_string();
        store.add_role(role.clone());
        store.add_permission(bad.clone());
        store.grant_role_permission(role.role_id, bad.permission_id);
        store.assign_role(id, role.role_id);

        let effective = resolver.effective_permissions(id, Utc::now()).await.unwrap();
        assert!(effective.is_empty());
    }

    #[tokio::test]
    async fn test_admin_role_sees_all_branches() {
        let (resolver, store, id) = setup().await;

        let role = Role::system(ADMIN_ROLE.to_string(), "Super Admin".to_string());
        store.add_role(role.clone());
        store.assign_role(id, role.role_id);

        let access = resolver.resolve(id, Utc::now()).await.unwrap();
        assert!(matches!(access.branch_scope, BranchScope::All));
        assert!(access.branch_scope.contains(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_non_admin_scoped_to_memberships() {
        let (resolver, store, id) = setup().await;

        let branch = Branch::new(
            "HQ".to_string(),
            "Head Office".to_string(),
            BranchLevel::HeadOffice,
            None,
        );
        store.add_branch(branch.clone());
        store.add_membership(id, branch.branch_id, "full", true);

        let access = resolver.resolve(id, Utc::now()).await.unwrap();
        match &access.branch_scope {
            BranchScope::Memberships { branches } => {
                assert_eq!(branches.len(), 1);
                assert_eq!(branches[0].branch_id, branch.branch_id);
            }
            other => panic!("expected membership scope, got {other:?}"),
        }
        assert!(!access.branch_scope.contains(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_authorize_reports_missing_codes() {
        let (resolver, store, id) = setup().await;

        store.add_user_grant(grant(id, "admin.identity.read", GrantType::Grant, None));

        let required = [code("admin.identity.read"), code("admin.identity.update")];
        match resolver.authorize(id, &required, Utc::now()).await {
            Err(AuthError::Forbidden { missing }) => {
                assert_eq!(missing, vec!["admin.identity.update".to_string()]);
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }

        store.add_user_grant(grant(id, "admin.identity.update", GrantType::Grant, None));
        assert!(resolver.authorize(id, &required, Utc::now()).await.is_ok());
    }
}
