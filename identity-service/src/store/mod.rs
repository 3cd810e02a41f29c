//! Persistence seams.
//!
//! The service talks to storage through these traits so the HTTP stack and
//! the domain services can be exercised against the in-memory
//! implementation in tests, while production runs on Postgres.

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditLogEntry, BranchMembership, Identity, LoginAttempt, Permission,
    RefreshToken, Role, UserPermissionGrant,
};

/// Storage failures. The core never retries; callers see these as a
/// transient-infrastructure condition.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Result of the atomic failure-counter bump on an identity row.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct FailureOutcome {
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub lock_until: Option<DateTime<Utc>>,
}

/// Identity rows: lookup plus the single-row read-modify-write operations
/// the lockout machine depends on. Failure recording must be atomic so two
/// concurrent failed attempts cannot under-count toward the threshold.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_identity_by_login(&self, login: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Increment the failure counter and, when it reaches `threshold`,
    /// apply the lock in the same statement. Returns the post-update state.
    async fn record_login_failure(
        &self,
        identity_id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<FailureOutcome, StoreError>;

    /// Reset the counter, clear any lock and stamp `last_login`.
    async fn record_login_success(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Administrator unlock: force `Unlocked(failures = 0)`.
    async fn reset_lockout(&self, identity_id: Uuid) -> Result<(), StoreError>;

    async fn set_identity_status(
        &self,
        identity_id: Uuid,
        status: &str,
    ) -> Result<(), StoreError>;

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError>;
}

/// Role, permission and branch association lookups.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn roles_for(&self, identity_id: Uuid) -> Result<Vec<Role>, StoreError>;

    /// Union of permissions across all of the identity's roles.
    async fn role_permissions_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError>;

    async fn grants_for(&self, identity_id: Uuid)
        -> Result<Vec<UserPermissionGrant>, StoreError>;

    async fn branch_memberships_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<BranchMembership>, StoreError>;
}

/// Refresh token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token(
        &self,
        token_id: Uuid,
    ) -> Result<Option<RefreshToken>, StoreError>;

    /// Mark revoked; returns false when the token was already revoked or
    /// does not exist (revocation is idempotent).
    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        revoked_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Revoke every live token an identity holds. Returns the count.
    async fn revoke_all_for_identity(
        &self,
        identity_id: Uuid,
        revoked_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Append-only login attempt ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), StoreError>;

    async fn login_attempts(
        &self,
        login: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, StoreError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// The full persistence surface consumed by the service.
pub trait Store:
    IdentityStore + AccessStore + TokenStore + LedgerStore + AuditStore
{
}

impl<T> Store for T where T: IdentityStore + AccessStore + TokenStore + LedgerStore + AuditStore {}
