//! Postgres implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditLogEntry, BranchMembership, Identity, LoginAttempt, Permission,
    RefreshToken, Role, UserPermissionGrant,
};

use super::{
    AccessStore, AuditStore, FailureOutcome, IdentityStore, LedgerStore, StoreError, TokenStore,
};

const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Store backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_identity_by_login(&self, login: &str) -> Result<Option<Identity>, StoreError> {
        let identity = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE email = $1 OR handle = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError> {
        let identity =
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(identity)
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO identities
               (identity_id, first_name, last_name, email, handle, password_hash,
                status, is_locked, lock_until, failed_login_attempts, last_login,
                default_branch_id, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(identity.identity_id)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(&identity.handle)
        .bind(&identity.password_hash)
        .bind(&identity.status)
        .bind(identity.is_locked)
        .bind(identity.lock_until)
        .bind(identity.failed_login_attempts)
        .bind(identity.last_login)
        .bind(identity.default_branch_id)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        identity_id: Uuid,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<FailureOutcome, StoreError> {
        // Counter bump and lock transition in one statement so concurrent
        // failures cannot under-count toward the threshold.
        let outcome = sqlx::query_as::<_, FailureOutcome>(
            r#"UPDATE identities
               SET failed_login_attempts = failed_login_attempts + 1,
                   is_locked = CASE WHEN failed_login_attempts + 1 >= $2
                                    THEN TRUE ELSE is_locked END,
                   lock_until = CASE WHEN failed_login_attempts + 1 >= $2
                                     THEN $3 ELSE lock_until END,
                   updated_at = NOW()
               WHERE identity_id = $1
               RETURNING failed_login_attempts, is_locked, lock_until"#,
        )
        .bind(identity_id)
        .bind(threshold)
        .bind(lock_until)
        .fetch_one(&self.pool)
        .await?;
        Ok(outcome)
    }

    async fn record_login_success(
        &self,
        identity_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE identities
               SET failed_login_attempts = 0,
                   is_locked = FALSE,
                   lock_until = NULL,
                   last_login = $2,
                   updated_at = NOW()
               WHERE identity_id = $1"#,
        )
        .bind(identity_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_lockout(&self, identity_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE identities
               SET failed_login_attempts = 0,
                   is_locked = FALSE,
                   lock_until = NULL,
                   updated_at = NOW()
               WHERE identity_id = $1"#,
        )
        .bind(identity_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_identity_status(
        &self,
        identity_id: Uuid,
        status: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE identities SET status = $2, updated_at = NOW() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE identities SET password_hash = $2, updated_at = NOW() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn roles_for(&self, identity_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"SELECT r.role_id, r.code, r.name, r.is_system, r.priority, r.created_at
               FROM roles r
               JOIN identity_roles ir ON ir.role_id = r.role_id
               WHERE ir.identity_id = $1
               ORDER BY r.priority"#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn role_permissions_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"SELECT DISTINCT p.permission_id, p.code, p.name, p.is_system, p.created_at
               FROM permissions p
               JOIN role_permissions rp ON rp.permission_id = p.permission_id
               JOIN identity_roles ir ON ir.role_id = rp.role_id
               WHERE ir.identity_id = $1"#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn grants_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<UserPermissionGrant>, StoreError> {
        let grants = sqlx::query_as::<_, UserPermissionGrant>(
            r#"SELECT identity_id, permission_code, grant_type, expires_at, created_at
               FROM user_permissions
               WHERE identity_id = $1"#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn branch_memberships_for(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<BranchMembership>, StoreError> {
        let memberships = sqlx::query_as::<_, BranchMembership>(
            r#"SELECT b.branch_id, b.code AS branch_code, ib.access_level, ib.is_default
               FROM identity_branches ib
               JOIN branches b ON b.branch_id = ib.branch_id
               WHERE ib.identity_id = $1 AND b.is_active"#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO refresh_tokens
               (token_id, identity_id, token_hash, expires_at, is_revoked,
                revoked_at, revoked_by, ip_address, user_agent, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(token.token_id)
        .bind(token.identity_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.is_revoked)
        .bind(token.revoked_at)
        .bind(token.revoked_by)
        .bind(&token.ip_address)
        .bind(&token.user_agent)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_id: Uuid,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn revoke_refresh_token(
        &self,
        token_id: Uuid,
        revoked_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE refresh_tokens
               SET is_revoked = TRUE, revoked_at = $2, revoked_by = $3
               WHERE token_id = $1 AND is_revoked = FALSE"#,
        )
        .bind(token_id)
        .bind(at)
        .bind(revoked_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_identity(
        &self,
        identity_id: Uuid,
        revoked_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"UPDATE refresh_tokens
               SET is_revoked = TRUE, revoked_at = $2, revoked_by = $3
               WHERE identity_id = $1 AND is_revoked = FALSE"#,
        )
        .bind(identity_id)
        .bind(at)
        .bind(revoked_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO login_attempts
               (attempt_id, identity_id, login, is_successful, reason,
                ip_address, user_agent, attempted_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(attempt.attempt_id)
        .bind(attempt.identity_id)
        .bind(&attempt.login)
        .bind(attempt.is_successful)
        .bind(&attempt.reason)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn login_attempts(
        &self,
        login: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, StoreError> {
        let mut builder =
            QueryBuilder::new("SELECT * FROM login_attempts WHERE TRUE");
        if let Some(login) = login {
            builder.push(" AND login = ").push_bind(login);
        }
        if let Some(since) = since {
            builder.push(" AND attempted_at >= ").push_bind(since);
        }
        builder
            .push(" ORDER BY attempted_at DESC LIMIT ")
            .push_bind(limit.clamp(1, 1000));

        let attempts = builder
            .build_query_as::<LoginAttempt>()
            .fetch_all(&self.pool)
            .await?;
        Ok(attempts)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO audit_log
               (entry_id, actor_id, module, action, entity_type, entity_id,
                before_value, after_value, ip_address, user_agent, outcome,
                description, recorded_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
        )
        .bind(entry.entry_id)
        .bind(entry.actor_id)
        .bind(&entry.module)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.before_value)
        .bind(&entry.after_value)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.outcome)
        .bind(&entry.description)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT * FROM audit_log WHERE TRUE");
        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
        if let Some(module) = &filter.module {
            builder.push(" AND module = ").push_bind(module);
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ").push_bind(action);
        }
        if let Some(entity_type) = &filter.entity_type {
            builder.push(" AND entity_type = ").push_bind(entity_type);
        }
        if let Some(entity_id) = &filter.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id);
        }
        if let Some(from) = filter.from {
            builder.push(" AND recorded_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND recorded_at <= ").push_bind(to);
        }
        builder
            .push(" ORDER BY recorded_at DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT).clamp(1, 1000));

        let entries = builder
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }
}
