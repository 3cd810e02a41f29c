use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AttemptReason, AuditLogEntry, AuditOutcome, BranchMembership, Identity, IdentityStatus,
    LoginAttempt, OriginMeta, RefreshToken,
};
use crate::services::{AuditRecorder, AuthError, LockoutEngine, PermissionResolver, TokenService};
use crate::store::Store;
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};

const MODULE_AUTH: &str = "AUTH";
const MODULE_ADMIN: &str = "ADMIN";

/// Orchestrates credential verification, lockout, token issuance and the
/// attempt ledger. Every authentication attempt leaves exactly one ledger
/// row; the ledger keeps the precise reason that the login response hides.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store + Send + Sync>,
    tokens: TokenService,
    lockout: LockoutEngine,
    resolver: PermissionResolver,
    audit: AuditRecorder,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub role_codes: Vec<String>,
    pub memberships: Vec<BranchMembership>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Result of a successful refresh. The refresh token itself is unchanged;
/// there is no rotation on refresh.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_in: i64,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store + Send + Sync>,
        tokens: TokenService,
        lockout: LockoutEngine,
        resolver: PermissionResolver,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            store,
            tokens,
            lockout,
            resolver,
            audit,
        }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Verify credentials and open a session.
    ///
    /// The caller-visible error is always `InvalidCredentials`-shaped; the
    /// precise reason lands in the ledger only.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
        origin: &OriginMeta,
    ) -> Result<AuthSession, AuthError> {
        let now = Utc::now();

        let identity = match self.store.find_identity_by_login(login).await? {
            Some(identity) => identity,
            None => {
                self.note_attempt(None, login, AttemptReason::UnknownIdentity, origin)
                    .await?;
                self.audit_login(None, AuditOutcome::Failure, "Unknown login", origin)
                    .await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if let Err(err) = self.lockout.check(&identity, now) {
            let reason = match &err {
                AuthError::AccountLocked { .. } => AttemptReason::AccountLocked,
                _ => AttemptReason::AccountNotActive,
            };
            self.note_attempt(Some(identity.identity_id), login, reason, origin)
                .await?;
            self.audit_login(
                Some(identity.identity_id),
                AuditOutcome::Failure,
                "Login blocked by account state",
                origin,
            )
            .await;
            return Err(err);
        }

        let presented = Password::new(password.to_string());
        let stored = PasswordHashString::new(identity.password_hash.clone());
        if verify_password(&presented, &stored).is_err() {
            let outcome = self.lockout.on_failure(identity.identity_id, now).await?;
            let reason = if outcome.is_locked
                && outcome.failed_login_attempts == self.lockout.max_failed_attempts()
            {
                AttemptReason::BadPasswordLockApplied
            } else {
                AttemptReason::BadPassword
            };
            self.note_attempt(Some(identity.identity_id), login, reason, origin)
                .await?;
            self.audit_login(
                Some(identity.identity_id),
                AuditOutcome::Failure,
                "Bad password",
                origin,
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.on_success(identity.identity_id, now).await?;

        let roles = self.store.roles_for(identity.identity_id).await?;
        let role_codes: Vec<String> = roles.iter().map(|r| r.code.clone()).collect();
        let memberships = self
            .store
            .branch_memberships_for(identity.identity_id)
            .await?;

        let access_token = self
            .tokens
            .issue_access_token(&identity, &role_codes, &memberships)?;

        let token_id = Uuid::new_v4();
        let refresh_token = self
            .tokens
            .issue_refresh_token(identity.identity_id, token_id)?;
        let record = RefreshToken::new(
            token_id,
            identity.identity_id,
            &refresh_token,
            self.tokens.refresh_token_expiry_days(),
            origin.ip_address.clone(),
            origin.user_agent.clone(),
        );
        self.store.insert_refresh_token(&record).await?;

        self.note_attempt(Some(identity.identity_id), login, AttemptReason::Ok, origin)
            .await?;
        self.audit_login(
            Some(identity.identity_id),
            AuditOutcome::Success,
            "Login succeeded",
            origin,
        )
        .await;

        tracing::info!(identity_id = %identity.identity_id, "Login succeeded");

        Ok(AuthSession {
            identity,
            role_codes,
            memberships,
            access_token,
            refresh_token,
            expires_in: self.tokens.access_token_expiry_seconds(),
        })
    }

    /// Exchange a live refresh token for a fresh access token.
    ///
    /// Roles and branches are re-read from storage, so access changes made
    /// since login take effect here. The refresh token is not rotated.
    pub async fn refresh_access(
        &self,
        refresh_token: &str,
        origin: &OriginMeta,
    ) -> Result<RefreshedAccess, AuthError> {
        let now = Utc::now();
        let claims = self.tokens.verify_refresh_token(refresh_token)?;

        let record = self
            .store
            .find_refresh_token(claims.token_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.identity_id != claims.identity_id
            || record.token_hash != RefreshToken::hash_token(refresh_token)
            || !record.is_valid(now)
        {
            self.audit_token(
                Some(claims.identity_id),
                "TOKEN_REFRESH",
                AuditOutcome::Failure,
                "Refresh rejected: token revoked, expired or mismatched",
                origin,
            )
            .await;
            return Err(AuthError::InvalidToken);
        }

        let identity = self
            .store
            .find_identity(claims.identity_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        // A suspended or locked owner cannot mint new access tokens. The
        // response stays token-shaped to avoid leaking account state.
        if self.lockout.check(&identity, now).is_err() {
            self.audit_token(
                Some(identity.identity_id),
                "TOKEN_REFRESH",
                AuditOutcome::Failure,
                "Refresh rejected: owner not in good standing",
                origin,
            )
            .await;
            return Err(AuthError::InvalidToken);
        }

        let roles = self.store.roles_for(identity.identity_id).await?;
        let role_codes: Vec<String> = roles.iter().map(|r| r.code.clone()).collect();
        let memberships = self
            .store
            .branch_memberships_for(identity.identity_id)
            .await?;

        let access_token = self
            .tokens
            .issue_access_token(&identity, &role_codes, &memberships)?;

        self.audit_token(
            Some(identity.identity_id),
            "TOKEN_REFRESH",
            AuditOutcome::Success,
            "Access token refreshed",
            origin,
        )
        .await;

        Ok(RefreshedAccess {
            access_token,
            expires_in: self.tokens.access_token_expiry_seconds(),
        })
    }

    /// Revoke one refresh token (logout). Idempotent: revoking an already
    /// dead or unknown token succeeds without effect.
    pub async fn revoke_session(
        &self,
        refresh_token: &str,
        origin: &OriginMeta,
    ) -> Result<(), AuthError> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;

        let record = match self.store.find_refresh_token(claims.token_id).await? {
            Some(record) if record.token_hash == RefreshToken::hash_token(refresh_token) => record,
            _ => return Ok(()),
        };

        let transitioned = self
            .store
            .revoke_refresh_token(record.token_id, claims.identity_id, Utc::now())
            .await?;

        if transitioned {
            self.audit_token(
                Some(claims.identity_id),
                "TOKEN_REVOKE",
                AuditOutcome::Success,
                "Session revoked",
                origin,
            )
            .await;
        }

        Ok(())
    }

    /// Revoke every live session an identity holds. Returns the count.
    pub async fn revoke_all_sessions(
        &self,
        identity_id: Uuid,
        revoked_by: Uuid,
        origin: &OriginMeta,
    ) -> Result<u64, AuthError> {
        let count = self
            .store
            .revoke_all_for_identity(identity_id, revoked_by, Utc::now())
            .await?;

        if count > 0 {
            self.audit
                .record(AuditLogEntry::new(
                    Some(revoked_by),
                    MODULE_AUTH,
                    "TOKEN_REVOKE_ALL",
                    "identity",
                    Some(identity_id.to_string()),
                    origin,
                    AuditOutcome::Success,
                    format!("Revoked {count} sessions"),
                ))
                .await;
        }

        Ok(count)
    }

    /// Change the caller's own password. All sessions are revoked so stolen
    /// refresh tokens die with the old password.
    pub async fn change_password(
        &self,
        identity_id: Uuid,
        current_password: &str,
        new_password: &str,
        origin: &OriginMeta,
    ) -> Result<(), AuthError> {
        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(AuthError::NotFound("identity"))?;

        let current = Password::new(current_password.to_string());
        let stored = PasswordHashString::new(identity.password_hash.clone());
        if verify_password(&current, &stored).is_err() {
            self.audit
                .record(AuditLogEntry::new(
                    Some(identity_id),
                    MODULE_AUTH,
                    "PASSWORD_CHANGE",
                    "identity",
                    Some(identity_id.to_string()),
                    origin,
                    AuditOutcome::Failure,
                    "Current password did not verify",
                ))
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = hash_password(&Password::new(new_password.to_string()))?;
        self.store
            .update_password_hash(identity_id, new_hash.as_str())
            .await?;

        self.store
            .revoke_all_for_identity(identity_id, identity_id, Utc::now())
            .await?;

        self.audit
            .record(AuditLogEntry::new(
                Some(identity_id),
                MODULE_AUTH,
                "PASSWORD_CHANGE",
                "identity",
                Some(identity_id.to_string()),
                origin,
                AuditOutcome::Success,
                "Password changed, all sessions revoked",
            ))
            .await;

        Ok(())
    }

    /// Administrator provisioning. There is no self-registration path.
    pub async fn create_identity(
        &self,
        actor_id: Uuid,
        first_name: String,
        last_name: String,
        email: String,
        handle: String,
        password: &str,
        origin: &OriginMeta,
    ) -> Result<Identity, AuthError> {
        let hash = hash_password(&Password::new(password.to_string()))?;
        let identity = Identity::new(first_name, last_name, email, handle, hash.into_string());

        self.store.insert_identity(&identity).await?;

        self.audit
            .record(
                AuditLogEntry::new(
                    Some(actor_id),
                    MODULE_ADMIN,
                    "IDENTITY_CREATE",
                    "identity",
                    Some(identity.identity_id.to_string()),
                    origin,
                    AuditOutcome::Success,
                    format!("Identity {} created", identity.handle),
                )
                .with_snapshots(None, serde_json::to_value(identity.summary()).ok()),
            )
            .await;

        Ok(identity)
    }

    /// Administrator status change, with before/after snapshots in the trail.
    pub async fn set_status(
        &self,
        actor_id: Uuid,
        identity_id: Uuid,
        status: IdentityStatus,
        origin: &OriginMeta,
    ) -> Result<Identity, AuthError> {
        let before = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(AuthError::NotFound("identity"))?;

        self.store
            .set_identity_status(identity_id, status.as_str())
            .await?;

        let after = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(AuthError::NotFound("identity"))?;

        self.audit
            .record(
                AuditLogEntry::new(
                    Some(actor_id),
                    MODULE_ADMIN,
                    "STATUS_CHANGE",
                    "identity",
                    Some(identity_id.to_string()),
                    origin,
                    AuditOutcome::Success,
                    format!("Status {} -> {}", before.status, status.as_str()),
                )
                .with_snapshots(
                    serde_json::to_value(before.summary()).ok(),
                    serde_json::to_value(after.summary()).ok(),
                ),
            )
            .await;

        Ok(after)
    }

    /// Administrator unlock, independent of lock expiry.
    pub async fn admin_unlock(
        &self,
        actor_id: Uuid,
        identity_id: Uuid,
        origin: &OriginMeta,
    ) -> Result<(), AuthError> {
        self.store
            .find_identity(identity_id)
            .await?
            .ok_or(AuthError::NotFound("identity"))?;

        self.lockout.admin_unlock(identity_id).await?;

        self.audit
            .record(AuditLogEntry::new(
                Some(actor_id),
                MODULE_ADMIN,
                "ACCOUNT_UNLOCK",
                "identity",
                Some(identity_id.to_string()),
                origin,
                AuditOutcome::Success,
                "Account unlocked by administrator",
            ))
            .await;

        Ok(())
    }

    /// Ledger range read for operator diagnosis.
    pub async fn login_history(
        &self,
        login: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, AuthError> {
        Ok(self.store.login_attempts(login, since, limit).await?)
    }

    async fn note_attempt(
        &self,
        identity_id: Option<Uuid>,
        login: &str,
        reason: AttemptReason,
        origin: &OriginMeta,
    ) -> Result<(), AuthError> {
        let attempt = LoginAttempt::new(identity_id, login.to_string(), reason, origin);
        self.store.insert_login_attempt(&attempt).await?;
        Ok(())
    }

    async fn audit_login(
        &self,
        actor_id: Option<Uuid>,
        outcome: AuditOutcome,
        description: &str,
        origin: &OriginMeta,
    ) {
        self.audit
            .record(AuditLogEntry::new(
                actor_id,
                MODULE_AUTH,
                "LOGIN",
                "identity",
                actor_id.map(|id| id.to_string()),
                origin,
                outcome,
                description,
            ))
            .await;
    }

    async fn audit_token(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        outcome: AuditOutcome,
        description: &str,
        origin: &OriginMeta,
    ) {
        self.audit
            .record(AuditLogEntry::new(
                actor_id,
                MODULE_AUTH,
                action,
                "refresh_token",
                actor_id.map(|id| id.to_string()),
                origin,
                outcome,
                description,
            ))
            .await;
    }
}
