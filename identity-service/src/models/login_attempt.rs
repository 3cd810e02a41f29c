//! Login attempt ledger - append-only record of every authentication attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::OriginMeta;

/// Machine-readable reason recorded per attempt. The precise reason never
/// reaches the login response; it exists for operator-side diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptReason {
    Ok,
    UnknownIdentity,
    AccountNotActive,
    AccountLocked,
    BadPassword,
    /// The failure that pushed the counter over the lockout threshold.
    BadPasswordLockApplied,
}

impl AttemptReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptReason::Ok => "ok",
            AttemptReason::UnknownIdentity => "unknown_identity",
            AttemptReason::AccountNotActive => "account_not_active",
            AttemptReason::AccountLocked => "account_locked",
            AttemptReason::BadPassword => "bad_password",
            AttemptReason::BadPasswordLockApplied => "bad_password_lock_applied",
        }
    }
}

/// One row per authentication attempt; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoginAttempt {
    pub attempt_id: Uuid,
    /// Null when the login string matched no identity.
    pub identity_id: Option<Uuid>,
    /// The email or handle the caller presented.
    pub login: String,
    pub is_successful: bool,
    pub reason: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn new(
        identity_id: Option<Uuid>,
        login: String,
        reason: AttemptReason,
        origin: &OriginMeta,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            identity_id,
            login,
            is_successful: reason == AttemptReason::Ok,
            reason: reason.as_str().to_string(),
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
            attempted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_flag_follows_reason() {
        let origin = OriginMeta::new("10.0.0.1", None);
        let ok = LoginAttempt::new(Some(Uuid::new_v4()), "alice".to_string(), AttemptReason::Ok, &origin);
        assert!(ok.is_successful);
        assert_eq!(ok.reason, "ok");

        let locked = LoginAttempt::new(
            Some(Uuid::new_v4()),
            "alice".to_string(),
            AttemptReason::AccountLocked,
            &origin,
        );
        assert!(!locked.is_successful);
        assert_eq!(locked.reason, "account_locked");
    }

    #[test]
    fn test_unknown_identity_has_no_id() {
        let origin = OriginMeta::unknown();
        let attempt = LoginAttempt::new(
            None,
            "ghost@x.com".to_string(),
            AttemptReason::UnknownIdentity,
            &origin,
        );
        assert!(attempt.identity_id.is_none());
        assert!(!attempt.is_successful);
    }
}
