//! Identity model - administrator-provisioned accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity lifecycle status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Suspended,
    Terminated,
    Inactive,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Suspended => "suspended",
            IdentityStatus::Terminated => "terminated",
            IdentityStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(IdentityStatus::Active),
            "suspended" => Some(IdentityStatus::Suspended),
            "terminated" => Some(IdentityStatus::Terminated),
            "inactive" => Some(IdentityStatus::Inactive),
            _ => None,
        }
    }
}

/// Identity entity. Accounts are created by administrators only;
/// there is no self-registration path.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub handle: String,
    pub password_hash: String,
    pub status: String,
    pub is_locked: bool,
    pub lock_until: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub last_login: Option<DateTime<Utc>>,
    pub default_branch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new active identity.
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        handle: String,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            identity_id: Uuid::new_v4(),
            first_name,
            last_name,
            email,
            handle,
            password_hash,
            status: IdentityStatus::Active.as_str().to_string(),
            is_locked: false,
            lock_until: None,
            failed_login_attempts: 0,
            last_login: None,
            default_branch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> Option<IdentityStatus> {
        IdentityStatus::parse(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active.as_str()
    }

    /// Convert to sanitized summary (no credential material).
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            identity_id: self.identity_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            handle: self.handle.clone(),
            status: self.status.clone(),
            last_login: self.last_login,
            default_branch_id: self.default_branch_id,
        }
    }
}

/// Identity summary for API responses (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub identity_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub handle: String,
    pub status: String,
    pub last_login: Option<DateTime<Utc>>,
    pub default_branch_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_defaults() {
        let identity = Identity::new(
            "Alice".to_string(),
            "Okafor".to_string(),
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$fake".to_string(),
        );

        assert!(identity.is_active());
        assert!(!identity.is_locked);
        assert_eq!(identity.failed_login_attempts, 0);
        assert!(identity.lock_until.is_none());
        assert!(identity.last_login.is_none());
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            IdentityStatus::Active,
            IdentityStatus::Suspended,
            IdentityStatus::Terminated,
            IdentityStatus::Inactive,
        ] {
            assert_eq!(IdentityStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(IdentityStatus::parse("deleted"), None);
    }

    #[test]
    fn test_summary_has_no_credentials() {
        let identity = Identity::new(
            "Alice".to_string(),
            "Okafor".to_string(),
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$fake".to_string(),
        );
        let summary = identity.summary();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}
