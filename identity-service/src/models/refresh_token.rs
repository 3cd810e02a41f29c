//! Refresh token records - one identity may hold many concurrent sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted refresh token. Only the SHA-256 digest of the signed token is
/// stored; the raw token exists solely on the client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    /// Token id (the `jti` claim of the signed token).
    pub token_id: Uuid,
    pub identity_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Create a new record for a freshly signed token.
    pub fn new(
        token_id: Uuid,
        identity_id: Uuid,
        token: &str,
        expires_in_days: i64,
        ip_address: String,
        user_agent: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            token_id,
            identity_id,
            token_hash: Self::hash_token(token),
            expires_at: now + Duration::days(expires_in_days),
            is_revoked: false,
            revoked_at: None,
            revoked_by: None,
            ip_address,
            user_agent,
            created_at: now,
        }
    }

    /// Hash a token using SHA-256.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// A revoked token is never valid again, regardless of `expires_at`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(days: i64) -> RefreshToken {
        RefreshToken::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "signed.jwt.value",
            days,
            "10.0.0.1".to_string(),
            Some("cli/1.0".to_string()),
        )
    }

    #[test]
    fn test_stores_digest_not_token() {
        let t = token(7);
        assert_ne!(t.token_hash, "signed.jwt.value");
        assert_eq!(t.token_hash, RefreshToken::hash_token("signed.jwt.value"));
        assert!(t.is_valid(Utc::now()));
    }

    #[test]
    fn test_expiry() {
        let mut t = token(7);
        let now = Utc::now();
        assert!(!t.is_expired(now));

        t.expires_at = now - Duration::seconds(1);
        assert!(t.is_expired(now));
        assert!(!t.is_valid(now));
    }

    #[test]
    fn test_revocation_beats_expiry() {
        let mut t = token(7);
        let now = Utc::now();
        assert!(t.is_valid(now));

        t.is_revoked = true;
        t.revoked_at = Some(now);
        // Still inside its expiry window, but dead for good
        assert!(!t.is_expired(now));
        assert!(!t.is_valid(now));
    }
}
