use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{BranchScope, IdentityStatus, IdentitySummary};
use crate::services::AuthSession;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address or handle.
    #[validate(length(min = 1, max = 255))]
    pub login: String,

    #[validate(length(min = 1, max = 512))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 512))]
    pub current_password: String,

    #[validate(length(min = 8, max = 512))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIdentityRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    pub last_name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 3, max = 32))]
    pub handle: String,

    #[validate(length(min = 8, max = 512))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: IdentityStatus,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub login: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub identity: IdentitySummary,
    pub tokens: TokenResponse,
}

impl From<AuthSession> for LoginResponse {
    fn from(session: AuthSession) -> Self {
        LoginResponse {
            identity: session.identity.summary(),
            tokens: TokenResponse {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                token_type: "Bearer",
                expires_in: session.expires_in,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// The caller's resolved view of themselves.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub identity: IdentitySummary,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub branch_scope: BranchScope,
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_rejects_empty_fields() {
        let empty = LoginRequest {
            login: String::new(),
            password: "pw".to_string(),
        };
        assert!(empty.validate().is_err());

        let ok = LoginRequest {
            login: "alice".to_string(),
            password: "pw".to_string(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_create_identity_request_validation() {
        let bad_email = CreateIdentityRequest {
            first_name: "Alice".to_string(),
            last_name: "Okafor".to_string(),
            email: "not-an-email".to_string(),
            handle: "alice".to_string(),
            password: "longEnough1!".to_string(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = CreateIdentityRequest {
            email: "alice@x.com".to_string(),
            password: "short".to_string(),
            ..bad_email
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_set_status_parses_known_codes_only() {
        let ok: Result<SetStatusRequest, _> = serde_json::from_str(r#"{"status":"suspended"}"#);
        assert!(ok.is_ok());

        let bad: Result<SetStatusRequest, _> = serde_json::from_str(r#"{"status":"deleted"}"#);
        assert!(bad.is_err());
    }
}
