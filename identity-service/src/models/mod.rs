pub mod audit_log;
pub mod branch;
pub mod identity;
pub mod login_attempt;
pub mod permission;
pub mod refresh_token;
pub mod role;

pub use audit_log::{AuditFilter, AuditLogEntry, AuditOutcome};
pub use branch::{AccessLevel, Branch, BranchLevel, BranchMembership, BranchScope};
pub use identity::{Identity, IdentityStatus, IdentitySummary};
pub use login_attempt::{AttemptReason, LoginAttempt};
pub use permission::{GrantType, Permission, PermissionAction, PermissionCode, UserPermissionGrant};
pub use refresh_token::RefreshToken;
pub use role::Role;

use serde::{Deserialize, Serialize};

/// Network origin of a request, carried into the ledger and audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginMeta {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl OriginMeta {
    pub fn new(ip_address: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent,
        }
    }

    pub fn unknown() -> Self {
        Self {
            ip_address: "unknown".to_string(),
            user_agent: None,
        }
    }
}
