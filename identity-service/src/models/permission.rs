//! Permission model - typed capability codes plus per-user overrides.
//!
//! Permission codes are structured as `module.resource.action` with a closed
//! action set. Free-form strings are rejected at the parse boundary so that
//! malformed codes never flow into authorization decisions.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The closed set of actions a permission can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    Execute,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::Create => "create",
            PermissionAction::Read => "read",
            PermissionAction::Update => "update",
            PermissionAction::Delete => "delete",
            PermissionAction::Execute => "execute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(PermissionAction::Create),
            "read" => Some(PermissionAction::Read),
            "update" => Some(PermissionAction::Update),
            "delete" => Some(PermissionAction::Delete),
            "execute" => Some(PermissionAction::Execute),
            _ => None,
        }
    }
}

/// Error returned when a permission code string does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPermissionCode(pub String);

impl fmt::Display for InvalidPermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid permission code: {}", self.0)
    }
}

impl std::error::Error for InvalidPermissionCode {}

/// A structured permission code: `module.resource.action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionCode {
    pub module: String,
    pub resource: String,
    pub action: PermissionAction,
}

impl PermissionCode {
    pub fn new(
        module: impl Into<String>,
        resource: impl Into<String>,
        action: PermissionAction,
    ) -> Self {
        Self {
            module: module.into(),
            resource: resource.into(),
            action,
        }
    }

    /// Parse a canonical `module.resource.action` string.
    pub fn parse(s: &str) -> Result<Self, InvalidPermissionCode> {
        let mut parts = s.split('.');
        let (module, resource, action) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(m), Some(r), Some(a), None) => (m, r, a),
            _ => return Err(InvalidPermissionCode(s.to_string())),
        };

        if module.is_empty() || resource.is_empty() {
            return Err(InvalidPermissionCode(s.to_string()));
        }

        let action = PermissionAction::parse(action).ok_or_else(|| {
            InvalidPermissionCode(s.to_string())
        })?;

        Ok(Self::new(module, resource, action))
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.module, self.resource, self.action.as_str())
    }
}

impl FromStr for PermissionCode {
    type Err = InvalidPermissionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PermissionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PermissionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

/// Permission entity as persisted. The `code` column holds the canonical
/// string form; rows with codes that no longer parse are skipped (and
/// logged) at resolution time rather than failing the request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub code: String,
    pub name: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(code: &PermissionCode, name: String) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            code: code.to_string(),
            name,
            is_system: false,
            created_at: Utc::now(),
        }
    }
}

/// Whether a direct user override adds or removes a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    Grant,
    Deny,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Grant => "grant",
            GrantType::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grant" => Some(GrantType::Grant),
            "deny" => Some(GrantType::Deny),
            _ => None,
        }
    }
}

/// Direct identity-to-permission override. Exists so exceptions do not
/// require one-off roles; denies take precedence over role-derived grants.
#[derive(Debug, Clone, FromRow)]
pub struct UserPermissionGrant {
    pub identity_id: Uuid,
    pub permission_code: String,
    pub grant_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserPermissionGrant {
    pub fn new(
        identity_id: Uuid,
        code: &PermissionCode,
        grant_type: GrantType,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identity_id,
            permission_code: code.to_string(),
            grant_type: grant_type.as_str().to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn grant_type(&self) -> Option<GrantType> {
        GrantType::parse(&self.grant_type)
    }

    /// Expired overrides are excluded at evaluation time, not purged.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_valid_code() {
        let code = PermissionCode::parse("admin.identity.create").unwrap();
        assert_eq!(code.module, "admin");
        assert_eq!(code.resource, "identity");
        assert_eq!(code.action, PermissionAction::Create);
        assert_eq!(code.to_string(), "admin.identity.create");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(PermissionCode::parse("").is_err());
        assert!(PermissionCode::parse("admin.identity").is_err());
        assert!(PermissionCode::parse("admin.identity.frobnicate").is_err());
        assert!(PermissionCode::parse("admin.identity.create.extra").is_err());
        assert!(PermissionCode::parse(".identity.read").is_err());
        assert!(PermissionCode::parse("admin..read").is_err());
    }

    #[test]
    fn test_code_serde_as_string() {
        let code = PermissionCode::parse("ledger.account.update").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"ledger.account.update\"");

        let back: PermissionCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);

        let bad: Result<PermissionCode, _> = serde_json::from_str("\"not-a-code\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_grant_effectiveness_window() {
        let now = Utc::now();
        let code = PermissionCode::parse("ledger.account.read").unwrap();

        let open_ended =
            UserPermissionGrant::new(Uuid::new_v4(), &code, GrantType::Grant, None);
        assert!(open_ended.is_effective(now));

        let expired = UserPermissionGrant::new(
            Uuid::new_v4(),
            &code,
            GrantType::Deny,
            Some(now - Duration::hours(1)),
        );
        assert!(!expired.is_effective(now));

        let future = UserPermissionGrant::new(
            Uuid::new_v4(),
            &code,
            GrantType::Deny,
            Some(now + Duration::hours(1)),
        );
        assert!(future.is_effective(now));
    }
}
