//! Branch model - hierarchical organizational units scoping visibility.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Level of a branch in the organizational hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchLevel {
    HeadOffice,
    Regional,
    Local,
}

impl BranchLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchLevel::HeadOffice => "head_office",
            BranchLevel::Regional => "regional",
            BranchLevel::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "head_office" => Some(BranchLevel::HeadOffice),
            "regional" => Some(BranchLevel::Regional),
            "local" => Some(BranchLevel::Local),
            _ => None,
        }
    }
}

/// Per-branch access level. Surfaced to callers as a hint; row and field
/// level enforcement is the owning resource handler's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
    Limited,
    ReadOnly,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Full => "full",
            AccessLevel::Limited => "limited",
            AccessLevel::ReadOnly => "read_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(AccessLevel::Full),
            "limited" => Some(AccessLevel::Limited),
            "read_only" => Some(AccessLevel::ReadOnly),
            _ => None,
        }
    }
}

/// Branch entity (self-referencing hierarchy via `parent_id`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Branch {
    pub branch_id: Uuid,
    pub code: String,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub level: String,
    pub is_active: bool,
}

impl Branch {
    pub fn new(code: String, name: String, level: BranchLevel, parent_id: Option<Uuid>) -> Self {
        Self {
            branch_id: Uuid::new_v4(),
            code,
            name,
            parent_id,
            level: level.as_str().to_string(),
            is_active: true,
        }
    }
}

/// An identity's membership in a branch, joined with the branch code so it
/// can be embedded in token claims without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BranchMembership {
    pub branch_id: Uuid,
    pub branch_code: String,
    pub access_level: String,
    pub is_default: bool,
}

impl BranchMembership {
    pub fn access_level(&self) -> Option<AccessLevel> {
        AccessLevel::parse(&self.access_level)
    }
}

/// The branch axis of an identity's resolved access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum BranchScope {
    /// Holder of the designated administrative role sees every branch.
    All,
    /// Everyone else sees exactly their membership list.
    Memberships { branches: Vec<BranchMembership> },
}

impl BranchScope {
    pub fn contains(&self, branch_id: Uuid) -> bool {
        match self {
            BranchScope::All => true,
            BranchScope::Memberships { branches } => {
                branches.iter().any(|m| m.branch_id == branch_id)
            }
        }
    }
}
