//! Role model - named permission bundles assigned to identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity. `is_system` roles are built-ins: their code and name are
/// immutable and they cannot be deleted, but who holds them remains mutable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub code: String,
    pub name: String,
    pub is_system: bool,
    /// Display ordering only; carries no authorization weight.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create a new non-system role with default display priority.
    pub fn new(code: String, name: String) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            code,
            name,
            is_system: false,
            priority: 0,
            created_at: Utc::now(),
        }
    }

    /// Create a built-in role.
    pub fn system(code: String, name: String) -> Self {
        Self {
            is_system: true,
            ..Self::new(code, name)
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_role_flag() {
        let role = Role::system("SUPER_ADMIN".to_string(), "Super Administrator".to_string());
        assert!(role.is_system);
        assert_eq!(role.code, "SUPER_ADMIN");
        assert_eq!(role.priority, 0);
    }

    #[test]
    fn test_new_role_defaults_then_priority_override() {
        let role = Role::new("TELLER".to_string(), "Teller".to_string());
        assert!(!role.is_system);
        assert_eq!(role.priority, 0);

        let ranked = Role::new("MANAGER".to_string(), "Manager".to_string()).with_priority(10);
        assert_eq!(ranked.priority, 10);
    }
}
