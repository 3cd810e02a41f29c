//! Audit log entries - append-only trail of security-relevant operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::OriginMeta;

/// Outcome recorded with each entry. Failed operations are audited too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

/// Immutable audit entry. There is no update or delete path; the public
/// contract is append and filtered range reads only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    /// Null when the action had no authenticated actor (e.g. a failed login).
    pub actor_id: Option<Uuid>,
    pub module: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub before_value: Option<serde_json::Value>,
    pub after_value: Option<serde_json::Value>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub outcome: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        actor_id: Option<Uuid>,
        module: impl Into<String>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        origin: &OriginMeta,
        outcome: AuditOutcome,
        description: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            actor_id,
            module: module.into(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            before_value: None,
            after_value: None,
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
            outcome: outcome.as_str().to_string(),
            description: description.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Attach before/after snapshots of the mutated entity.
    pub fn with_snapshots(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before_value = before;
        self.after_value = after;
        self
    }
}

/// Filter for audit range queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub module: Option<String>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(actor_id) = self.actor_id {
            if entry.actor_id != Some(actor_id) {
                return false;
            }
        }
        if let Some(module) = &self.module {
            if &entry.module != module {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(entity_type) = &self.entity_type {
            if &entry.entity_type != entity_type {
                return false;
            }
        }
        if let Some(entity_id) = &self.entity_id {
            if entry.entity_id.as_deref() != Some(entity_id.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.recorded_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.recorded_at > to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(module: &str, action: &str, outcome: AuditOutcome) -> AuditLogEntry {
        AuditLogEntry::new(
            Some(Uuid::new_v4()),
            module,
            action,
            "identity",
            None,
            &OriginMeta::new("10.0.0.1", None),
            outcome,
            "test entry",
        )
    }

    #[test]
    fn test_filter_by_module_and_action() {
        let e = entry("auth", "LOGIN", AuditOutcome::Success);

        let mut filter = AuditFilter::default();
        assert!(filter.matches(&e));

        filter.module = Some("auth".to_string());
        filter.action = Some("LOGIN".to_string());
        assert!(filter.matches(&e));

        filter.action = Some("TOKEN_REVOKE".to_string());
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_filter_time_window() {
        let e = entry("auth", "LOGIN", AuditOutcome::Failure);
        let filter = AuditFilter {
            from: Some(e.recorded_at - chrono::Duration::minutes(1)),
            to: Some(e.recorded_at + chrono::Duration::minutes(1)),
            ..Default::default()
        };
        assert!(filter.matches(&e));

        let outside = AuditFilter {
            from: Some(e.recorded_at + chrono::Duration::minutes(1)),
            ..Default::default()
        };
        assert!(!outside.matches(&e));
    }

    #[test]
    fn test_snapshots_attached() {
        let e = entry("admin", "STATUS_CHANGE", AuditOutcome::Success).with_snapshots(
            Some(serde_json::json!({"status": "active"})),
            Some(serde_json::json!({"status": "suspended"})),
        );
        assert_eq!(e.before_value.unwrap()["status"], "active");
        assert_eq!(e.after_value.unwrap()["status"], "suspended");
    }
}
