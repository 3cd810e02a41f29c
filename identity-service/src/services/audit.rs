use std::sync::Arc;

use crate::models::{AuditFilter, AuditLogEntry};
use crate::services::AuthError;
use crate::store::Store;

/// Append-only audit trail.
///
/// Recording must never fail the operation being audited: append errors are
/// logged and swallowed. The trade-off is an audit gap under storage
/// trouble, which the error log makes visible.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn Store + Send + Sync>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Store + Send + Sync>) -> Self {
        Self { store }
    }

    /// Append an entry, swallowing storage failures.
    pub async fn record(&self, entry: AuditLogEntry) {
        if let Err(err) = self.store.append_audit(&entry).await {
            tracing::error!(
                error = %err,
                module = %entry.module,
                action = %entry.action,
                entity_type = %entry.entity_type,
                "Failed to append audit entry"
            );
        }
    }

    /// Read back the trail, newest first.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, AuthError> {
        Ok(self.store.query_audit(filter).await?)
    }
}
