use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::LockoutConfig;
use crate::models::Identity;
use crate::services::AuthError;
use crate::store::{FailureOutcome, Store, StoreError};

/// Account lockout machine.
///
/// Locks are applied eagerly (the failure that reaches the threshold locks
/// the row in the same statement) and released lazily: an expired lock is
/// simply ignored at check time and the row is cleaned up on the next
/// successful login. No background job scans for expired locks.
#[derive(Clone)]
pub struct LockoutEngine {
    store: Arc<dyn Store + Send + Sync>,
    config: LockoutConfig,
}

impl LockoutEngine {
    pub fn new(store: Arc<dyn Store + Send + Sync>, config: LockoutConfig) -> Self {
        Self { store, config }
    }

    /// Gate an authentication attempt on account state. Password
    /// verification must not happen before this passes.
    pub fn check(&self, identity: &Identity, now: DateTime<Utc>) -> Result<(), AuthError> {
        if !identity.is_active() {
            return Err(AuthError::AccountNotActive);
        }

        if identity.is_locked {
            match identity.lock_until {
                Some(until) if until <= now => {
                    // Lock has expired; let the attempt through. Counters
                    // reset on the next successful login.
                }
                Some(until) => {
                    let secs = (until - now).num_seconds().max(0);
                    return Err(AuthError::AccountLocked {
                        retry_after_minutes: (secs + 59) / 60,
                    });
                }
                None => {
                    // Locked without an expiry (administrative lock)
                    return Err(AuthError::AccountLocked {
                        retry_after_minutes: self.config.lockout_minutes,
                    });
                }
            }
        }

        Ok(())
    }

    /// Record a failed password attempt. The store bumps the counter and
    /// applies the lock atomically when the threshold is reached.
    pub async fn on_failure(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, StoreError> {
        let lock_until = now + Duration::minutes(self.config.lockout_minutes);
        let outcome = self
            .store
            .record_login_failure(identity_id, self.config.max_failed_attempts, lock_until)
            .await?;

        if outcome.is_locked {
            tracing::warn!(
                identity_id = %identity_id,
                failed_attempts = outcome.failed_login_attempts,
                "Account locked after repeated failed logins"
            );
        }

        Ok(outcome)
    }

    /// Record a successful login: reset the counter, clear any lock and
    /// stamp `last_login`.
    pub async fn on_success(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.record_login_success(identity_id, now).await
    }

    /// Administrator unlock, independent of lock expiry.
    pub async fn admin_unlock(&self, identity_id: Uuid) -> Result<(), StoreError> {
        self.store.reset_lockout(identity_id).await?;
        tracing::info!(identity_id = %identity_id, "Account unlocked by administrator");
        Ok(())
    }

    pub fn max_failed_attempts(&self) -> i32 {
        self.config.max_failed_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentityStatus;
    use crate::store::{IdentityStore, MemoryStore};

    fn config() -> LockoutConfig {
        LockoutConfig {
            max_failed_attempts: 5,
            lockout_minutes: 30,
        }
    }

    fn engine() -> (LockoutEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (LockoutEngine::new(store.clone(), config()), store)
    }

    fn identity() -> Identity {
        Identity::new(
            "Alice".to_string(),
            "Okafor".to_string(),
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$fake".to_string(),
        )
    }

    #[test]
    fn test_active_unlocked_passes() {
        let (engine, _) = engine();
        assert!(engine.check(&identity(), Utc::now()).is_ok());
    }

    #[test]
    fn test_live_lock_denies_with_retry_hint() {
        let (engine, _) = engine();
        let mut id = identity();
        id.is_locked = true;
        id.lock_until = Some(Utc::now() + Duration::minutes(12));

        match engine.check(&id, Utc::now()) {
            Err(AuthError::AccountLocked {
                retry_after_minutes,
            }) => assert_eq!(retry_after_minutes, 12),
            other => panic!("expected AccountLocked, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_lock_passes() {
        let (engine, _) = engine();
        let mut id = identity();
        id.is_locked = true;
        id.failed_login_attempts = 5;
        id.lock_until = Some(Utc::now() - Duration::minutes(1));

        assert!(engine.check(&id, Utc::now()).is_ok());
    }

    #[test]
    fn test_inactive_denied_even_when_unlocked() {
        let (engine, _) = engine();
        let mut id = identity();
        id.status = IdentityStatus::Suspended.as_str().to_string();

        assert!(matches!(
            engine.check(&id, Utc::now()),
            Err(AuthError::AccountNotActive)
        ));
    }

    #[tokio::test]
    async fn test_fifth_failure_applies_lock() {
        let (engine, store) = engine();
        let id = identity();
        store.insert_identity(&id).await.unwrap();

        for n in 1..=4 {
            let outcome = engine.on_failure(id.identity_id, Utc::now()).await.unwrap();
            assert_eq!(outcome.failed_login_attempts, n);
            assert!(!outcome.is_locked);
        }

        let outcome = engine.on_failure(id.identity_id, Utc::now()).await.unwrap();
        assert_eq!(outcome.failed_login_attempts, 5);
        assert!(outcome.is_locked);
        assert!(outcome.lock_until.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_counters() {
        let (engine, store) = engine();
        let id = identity();
        store.insert_identity(&id).await.unwrap();

        for _ in 0..5 {
            engine.on_failure(id.identity_id, Utc::now()).await.unwrap();
        }

        engine.on_success(id.identity_id, Utc::now()).await.unwrap();

        let row = store.find_identity(id.identity_id).await.unwrap().unwrap();
        assert_eq!(row.failed_login_attempts, 0);
        assert!(!row.is_locked);
        assert!(row.lock_until.is_none());
        assert!(row.last_login.is_some());
    }
}
