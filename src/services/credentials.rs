//! Credential store: password verification, progressive lockout, password
//! replacement.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::SecurityPolicy;
use crate::models::User;
use crate::store::UserStore;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

use super::ServiceError;

/// Outcome of recording a failed login attempt.
#[derive(Debug, Clone, Copy)]
pub struct FailureRecord {
    pub failed_attempts: i32,
    /// True only on the attempt that transitioned the account into lockout.
    pub newly_locked: bool,
}

/// Owns all password/lockout mutation on the user record.
#[derive(Clone)]
pub struct CredentialService {
    users: Arc<dyn UserStore>,
    policy: SecurityPolicy,
}

impl CredentialService {
    pub fn new(users: Arc<dyn UserStore>, policy: SecurityPolicy) -> Self {
        Self { users, policy }
    }

    /// Constant-time password check. Only errors when the stored hash is
    /// missing or malformed, never on a plain mismatch.
    pub fn verify_password(&self, user: &User, candidate: &str) -> Result<bool, ServiceError> {
        verify_password(
            &Password::new(candidate.to_string()),
            &PasswordHashString::new(user.password_hash.clone()),
        )
        .map_err(ServiceError::Internal)
    }

    /// True iff the lockout timestamp is set and in the future.
    pub fn is_locked(&self, user: &User) -> bool {
        user.is_locked()
    }

    /// Record a failed login attempt as one atomic read-modify-write.
    ///
    /// An expired lock resets the counter to 1 and clears both lock fields
    /// before counting this attempt; otherwise the counter increments, and
    /// reaching the threshold on an unlocked account sets the lock.
    pub async fn record_failure(&self, user_id: Uuid) -> Result<FailureRecord, ServiceError> {
        let threshold = self.policy.max_login_attempts as i32;
        let lockout = Duration::minutes(self.policy.lockout_minutes);

        let (updated, newly_locked) = self
            .users
            .update_with(user_id, &move |user| {
                let now = Utc::now();
                match user.locked_until {
                    Some(until) if until <= now => {
                        // Lock has expired: this attempt starts a fresh count.
                        user.failed_attempts = 1;
                        user.locked_until = None;
                    }
                    _ => {
                        user.failed_attempts += 1;
                    }
                }
                if user.failed_attempts >= threshold && user.locked_until.is_none() {
                    user.locked_until = Some(Utc::now() + lockout);
                    return true;
                }
                false
            })
            .await?;

        if newly_locked {
            tracing::warn!(
                user_id = %user_id,
                failed_attempts = updated.failed_attempts,
                "Account locked after repeated failed logins"
            );
        }

        Ok(FailureRecord {
            failed_attempts: updated.failed_attempts,
            newly_locked,
        })
    }

    /// Atomically zero the failure counter and clear the lock. Called on
    /// successful login and on password reset.
    pub async fn reset_failures(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.users
            .update_with(user_id, &|user| {
                user.failed_attempts = 0;
                user.locked_until = None;
                false
            })
            .await?;
        Ok(())
    }

    /// Replace the stored password hash.
    ///
    /// Rejects with [`ServiceError::SamePassword`] when the candidate matches
    /// the current hash; strength policy is the orchestration layer's gate.
    pub async fn set_password(&self, user: &User, new_plaintext: &str) -> Result<(), ServiceError> {
        if self.verify_password(user, new_plaintext)? {
            return Err(ServiceError::SamePassword);
        }

        let new_hash = hash_password(
            &Password::new(new_plaintext.to_string()),
            &self.policy.hashing,
        )
        .map_err(ServiceError::Internal)?;

        self.users
            .update_with(user.id, &move |user| {
                user.password_hash = new_hash.as_str().to_string();
                false
            })
            .await?;

        tracing::info!(user_id = %user.id, "Password updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::utils::HashingConfig;

    fn policy() -> SecurityPolicy {
        SecurityPolicy {
            max_login_attempts: 5,
            lockout_minutes: 30,
            totp_skew: 2,
            totp_issuer: "test".into(),
            backup_code_count: 10,
            login_risk_threshold: 50,
            password_change_risk_threshold: 40,
            session_ttl_days: 7,
            hashing: HashingConfig {
                // Cheap parameters keep the unit tests fast.
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        }
    }

    async fn seeded(password: &str) -> (CredentialService, User, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let policy = policy();
        let hash = hash_password(&Password::new(password.into()), &policy.hashing).unwrap();
        let user = User::new("lock@example.com".into(), hash.into_string(), None);
        UserStore::insert(store.as_ref(), &user).await.unwrap();
        let service = CredentialService::new(store.clone(), policy);
        (service, user, store)
    }

    #[tokio::test]
    async fn five_failures_lock_the_account() {
        let (service, user, store) = seeded("correct horse").await;

        for i in 1..=4 {
            let record = service.record_failure(user.id).await.unwrap();
            assert_eq!(record.failed_attempts, i);
            assert!(!record.newly_locked);
        }
        let record = service.record_failure(user.id).await.unwrap();
        assert_eq!(record.failed_attempts, 5);
        assert!(record.newly_locked);

        let locked = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(locked.is_locked());

        // Further failures while locked do not re-lock.
        let record = service.record_failure(user.id).await.unwrap();
        assert!(!record.newly_locked);
    }

    #[tokio::test]
    async fn expired_lock_resets_the_counter() {
        let (service, user, store) = seeded("correct horse").await;

        store
            .update_with(user.id, &|u| {
                u.failed_attempts = 5;
                u.locked_until = Some(Utc::now() - Duration::minutes(1));
                false
            })
            .await
            .unwrap();

        let record = service.record_failure(user.id).await.unwrap();
        assert_eq!(record.failed_attempts, 1);
        assert!(!record.newly_locked);
        let fresh = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(fresh.locked_until.is_none());
    }

    #[tokio::test]
    async fn reset_clears_both_lock_fields() {
        let (service, user, store) = seeded("correct horse").await;
        for _ in 0..5 {
            service.record_failure(user.id).await.unwrap();
        }

        service.reset_failures(user.id).await.unwrap();
        let fresh = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fresh.failed_attempts, 0);
        assert!(fresh.locked_until.is_none());
    }

    #[tokio::test]
    async fn concurrent_failures_lose_no_increments() {
        let (service, user, store) = seeded("correct horse").await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(
                async move { service.record_failure(user.id).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let fresh = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fresh.failed_attempts, 4);
    }

    #[tokio::test]
    async fn same_password_is_rejected() {
        let (service, user, _store) = seeded("correct horse").await;
        let err = service.set_password(&user, "correct horse").await.unwrap_err();
        assert!(matches!(err, ServiceError::SamePassword));
    }

    #[tokio::test]
    async fn set_password_replaces_hash() {
        let (service, user, store) = seeded("correct horse").await;
        service.set_password(&user, "battery staple!").await.unwrap();

        let fresh = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(fresh.password_hash, user.password_hash);
        assert!(service.verify_password(&fresh, "battery staple!").unwrap());
        assert!(!service.verify_password(&fresh, "correct horse").unwrap());
    }

    #[tokio::test]
    async fn wrong_password_is_false_not_error() {
        let (service, user, _store) = seeded("correct horse").await;
        assert!(!service.verify_password(&user, "nope").unwrap());
    }
}
