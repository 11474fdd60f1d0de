//! Two-factor verification: time-based codes and single-use backup codes.

use std::sync::Arc;

use rand::RngCore;
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::config::SecurityPolicy;
use crate::models::User;
use crate::store::UserStore;

use super::ServiceError;

/// Material handed to the user at enrollment start.
#[derive(Debug, Clone)]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

/// Outcome of a second-factor check at login.
#[derive(Debug, Clone, Copy)]
pub struct TwoFactorOutcome {
    pub accepted: bool,
    pub via_backup_code: bool,
}

/// Per-user state machine: disabled -> pending (secret stored, enabled still
/// false) -> enabled; enabled -> disabled only via the explicit disable path.
#[derive(Clone)]
pub struct TwoFactorService {
    users: Arc<dyn UserStore>,
    policy: SecurityPolicy,
}

impl TwoFactorService {
    pub fn new(users: Arc<dyn UserStore>, policy: SecurityPolicy) -> Self {
        Self { users, policy }
    }

    fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP, ServiceError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid TOTP secret: {}", e)))?;
        TOTP::new(
            Algorithm::SHA1, // RFC 6238 default
            6,
            self.policy.totp_skew,
            30,
            secret_bytes,
            Some(self.policy.totp_issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init: {}", e)))
    }

    fn check_code(&self, secret_base32: &str, account: &str, code: &str) -> Result<bool, ServiceError> {
        let totp = self.totp(secret_base32, account)?;
        totp.check_current(code)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP clock error: {}", e)))
    }

    fn generate_backup_codes(&self) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..self.policy.backup_code_count)
            .map(|_| {
                let mut bytes = [0u8; 4];
                rng.fill_bytes(&mut bytes);
                hex::encode(bytes).to_uppercase()
            })
            .collect()
    }

    /// Generate a fresh secret and backup codes and store them without
    /// flipping the enabled flag. Overwrites any prior pending secret.
    /// An enabled account must be disabled first; replacing its active
    /// secret here would silently break the user's authenticator.
    pub async fn begin_enrollment(&self, user: &User) -> Result<TwoFactorEnrollment, ServiceError> {
        if user.two_factor_enabled {
            return Err(ServiceError::TwoFactorAlreadyEnabled);
        }

        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();
        let totp = self.totp(&secret_base32, &user.email)?;
        let provisioning_uri = totp.get_url();
        let backup_codes = self.generate_backup_codes();

        let stored_secret = secret_base32.clone();
        let stored_codes = backup_codes.clone();
        self.users
            .update_with(user.id, &move |user| {
                user.two_factor_secret = Some(stored_secret.clone());
                user.backup_codes = Some(stored_codes.clone());
                false
            })
            .await?;

        tracing::info!(user_id = %user.id, "Two-factor enrollment started");

        Ok(TwoFactorEnrollment {
            secret: secret_base32,
            provisioning_uri,
            backup_codes,
        })
    }

    /// Validate a time-based code against the pending secret; on success the
    /// enabled flag flips on.
    pub async fn confirm_enrollment(&self, user: &User, code: &str) -> Result<bool, ServiceError> {
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or(ServiceError::TwoFactorNotEnabled)?;

        if !self.check_code(secret, &user.email, code)? {
            return Ok(false);
        }

        self.users
            .update_with(user.id, &|user| {
                user.two_factor_enabled = true;
                false
            })
            .await?;

        tracing::info!(user_id = %user.id, "Two-factor authentication enabled");
        Ok(true)
    }

    /// Second-factor check at login: time-based code first, then the backup
    /// code set. A matching backup code is consumed in the same atomic
    /// operation that accepts it. Fails closed.
    pub async fn verify_at_login(
        &self,
        user: &User,
        code: &str,
    ) -> Result<TwoFactorOutcome, ServiceError> {
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or(ServiceError::TwoFactorNotEnabled)?;

        if self.check_code(secret, &user.email, code)? {
            return Ok(TwoFactorOutcome {
                accepted: true,
                via_backup_code: false,
            });
        }

        let candidate = code.trim().to_uppercase();
        let (_, consumed) = self
            .users
            .update_with(user.id, &move |user| {
                let Some(codes) = user.backup_codes.as_mut() else {
                    return false;
                };
                let position = codes.iter().position(|stored| {
                    stored.len() == candidate.len()
                        && stored.as_bytes().ct_eq(candidate.as_bytes()).into()
                });
                match position {
                    Some(index) => {
                        codes.remove(index);
                        true
                    }
                    None => false,
                }
            })
            .await?;

        if consumed {
            tracing::info!(user_id = %user.id, "Backup code consumed at login");
        }

        Ok(TwoFactorOutcome {
            accepted: consumed,
            via_backup_code: consumed,
        })
    }

    /// Clear the secret and backup codes and flip enabled off.
    pub async fn disable(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.users
            .update_with(user_id, &|user| {
                user.two_factor_enabled = false;
                user.two_factor_secret = None;
                user.backup_codes = None;
                false
            })
            .await?;
        tracing::info!(user_id = %user_id, "Two-factor authentication disabled");
        Ok(())
    }

    /// Replace the entire backup-code set. Password re-verification is the
    /// caller's responsibility.
    pub async fn regenerate_backup_codes(&self, user: &User) -> Result<Vec<String>, ServiceError> {
        if !user.two_factor_enabled {
            return Err(ServiceError::TwoFactorNotEnabled);
        }
        let codes = self.generate_backup_codes();
        let stored = codes.clone();
        self.users
            .update_with(user.id, &move |user| {
                user.backup_codes = Some(stored.clone());
                false
            })
            .await?;
        Ok(codes)
    }
}
