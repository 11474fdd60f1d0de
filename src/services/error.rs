use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;
use crate::utils::PasswordStrength;

#[derive(Debug, Error)]
pub enum ServiceError {
    // Authentication failures: reported to the caller, never retried.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("Two-factor code required")]
    TwoFactorRequired,

    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("Two-factor authentication is not set up")]
    TwoFactorNotEnabled,

    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    // Token failures: the caller must re-authenticate.
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Session revoked")]
    SessionRevoked,

    // Policy violations: carry structured feedback where available.
    #[error("Password too weak")]
    WeakPassword(PasswordStrength),

    #[error("New password must differ from the current password")]
    SamePassword,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Email not verified")]
    EmailNotVerified,

    // Missing entities.
    #[error("User not found")]
    UserNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Device not found")]
    DeviceNotFound,

    // System failures: fatal to the operation.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
