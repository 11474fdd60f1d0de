//! User model - account identity, credentials and security state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
    Moderator,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Moderator => "moderator",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            "moderator" => Ok(UserRole::Moderator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User entity.
///
/// Lockout state is the pair (`failed_attempts`, `locked_until`); "locked"
/// is always derived via [`User::is_locked`], never stored separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercase; lookups are case-insensitive.
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    /// Base32-encoded TOTP secret. Present while enrollment is pending or enabled.
    pub two_factor_secret: Option<String>,
    /// Single-use recovery codes. Each entry is removed when consumed.
    pub backup_codes: Option<Vec<String>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new unverified user.
    pub fn new(email: String, password_hash: String, username: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            username,
            password_hash,
            first_name: None,
            last_name: None,
            role: UserRole::User,
            email_verified: false,
            email_verification_token: None,
            email_verification_expires: None,
            password_reset_token: None,
            password_reset_expires: None,
            failed_attempts: 0,
            locked_until: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            backup_codes: None,
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True iff a lockout timestamp is set and still in the future.
    pub fn is_locked(&self) -> bool {
        self.locked_until.map_or(false, |until| until > Utc::now())
    }

    /// Display name for notifications: first name, else username, else the
    /// local part of the email address.
    pub fn display_name(&self) -> &str {
        if let Some(first) = self.first_name.as_deref() {
            return first;
        }
        if let Some(username) = self.username.as_deref() {
            return username;
        }
        self.email.split('@').next().unwrap_or(&self.email)
    }

    /// Convert to sanitized response (no credential or token fields).
    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
            email_verified: self.email_verified,
            two_factor_enabled: self.two_factor_enabled,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }
}

/// User view safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_user_is_not_locked() {
        let user = User::new("Alice@Example.com".into(), "hash".into(), None);
        assert!(!user.is_locked());
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.failed_attempts, 0);
    }

    #[test]
    fn locked_until_future_means_locked() {
        let mut user = User::new("a@b.c".into(), "hash".into(), None);
        user.locked_until = Some(Utc::now() + Duration::minutes(10));
        assert!(user.is_locked());

        user.locked_until = Some(Utc::now() - Duration::minutes(10));
        assert!(!user.is_locked());
    }

    #[test]
    fn display_name_falls_back() {
        let mut user = User::new("carol@example.com".into(), "hash".into(), None);
        assert_eq!(user.display_name(), "carol");

        user.username = Some("cee".into());
        assert_eq!(user.display_name(), "cee");

        user.first_name = Some("Carol".into());
        assert_eq!(user.display_name(), "Carol");
    }
}
