//! Security event model - append-only audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of security-relevant actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    Login,
    Logout,
    Register,
    PasswordChange,
    PasswordReset,
    EmailVerification,
    #[serde(rename = "2fa_enabled")]
    TwoFactorEnabled,
    #[serde(rename = "2fa_disabled")]
    TwoFactorDisabled,
    #[serde(rename = "2fa_verified")]
    TwoFactorVerified,
    SessionCreated,
    SessionRevoked,
    SuspiciousActivity,
    AccountLocked,
    ProfileUpdate,
}

impl SecurityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityAction::Login => "login",
            SecurityAction::Logout => "logout",
            SecurityAction::Register => "register",
            SecurityAction::PasswordChange => "password_change",
            SecurityAction::PasswordReset => "password_reset",
            SecurityAction::EmailVerification => "email_verification",
            SecurityAction::TwoFactorEnabled => "2fa_enabled",
            SecurityAction::TwoFactorDisabled => "2fa_disabled",
            SecurityAction::TwoFactorVerified => "2fa_verified",
            SecurityAction::SessionCreated => "session_created",
            SecurityAction::SessionRevoked => "session_revoked",
            SecurityAction::SuspiciousActivity => "suspicious_activity",
            SecurityAction::AccountLocked => "account_locked",
            SecurityAction::ProfileUpdate => "profile_update",
        }
    }
}

/// Event outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failure,
    Warning,
}

/// Resolved location attached to an event after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

impl GeoLocation {
    /// Fixed marker for private/loopback addresses.
    pub fn local() -> Self {
        Self {
            country: Some("Local".to_string()),
            city: Some("Local".to_string()),
            latitude: None,
            longitude: None,
            timezone: None,
        }
    }
}

/// Append-only security event. Never mutated after creation except for
/// best-effort location enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// Set for pre-authentication events where no user id is known.
    pub email: Option<String>,
    pub action: SecurityAction,
    pub status: EventStatus,
    pub ip: String,
    pub user_agent: String,
    pub location: Option<GeoLocation>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        user_id: Option<Uuid>,
        action: SecurityAction,
        status: EventStatus,
        ip: &str,
        user_agent: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            email: None,
            action,
            status,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            location: None,
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_lowercase());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Filter for event queries. All fields are conjunctive; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<SecurityAction>,
    pub status: Option<EventStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Pagination parameters for event queries.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of events, newest first, plus the total matching count.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub events: Vec<SecurityEvent>,
    pub total: u64,
}

/// Per-user security activity summary.
#[derive(Debug, Clone, Serialize)]
pub struct SecuritySummary {
    pub total_events: u64,
    pub successful_logins: u64,
    pub failed_logins: u64,
    pub suspicious_last_30_days: u64,
    pub recent_events: Vec<SecurityEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_vocabulary() {
        assert_eq!(SecurityAction::TwoFactorEnabled.as_str(), "2fa_enabled");
        assert_eq!(
            SecurityAction::SuspiciousActivity.as_str(),
            "suspicious_activity"
        );
        assert_eq!(SecurityAction::PasswordChange.as_str(), "password_change");
    }

    #[test]
    fn actions_serialize_to_the_same_names() {
        for action in [
            SecurityAction::Login,
            SecurityAction::TwoFactorEnabled,
            SecurityAction::SuspiciousActivity,
        ] {
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                serde_json::Value::String(action.as_str().to_string())
            );
        }
    }

    #[test]
    fn builder_normalizes_email() {
        let event = SecurityEvent::new(
            None,
            SecurityAction::Login,
            EventStatus::Failure,
            "203.0.113.7",
            "curl/8.4.0",
        )
        .with_email("Someone@Example.COM");
        assert_eq!(event.email.as_deref(), Some("someone@example.com"));
        assert!(event.user_id.is_none());
    }

    #[test]
    fn local_marker_has_no_coordinates() {
        let local = GeoLocation::local();
        assert_eq!(local.country.as_deref(), Some("Local"));
        assert!(local.latitude.is_none());
    }
}
