//! Session model - refresh-token-bound login sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::device::{fingerprint, parse_user_agent, DeviceType};

/// Device metadata captured from the request that created or refreshed a
/// session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub ip: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: DeviceType,
}

impl DeviceInfo {
    /// Build device metadata from raw request attributes.
    pub fn from_request(user_agent: &str, ip: &str) -> Self {
        let parsed = parse_user_agent(user_agent);
        Self {
            user_agent: user_agent.to_string(),
            ip: ip.to_string(),
            browser: parsed.browser,
            os: parsed.os,
            device_type: parsed.device_type,
        }
    }

    /// Deterministic fingerprint of this device, see [`fingerprint`].
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.user_agent, &self.ip)
    }
}

/// Login session entity, keyed uniquely by its refresh token value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token: String,
    pub device: DeviceInfo,
    pub is_active: bool,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new active session expiring after `ttl`.
    pub fn new(user_id: Uuid, refresh_token: String, device: DeviceInfo, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            refresh_token,
            device,
            is_active: true,
            last_activity: now,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// True iff the session is active and not past its expiry. Expired
    /// sessions are logically inert even if not yet purged.
    pub fn is_live(&self) -> bool {
        self.is_active && self.expires_at > Utc::now()
    }
}
