//! Device model - known devices recognized by fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Coarse device classification derived from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Unknown => "unknown",
        }
    }
}

/// Known device entity, keyed by `(user_id, fingerprint)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub user_id: Uuid,
    pub fingerprint: String,
    pub name: String,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub last_ip: String,
    /// Flips only via the explicit trust operation; new devices start untrusted.
    pub trusted: bool,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Deterministic one-way device id derived from `(user agent, IP)`.
///
/// Repeated logins from the same device reuse the same id. Collisions across
/// users are acceptable: the id is always scoped by user id.
pub fn fingerprint(user_agent: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Parsed user agent attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUserAgent {
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: DeviceType,
}

/// Best-effort user agent parsing, enough to name and classify a device.
pub fn parse_user_agent(user_agent: &str) -> ParsedUserAgent {
    let ua = user_agent;

    let browser = if ua.contains("Edg/") || ua.contains("Edge/") {
        Some("Edge")
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Firefox/") {
        Some("Firefox")
    } else if ua.contains("Chrome/") {
        Some("Chrome")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else {
        None
    };

    let os = if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        Some("iOS")
    } else if ua.contains("Mac OS") || ua.contains("Macintosh") {
        Some("macOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    };

    let device_type = if ua.contains("iPad") || ua.contains("Tablet") {
        DeviceType::Tablet
    } else if ua.contains("Mobile") || ua.contains("Android") || ua.contains("iPhone") {
        DeviceType::Mobile
    } else if browser.is_some() || os.is_some() {
        DeviceType::Desktop
    } else {
        DeviceType::Unknown
    };

    ParsedUserAgent {
        browser: browser.map(str::to_string),
        os: os.map(str::to_string),
        device_type,
    }
}

impl Device {
    /// Create a new untrusted device record for a user.
    pub fn new(user_id: Uuid, user_agent: &str, ip: &str) -> Self {
        let parsed = parse_user_agent(user_agent);
        let name = match (&parsed.browser, &parsed.os) {
            (Some(browser), Some(os)) => format!("{} on {}", browser, os),
            (Some(browser), None) => browser.clone(),
            (None, Some(os)) => os.clone(),
            (None, None) => "Unknown device".to_string(),
        };
        let now = Utc::now();
        Self {
            user_id,
            fingerprint: fingerprint(user_agent, ip),
            name,
            device_type: parsed.device_type,
            browser: parsed.browser,
            os: parsed.os,
            last_ip: ip.to_string(),
            trusted: false,
            last_used_at: now,
            created_at: now,
        }
    }
}
