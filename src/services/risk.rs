//! Risk engine: additive anomaly scoring of logins and password changes
//! against the user's security event history.

use std::collections::HashSet;

use chrono::{Duration, Timelike, Utc};

use crate::config::SecurityPolicy;
use crate::models::{
    EventStatus, GeoLocation, SecurityAction, SecurityEvent, User,
};

use super::events::SecurityEventLog;
use super::ServiceError;

/// Scoring outcome. Scores are additive and deliberately uncapped; anything
/// above the threshold is suspicious, higher just means more so.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub score: u32,
    pub suspicious: bool,
    pub reasons: Vec<String>,
}

const LOGIN_HISTORY_DEPTH: u64 = 10;

#[derive(Clone)]
pub struct RiskEngine {
    events: SecurityEventLog,
    policy: SecurityPolicy,
}

impl RiskEngine {
    pub fn new(events: SecurityEventLog, policy: SecurityPolicy) -> Self {
        Self { events, policy }
    }

    /// Score a login attempt. On a suspicious outcome a
    /// `suspicious_activity` warning event carrying the joined reasons is
    /// appended; dispatching the user-facing alert is the orchestrator's job.
    pub async fn assess_login(
        &self,
        user: &User,
        ip: &str,
        user_agent: &str,
        location: Option<&GeoLocation>,
    ) -> Result<RiskAssessment, ServiceError> {
        let mut score: u32 = 0;
        let mut reasons = Vec::new();
        let now = Utc::now();

        let recent_failures = self
            .events
            .count_since(
                user.id,
                Some(SecurityAction::Login),
                Some(EventStatus::Failure),
                now - Duration::minutes(15),
            )
            .await?;
        if recent_failures >= 3 {
            score += 30;
            reasons.push("multiple failed attempts".to_string());
        }

        let history = self
            .events
            .recent_successes(user.id, SecurityAction::Login, LOGIN_HISTORY_DEPTH)
            .await?;

        if !history.is_empty() {
            let known_ips: HashSet<&str> = history.iter().map(|e| e.ip.as_str()).collect();
            if !known_ips.contains(ip) {
                score += 25;
                reasons.push("new IP".to_string());
            }

            let known_agents: HashSet<&str> =
                history.iter().map(|e| e.user_agent.as_str()).collect();
            if !known_agents.contains(user_agent) {
                score += 20;
                reasons.push("new device/browser".to_string());
            }
        }

        if let Some(country) = location.and_then(|l| l.country.as_deref()) {
            let known_countries: HashSet<&str> = history
                .iter()
                .filter_map(|e| e.location.as_ref())
                .filter_map(|l| l.country.as_deref())
                .collect();
            if !known_countries.is_empty() && !known_countries.contains(country) {
                score += 30;
                reasons.push("new country".to_string());
            }
        }

        if history.len() > 5 {
            let mean_hour = history
                .iter()
                .map(|e| e.created_at.hour() as f64)
                .sum::<f64>()
                / history.len() as f64;
            if (mean_hour - now.hour() as f64).abs() > 6.0 {
                score += 15;
                reasons.push("unusual hour".to_string());
            }
        }

        // Set until cleared by a successful login, so it covers both an
        // active lock and one that recently expired.
        if user.locked_until.is_some() {
            score += 20;
            reasons.push("recent lockout".to_string());
        }

        let suspicious = score >= self.policy.login_risk_threshold;
        if suspicious {
            self.flag(user, ip, user_agent, score, &reasons).await;
        }

        Ok(RiskAssessment {
            score,
            suspicious,
            reasons,
        })
    }

    /// Score a password change with its own lower-weight policy.
    pub async fn assess_password_change(
        &self,
        user: &User,
        ip: &str,
        user_agent: &str,
    ) -> Result<RiskAssessment, ServiceError> {
        let mut score: u32 = 0;
        let mut reasons = Vec::new();
        let now = Utc::now();
        let window = now - Duration::days(7);

        let mut known_ips: HashSet<String> = HashSet::new();
        for action in [SecurityAction::Login, SecurityAction::PasswordChange] {
            for event in self
                .events
                .recent_successes(user.id, action, 50)
                .await?
            {
                if event.created_at >= window {
                    known_ips.insert(event.ip.clone());
                }
            }
        }
        if !known_ips.is_empty() && !known_ips.contains(ip) {
            score += 40;
            reasons.push("new IP".to_string());
        }

        let recent_changes = self
            .events
            .count_since(
                user.id,
                Some(SecurityAction::PasswordChange),
                Some(EventStatus::Success),
                now - Duration::hours(24),
            )
            .await?;
        // The change being assessed counts as one, so any prior success in
        // the window makes it more than one inside 24 hours.
        if recent_changes >= 1 {
            score += 30;
            reasons.push("frequent password changes".to_string());
        }

        let suspicious = score >= self.policy.password_change_risk_threshold;
        if suspicious {
            self.flag(user, ip, user_agent, score, &reasons).await;
        }

        Ok(RiskAssessment {
            score,
            suspicious,
            reasons,
        })
    }

    async fn flag(&self, user: &User, ip: &str, user_agent: &str, score: u32, reasons: &[String]) {
        tracing::warn!(
            user_id = %user.id,
            score,
            reasons = %reasons.join(", "),
            "Suspicious activity detected"
        );
        self.events
            .append(
                SecurityEvent::new(
                    Some(user.id),
                    SecurityAction::SuspiciousActivity,
                    EventStatus::Warning,
                    ip,
                    user_agent,
                )
                .with_detail(format!("score {}: {}", score, reasons.join(", "))),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::location::NullResolver;
    use crate::store::{EventStore, MemoryStore};
    use crate::utils::HashingConfig;
    use std::sync::Arc;

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
            hashing: HashingConfig::default(),
        }
    }

    fn engine(store: Arc<MemoryStore>) -> RiskEngine {
        let log = SecurityEventLog::new(store, Arc::new(NullResolver));
        RiskEngine::new(log, policy())
    }

    fn user() -> User {
        User::new("risk@example.com".into(), "hash".into(), None)
    }

    async fn seed(
        store: &MemoryStore,
        user: &User,
        action: SecurityAction,
        status: EventStatus,
        ip: &str,
        agent: &str,
        age: Duration,
    ) {
        let mut event = SecurityEvent::new(Some(user.id), action, status, ip, agent);
        event.created_at = Utc::now() - age;
        store.append(&event).await.unwrap();
    }

    #[tokio::test]
    async fn clean_first_login_scores_zero() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store);
        let user = user();

        let assessment = engine
            .assess_login(&user, "203.0.113.7", "agent", None)
            .await
            .unwrap();
        assert_eq!(assessment.score, 0);
        assert!(!assessment.suspicious);
        assert!(assessment.reasons.is_empty());
    }

    #[tokio::test]
    async fn failed_burst_plus_new_ip_is_suspicious() {
        let store = Arc::new(MemoryStore::new());
        let user = user();
        for _ in 0..3 {
            seed(
                &store,
                &user,
                SecurityAction::Login,
                EventStatus::Failure,
                "203.0.113.7",
                "agent",
                Duration::minutes(5),
            )
            .await;
        }
        // Success history from a different IP, same agent.
        seed(
            &store,
            &user,
            SecurityAction::Login,
            EventStatus::Success,
            "198.51.100.1",
            "agent",
            Duration::hours(1),
        )
        .await;

        let engine = engine(store.clone());
        let assessment = engine
            .assess_login(&user, "203.0.113.99", "agent", None)
            .await
            .unwrap();

        // +30 failed burst, +25 new IP.
        assert!(assessment.score >= 55);
        assert!(assessment.suspicious);
        assert!(assessment.reasons.contains(&"multiple failed attempts".to_string()));
        assert!(assessment.reasons.contains(&"new IP".to_string()));

        // A suspicious_activity warning event was appended.
        let count = store
            .count_since(
                user.id,
                Some(SecurityAction::SuspiciousActivity),
                Some(EventStatus::Warning),
                Utc::now() - Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn known_ip_and_agent_add_nothing() {
        let store = Arc::new(MemoryStore::new());
        let user = user();
        seed(
            &store,
            &user,
            SecurityAction::Login,
            EventStatus::Success,
            "203.0.113.7",
            "agent",
            Duration::hours(2),
        )
        .await;

        let engine = engine(store);
        let assessment = engine
            .assess_login(&user, "203.0.113.7", "agent", None)
            .await
            .unwrap();
        assert_eq!(assessment.score, 0);
    }

    #[tokio::test]
    async fn empty_history_skips_novelty_checks() {
        let store = Arc::new(MemoryStore::new());
        let user = user();
        // Only failures on record: no success history, so no new-IP reason.
        for _ in 0..3 {
            seed(
                &store,
                &user,
                SecurityAction::Login,
                EventStatus::Failure,
                "203.0.113.7",
                "agent",
                Duration::minutes(2),
            )
            .await;
        }

        let engine = engine(store);
        let assessment = engine
            .assess_login(&user, "203.0.113.7", "agent", None)
            .await
            .unwrap();
        assert_eq!(assessment.score, 30);
        assert!(!assessment.suspicious);
    }

    #[tokio::test]
    async fn lockout_residue_adds_twenty() {
        let store = Arc::new(MemoryStore::new());
        let mut user = user();
        user.locked_until = Some(Utc::now() - Duration::minutes(5));

        let engine = engine(store);
        let assessment = engine
            .assess_login(&user, "203.0.113.7", "agent", None)
            .await
            .unwrap();
        assert_eq!(assessment.score, 20);
        assert!(assessment.reasons.contains(&"recent lockout".to_string()));
    }

    #[tokio::test]
    async fn new_country_scores_thirty() {
        let store = Arc::new(MemoryStore::new());
        let user = user();
        let mut event = SecurityEvent::new(
            Some(user.id),
            SecurityAction::Login,
            EventStatus::Success,
            "198.51.100.1",
            "agent",
        );
        event.location = Some(GeoLocation {
            country: Some("Iceland".into()),
            city: None,
            latitude: None,
            longitude: None,
            timezone: None,
        });
        store.append(&event).await.unwrap();

        let here = GeoLocation {
            country: Some("Norway".into()),
            city: None,
            latitude: None,
            longitude: None,
            timezone: None,
        };
        let engine = engine(store);
        let assessment = engine
            .assess_login(&user, "198.51.100.1", "agent", Some(&here))
            .await
            .unwrap();
        assert_eq!(assessment.score, 30);
        assert!(assessment.reasons.contains(&"new country".to_string()));
    }

    #[tokio::test]
    async fn password_change_from_unseen_ip_is_suspicious() {
        let store = Arc::new(MemoryStore::new());
        let user = user();
        seed(
            &store,
            &user,
            SecurityAction::Login,
            EventStatus::Success,
            "203.0.113.7",
            "agent",
            Duration::days(1),
        )
        .await;

        let engine = engine(store);
        let assessment = engine
            .assess_password_change(&user, "198.51.100.200", "agent")
            .await
            .unwrap();
        assert_eq!(assessment.score, 40);
        assert!(assessment.suspicious);
    }

    #[tokio::test]
    async fn second_password_change_within_a_day_adds_thirty() {
        let store = Arc::new(MemoryStore::new());
        let user = user();
        seed(
            &store,
            &user,
            SecurityAction::PasswordChange,
            EventStatus::Success,
            "203.0.113.7",
            "agent",
            Duration::hours(3),
        )
        .await;

        let engine = engine(store.clone());
        let assessment = engine
            .assess_password_change(&user, "203.0.113.7", "agent")
            .await
            .unwrap();
        // Known IP, but one prior change inside 24h plus this one.
        assert_eq!(assessment.score, 30);
        assert!(!assessment.suspicious);
        assert!(assessment
            .reasons
            .contains(&"frequent password changes".to_string()));

        // A change outside the window does not trip the signal.
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            &user,
            SecurityAction::PasswordChange,
            EventStatus::Success,
            "203.0.113.7",
            "agent",
            Duration::hours(30),
        )
        .await;
        let engine = self::engine(store);
        let assessment = engine
            .assess_password_change(&user, "203.0.113.7", "agent")
            .await
            .unwrap();
        assert_eq!(assessment.score, 0);
    }
}
