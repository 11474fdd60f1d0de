//! Security event log: append-only audit trail with query, summary and
//! best-effort location enrichment.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    EventFilter, EventPage, EventStatus, Pagination, SecurityAction, SecurityEvent,
    SecuritySummary,
};
use crate::store::EventStore;

use super::location::{resolve_ip, LocationResolver};
use super::ServiceError;

/// Exclusive owner of security event creation.
#[derive(Clone)]
pub struct SecurityEventLog {
    store: Arc<dyn EventStore>,
    resolver: Arc<dyn LocationResolver>,
}

impl SecurityEventLog {
    pub fn new(store: Arc<dyn EventStore>, resolver: Arc<dyn LocationResolver>) -> Self {
        Self { store, resolver }
    }

    /// Append an event. A write failure never fails the caller's primary
    /// operation; it is logged and swallowed.
    pub async fn append(&self, event: SecurityEvent) {
        if let Err(e) = self.store.append(&event).await {
            tracing::error!(
                error = %e,
                action = event.action.as_str(),
                "Failed to write security event"
            );
        }
    }

    /// Append an event and kick off fire-and-forget location enrichment for
    /// its IP. The background task never blocks or fails the request path.
    pub async fn append_and_enrich(&self, event: SecurityEvent) {
        let ip = event.ip.clone();
        self.append(event).await;

        let store = self.store.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let Some(location) = resolve_ip(resolver.as_ref(), &ip).await else {
                return;
            };
            match store.attach_location(&ip, location).await {
                // The event may already have been superseded; nothing to do.
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, ip = %ip, "Location enrichment failed");
                }
            }
        });
    }

    pub async fn query(
        &self,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<EventPage, ServiceError> {
        Ok(self.store.query(filter, pagination).await?)
    }

    /// Per-user activity summary: totals, login outcomes, suspicious count
    /// over the last 30 days, and the 10 most recent events.
    pub async fn summarize(&self, user_id: Uuid) -> Result<SecuritySummary, ServiceError> {
        let epoch = chrono::DateTime::<Utc>::MIN_UTC;

        let page = self
            .store
            .query(
                &EventFilter {
                    user_id: Some(user_id),
                    ..Default::default()
                },
                Pagination {
                    offset: 0,
                    limit: 10,
                },
            )
            .await?;

        let successful_logins = self
            .store
            .count_since(
                user_id,
                Some(SecurityAction::Login),
                Some(EventStatus::Success),
                epoch,
            )
            .await?;
        let failed_logins = self
            .store
            .count_since(
                user_id,
                Some(SecurityAction::Login),
                Some(EventStatus::Failure),
                epoch,
            )
            .await?;
        let suspicious_last_30_days = self
            .store
            .count_since(
                user_id,
                Some(SecurityAction::SuspiciousActivity),
                None,
                Utc::now() - Duration::days(30),
            )
            .await?;

        Ok(SecuritySummary {
            total_events: page.total,
            successful_logins,
            failed_logins,
            suspicious_last_30_days,
            recent_events: page.events,
        })
    }

    /// Count of a user's events matching action/status since a point in time.
    /// History accessor for risk scoring.
    pub async fn count_since(
        &self,
        user_id: Uuid,
        action: Option<SecurityAction>,
        status: Option<EventStatus>,
        since: chrono::DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        Ok(self.store.count_since(user_id, action, status, since).await?)
    }

    /// The user's most recent successful events for an action, newest first.
    pub async fn recent_successes(
        &self,
        user_id: Uuid,
        action: SecurityAction,
        limit: u64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        Ok(self.store.recent_successes(user_id, action, limit).await?)
    }
}
