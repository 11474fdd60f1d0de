//! Persistence contracts consumed by the core.
//!
//! The core never depends on a storage technology; it talks to these traits.
//! [`memory::MemoryStore`] is the in-process reference backend used by the
//! test suites.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Device, EventFilter, EventPage, EventStatus, GeoLocation, Pagination, SecurityAction,
    SecurityEvent, Session,
};
use crate::models::User;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint (email, username, refresh token, device key) was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced row does not exist.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    /// The backend itself failed.
    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// User persistence.
///
/// `update_with` is the atomic read-modify-write primitive backing lockout
/// bookkeeping and backup-code consumption: the closure runs exactly once
/// against the current row, and no concurrent writer can interleave.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn update(&self, user: &User) -> Result<(), StoreError>;
    /// Atomically apply `apply` to the stored row. Returns the updated row
    /// and the closure's flag (its meaning is the caller's).
    async fn update_with(
        &self,
        id: Uuid,
        apply: &(dyn for<'a> Fn(&'a mut User) -> bool + Send + Sync),
    ) -> Result<(User, bool), StoreError>;
}

/// Session persistence. Rows are keyed uniquely by refresh token value and
/// retained after revocation for audit.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
    /// Excludes inactive sessions and sessions past their expiry.
    async fn find_active_by_refresh_token(&self, token: &str)
        -> Result<Option<Session>, StoreError>;
    /// Compare-and-swap token rotation: succeeds only if the session still
    /// carries `old_token`, replacing it with `new_token` and bumping
    /// last-activity. Returns false when the token was already rotated.
    async fn rotate(
        &self,
        session_id: Uuid,
        old_token: &str,
        new_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError>;
    /// Flip `is_active` off. Returns false if the session was absent.
    async fn deactivate(&self, session_id: Uuid) -> Result<bool, StoreError>;
    /// Deactivate all of a user's sessions, optionally keeping the one bound
    /// to `keep_refresh_token`. Returns the number deactivated.
    async fn deactivate_all(
        &self,
        user_id: Uuid,
        keep_refresh_token: Option<&str>,
    ) -> Result<u64, StoreError>;
    /// Deactivate active sessions whose device metadata matches `fingerprint`.
    async fn deactivate_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<u64, StoreError>;
}

/// Device persistence, keyed by `(user_id, fingerprint)`.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Insert or refresh a device row, preserving trust and creation time on
    /// refresh.
    async fn upsert(&self, device: &Device) -> Result<Device, StoreError>;
    async fn find(&self, user_id: Uuid, fingerprint: &str) -> Result<Option<Device>, StoreError>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Device>, StoreError>;
    async fn set_trusted(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        trusted: bool,
    ) -> Result<bool, StoreError>;
    async fn delete(&self, user_id: Uuid, fingerprint: &str) -> Result<bool, StoreError>;
    /// Delete all of a user's devices except `keep_fingerprint`. Returns the
    /// number deleted.
    async fn delete_all_except(
        &self,
        user_id: Uuid,
        keep_fingerprint: &str,
    ) -> Result<u64, StoreError>;
}

/// Append-only security event persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> Result<(), StoreError>;
    /// Filtered query, newest first, with the total matching count.
    async fn query(
        &self,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<EventPage, StoreError>;
    /// Count events for a user matching the optional action/status since a
    /// point in time.
    async fn count_since(
        &self,
        user_id: Uuid,
        action: Option<SecurityAction>,
        status: Option<EventStatus>,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
    /// The user's most recent successful events for an action, newest first.
    async fn recent_successes(
        &self,
        user_id: Uuid,
        action: SecurityAction,
        limit: u64,
    ) -> Result<Vec<SecurityEvent>, StoreError>;
    /// Attach a location to the most recent event recorded from `ip`.
    /// Returns false if no matching event exists (it may have been
    /// superseded); that is not an error.
    async fn attach_location(&self, ip: &str, location: GeoLocation) -> Result<bool, StoreError>;
}
