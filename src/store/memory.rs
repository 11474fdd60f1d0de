//! In-process reference backend for the store contracts.
//!
//! Backs every trait with a `tokio::sync::RwLock` map; all read-modify-write
//! operations hold the write lock across the whole mutation, which satisfies
//! the atomicity requirements the contracts state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Device, EventFilter, EventPage, EventStatus, GeoLocation, Pagination, SecurityAction,
    SecurityEvent, Session, User,
};

use super::{DeviceStore, EventStore, SessionStore, StoreError, UserStore};

/// In-memory implementation of all four store contracts.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    devices: RwLock<HashMap<(Uuid, String), Device>>,
    events: RwLock<Vec<SecurityEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        if let Some(username) = &user.username {
            if users.values().any(|u| u.username.as_ref() == Some(username)) {
                return Err(StoreError::Conflict(format!(
                    "username already taken: {}",
                    username
                )));
            }
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email_verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.password_reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                stored.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::NotFound("user")),
        }
    }

    async fn update_with(
        &self,
        id: Uuid,
        apply: &(dyn for<'a> Fn(&'a mut User) -> bool + Send + Sync),
    ) -> Result<(User, bool), StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) => {
                let flag = apply(user);
                user.updated_at = Utc::now();
                Ok((user.clone(), flag))
            }
            None => Err(StoreError::NotFound("user")),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions
            .values()
            .any(|s| s.refresh_token == session.refresh_token)
        {
            return Err(StoreError::Conflict("refresh token already in use".into()));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn find_active_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.refresh_token == token && s.is_live())
            .cloned())
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        old_token: &str,
        new_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) if session.refresh_token == old_token && session.is_live() => {
                session.refresh_token = new_token.to_string();
                session.last_activity = now;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound("session")),
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) => {
                session.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_all(
        &self,
        user_id: Uuid,
        keep_refresh_token: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id
                && session.is_active
                && keep_refresh_token != Some(session.refresh_token.as_str())
            {
                session.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn deactivate_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id
                && session.is_active
                && session.device.fingerprint() == fingerprint
            {
                session.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn upsert(&self, device: &Device) -> Result<Device, StoreError> {
        let mut devices = self.devices.write().await;
        let key = (device.user_id, device.fingerprint.clone());
        let stored = devices
            .entry(key)
            .and_modify(|existing| {
                existing.last_ip = device.last_ip.clone();
                existing.last_used_at = device.last_used_at;
                existing.browser = device.browser.clone();
                existing.os = device.os.clone();
                existing.device_type = device.device_type;
            })
            .or_insert_with(|| device.clone());
        Ok(stored.clone())
    }

    async fn find(&self, user_id: Uuid, fingerprint: &str) -> Result<Option<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .get(&(user_id, fingerprint.to_string()))
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Device>, StoreError> {
        let mut devices: Vec<Device> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(devices)
    }

    async fn set_trusted(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        trusted: bool,
    ) -> Result<bool, StoreError> {
        let mut devices = self.devices.write().await;
        match devices.get_mut(&(user_id, fingerprint.to_string())) {
            Some(device) => {
                device.trusted = trusted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, user_id: Uuid, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self
            .devices
            .write()
            .await
            .remove(&(user_id, fingerprint.to_string()))
            .is_some())
    }

    async fn delete_all_except(
        &self,
        user_id: Uuid,
        keep_fingerprint: &str,
    ) -> Result<u64, StoreError> {
        let mut devices = self.devices.write().await;
        let before = devices.len();
        devices.retain(|(owner, fingerprint), _| {
            *owner != user_id || fingerprint == keep_fingerprint
        });
        Ok((before - devices.len()) as u64)
    }
}

fn matches(event: &SecurityEvent, filter: &EventFilter) -> bool {
    if let Some(user_id) = filter.user_id {
        if event.user_id != Some(user_id) {
            return false;
        }
    }
    if let Some(action) = filter.action {
        if event.action != action {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if event.status != status {
            return false;
        }
    }
    if let Some(from) = filter.from {
        if event.created_at < from {
            return false;
        }
    }
    if let Some(to) = filter.to {
        if event.created_at > to {
            return false;
        }
    }
    true
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn query(
        &self,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<EventPage, StoreError> {
        let events = self.events.read().await;
        let mut matching: Vec<SecurityEvent> = events
            .iter()
            .filter(|e| matches(e, filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok(EventPage {
            events: page,
            total,
        })
    }

    async fn count_since(
        &self,
        user_id: Uuid,
        action: Option<SecurityAction>,
        status: Option<EventStatus>,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let filter = EventFilter {
            user_id: Some(user_id),
            action,
            status,
            from: Some(since),
            to: None,
        };
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| matches(e, &filter)).count() as u64)
    }

    async fn recent_successes(
        &self,
        user_id: Uuid,
        action: SecurityAction,
        limit: u64,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matching: Vec<SecurityEvent> = events
            .iter()
            .filter(|e| {
                e.user_id == Some(user_id)
                    && e.action == action
                    && e.status == EventStatus::Success
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn attach_location(&self, ip: &str, location: GeoLocation) -> Result<bool, StoreError> {
        let mut events = self.events.write().await;
        let target = events
            .iter_mut()
            .filter(|e| e.ip == ip)
            .max_by_key(|e| e.created_at);
        match target {
            Some(event) => {
                event.location = Some(location);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new(email.into(), "hash".into(), None)
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        UserStore::insert(&store, &user("a@b.c")).await.unwrap();
        let err = UserStore::insert(&store, &user("A@B.C")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        UserStore::insert(&store, &user("mixed@example.com")).await.unwrap();
        let found = store.find_by_email("MIXED@example.COM").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn update_with_applies_atomically() {
        let store = MemoryStore::new();
        let u = user("a@b.c");
        UserStore::insert(&store, &u).await.unwrap();

        let (updated, flagged) = store
            .update_with(u.id, &|user| {
                user.failed_attempts += 1;
                user.failed_attempts >= 1
            })
            .await
            .unwrap();
        assert_eq!(updated.failed_attempts, 1);
        assert!(flagged);
    }

    #[tokio::test]
    async fn rotate_is_compare_and_swap() {
        let store = MemoryStore::new();
        let device = crate::models::DeviceInfo::from_request("agent", "203.0.113.9");
        let session = Session::new(Uuid::new_v4(), "old".into(), device, Duration::days(7));
        SessionStore::insert(&store, &session).await.unwrap();

        assert!(store
            .rotate(session.id, "old", "new", Utc::now())
            .await
            .unwrap());
        // Second rotation against the stale value must fail.
        assert!(!store
            .rotate(session.id, "old", "newer", Utc::now())
            .await
            .unwrap());
        assert!(store
            .find_active_by_refresh_token("new")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_active_by_refresh_token("old")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upsert_preserves_trust() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let mut device = Device::new(user_id, "Mozilla/5.0 Firefox/120.0", "203.0.113.9");
        DeviceStore::upsert(&store, &device).await.unwrap();
        store
            .set_trusted(user_id, &device.fingerprint, true)
            .await
            .unwrap();

        device.last_ip = "203.0.113.10".into();
        let stored = DeviceStore::upsert(&store, &device).await.unwrap();
        assert!(stored.trusted);
        assert_eq!(stored.last_ip, "203.0.113.10");
    }

    #[tokio::test]
    async fn attach_location_targets_latest_event() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let mut first = SecurityEvent::new(
            Some(user_id),
            SecurityAction::Login,
            EventStatus::Success,
            "203.0.113.9",
            "agent",
        );
        first.created_at = Utc::now() - Duration::minutes(5);
        let second = SecurityEvent::new(
            Some(user_id),
            SecurityAction::Login,
            EventStatus::Success,
            "203.0.113.9",
            "agent",
        );
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        assert!(store
            .attach_location("203.0.113.9", GeoLocation::local())
            .await
            .unwrap());
        let page = store
            .query(
                &EventFilter {
                    user_id: Some(user_id),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.events[0].location.is_some());
        assert!(page.events[1].location.is_none());
    }

    #[tokio::test]
    async fn query_paginates_newest_first() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        for i in 0..5 {
            let mut event = SecurityEvent::new(
                Some(user_id),
                SecurityAction::Login,
                EventStatus::Failure,
                "203.0.113.9",
                "agent",
            );
            event.created_at = Utc::now() - Duration::minutes(i);
            store.append(&event).await.unwrap();
        }
        let page = store
            .query(
                &EventFilter {
                    user_id: Some(user_id),
                    status: Some(EventStatus::Failure),
                    ..Default::default()
                },
                Pagination {
                    offset: 1,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.events.len(), 2);
        assert!(page.events[0].created_at >= page.events[1].created_at);
    }
}
