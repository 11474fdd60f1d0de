//! Session and device registry: the lifecycle of refresh-token-bound
//! sessions and of known devices, including the revocation cascade between
//! them.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::SecurityPolicy;
use crate::models::{Device, DeviceInfo, Session};
use crate::store::{DeviceStore, SessionStore};

use super::ServiceError;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<dyn SessionStore>,
    devices: Arc<dyn DeviceStore>,
    session_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        devices: Arc<dyn DeviceStore>,
        policy: &SecurityPolicy,
    ) -> Self {
        Self {
            sessions,
            devices,
            session_ttl: Duration::days(policy.session_ttl_days),
        }
    }

    /// Record a fresh session for a successful login.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        device: DeviceInfo,
    ) -> Result<Session, ServiceError> {
        let session = Session::new(user_id, refresh_token.to_string(), device, self.session_ttl);
        self.sessions.insert(&session).await?;
        tracing::debug!(user_id = %user_id, session_id = %session.id, "Session created");
        Ok(session)
    }

    pub async fn find_active_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self.sessions.find_active_by_refresh_token(token).await?)
    }

    /// Swap the session's refresh token. Fails with [`ServiceError::SessionRevoked`]
    /// when the stored token no longer matches `old_token`, which means a
    /// concurrent refresh already won or the token was replayed.
    pub async fn rotate_session(
        &self,
        session_id: Uuid,
        old_token: &str,
        new_token: &str,
    ) -> Result<(), ServiceError> {
        let rotated = self
            .sessions
            .rotate(session_id, old_token, new_token, Utc::now())
            .await?;
        if !rotated {
            tracing::warn!(session_id = %session_id, "Stale refresh token presented");
            return Err(ServiceError::SessionRevoked);
        }
        Ok(())
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        Ok(self.sessions.list_for_user(user_id).await?)
    }

    /// Revoke one session belonging to `user_id`. Ownership is checked here
    /// so callers cannot revoke across users.
    pub async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), ServiceError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(ServiceError::SessionNotFound)?;
        self.sessions.deactivate(session.id).await?;
        Ok(())
    }

    /// Revoke every session for a user, optionally sparing the one bound to
    /// `keep_refresh_token`. Returns how many were revoked.
    pub async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        keep_refresh_token: Option<&str>,
    ) -> Result<u64, ServiceError> {
        let revoked = self
            .sessions
            .deactivate_all(user_id, keep_refresh_token)
            .await?;
        if revoked > 0 {
            tracing::info!(user_id = %user_id, revoked, "Sessions revoked");
        }
        Ok(revoked)
    }

    /// Register or refresh the device a request came from. Trust and creation
    /// time survive a refresh.
    pub async fn upsert_device(
        &self,
        user_id: Uuid,
        info: &DeviceInfo,
    ) -> Result<Device, ServiceError> {
        let device = Device::new(user_id, &info.user_agent, &info.ip);
        Ok(self.devices.upsert(&device).await?)
    }

    pub async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, ServiceError> {
        Ok(self.devices.list_for_user(user_id).await?)
    }

    pub async fn trust_device(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        trusted: bool,
    ) -> Result<(), ServiceError> {
        let updated = self.devices.set_trusted(user_id, fingerprint, trusted).await?;
        if !updated {
            return Err(ServiceError::DeviceNotFound);
        }
        Ok(())
    }

    /// Remove a device. Its active sessions are deactivated first; the device
    /// row is only deleted once the cascade has completed, so a failure can
    /// never leave live sessions behind an absent device.
    pub async fn revoke_device(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<u64, ServiceError> {
        if self.devices.find(user_id, fingerprint).await?.is_none() {
            return Err(ServiceError::DeviceNotFound);
        }
        let revoked = self
            .sessions
            .deactivate_by_fingerprint(user_id, fingerprint)
            .await?;
        self.devices.delete(user_id, fingerprint).await?;
        tracing::info!(user_id = %user_id, fingerprint, revoked, "Device revoked");
        Ok(revoked)
    }

    /// Remove every device except the current one, deactivating their
    /// sessions. Returns how many sessions were revoked.
    pub async fn revoke_all_devices_except(
        &self,
        user_id: Uuid,
        keep_fingerprint: &str,
    ) -> Result<u64, ServiceError> {
        let mut revoked = 0;
        for device in self.devices.list_for_user(user_id).await? {
            if device.fingerprint == keep_fingerprint {
                continue;
            }
            revoked += self
                .sessions
                .deactivate_by_fingerprint(user_id, &device.fingerprint)
                .await?;
        }
        self.devices.delete_all_except(user_id, keep_fingerprint).await?;
        Ok(revoked)
    }
}
