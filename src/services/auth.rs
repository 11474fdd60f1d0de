//! Authentication orchestration: registration, login, token refresh,
//! password recovery, two-factor lifecycle and the session/device surface.
//!
//! Every operation takes the caller's [`RequestContext`] explicitly; nothing
//! here reads ambient request state.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{
    Device, DeviceInfo, EventFilter, EventPage, EventStatus, Pagination, SanitizedUser,
    SecurityAction, SecurityEvent, SecuritySummary, Session, User,
};
use crate::store::{DeviceStore, EventStore, SessionStore, StoreError, UserStore};
use crate::utils::{hash_password, password_strength, Password};

use super::credentials::CredentialService;
use super::events::SecurityEventLog;
use super::jwt::{Claims, JwtService, TokenPair};
use super::location::{resolve_ip, LocationResolver};
use super::notify::NotificationSender;
use super::registry::SessionRegistry;
use super::risk::{RiskAssessment, RiskEngine};
use super::two_factor::{TwoFactorEnrollment, TwoFactorService};
use super::ServiceError;

const VERIFICATION_TOKEN_HOURS: i64 = 24;
const RESET_TOKEN_HOURS: i64 = 1;

/// Where a request came from. Built by the transport layer and passed down.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip: String,
    pub user_agent: String,
}

impl RequestContext {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_request(&self.user_agent, &self.ip)
    }
}

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub user: SanitizedUser,
    pub tokens: TokenPair,
    pub session_id: Uuid,
    pub risk: RiskAssessment,
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Top-level authentication service wiring the collaborators together.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    credentials: CredentialService,
    two_factor: TwoFactorService,
    jwt: JwtService,
    registry: SessionRegistry,
    risk: RiskEngine,
    events: SecurityEventLog,
    notifier: Arc<dyn NotificationSender>,
    resolver: Arc<dyn LocationResolver>,
    hashing: crate::utils::HashingConfig,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        devices: Arc<dyn DeviceStore>,
        event_store: Arc<dyn EventStore>,
        notifier: Arc<dyn NotificationSender>,
        resolver: Arc<dyn LocationResolver>,
    ) -> Result<Self, anyhow::Error> {
        let events = SecurityEventLog::new(event_store, resolver.clone());
        Ok(Self {
            credentials: CredentialService::new(users.clone(), config.security.clone()),
            two_factor: TwoFactorService::new(users.clone(), config.security.clone()),
            jwt: JwtService::new(&config.jwt)?,
            registry: SessionRegistry::new(sessions, devices, &config.security),
            risk: RiskEngine::new(events.clone(), config.security.clone()),
            events,
            users,
            notifier,
            resolver,
            hashing: config.security.hashing.clone(),
        })
    }

    fn event(
        &self,
        user: Option<&User>,
        action: SecurityAction,
        status: EventStatus,
        ctx: &RequestContext,
    ) -> SecurityEvent {
        SecurityEvent::new(
            user.map(|u| u.id),
            action,
            status,
            &ctx.ip,
            &ctx.user_agent,
        )
    }

    /// Dispatch a notification off the request path. Delivery failures are
    /// logged, never surfaced.
    fn notify<F, Fut>(&self, what: &'static str, send: F)
    where
        F: FnOnce(Arc<dyn NotificationSender>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = send(notifier).await {
                tracing::error!(error = %e, what, "Notification delivery failed");
            }
        });
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)
    }

    // --- registration and email verification ---

    /// Create an account. The password must clear the strength gate; the
    /// verification email is dispatched off the request path.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: Option<String>,
        ctx: &RequestContext,
    ) -> Result<SanitizedUser, ServiceError> {
        let strength = password_strength(password);
        if strength.is_weak() {
            return Err(ServiceError::WeakPassword(strength));
        }

        let hash = hash_password(&Password::new(password.to_string()), &self.hashing)
            .map_err(ServiceError::Internal)?;

        let mut user = User::new(email.to_string(), hash.into_string(), username);
        let token = random_token();
        user.email_verification_token = Some(token.clone());
        user.email_verification_expires =
            Some(Utc::now() + Duration::hours(VERIFICATION_TOKEN_HOURS));

        if let Err(e) = self.users.insert(&user).await {
            return Err(match e {
                StoreError::Conflict(msg) if msg.starts_with("email") => {
                    ServiceError::EmailAlreadyRegistered
                }
                StoreError::Conflict(_) => ServiceError::UsernameTaken,
                other => other.into(),
            });
        }

        tracing::info!(user_id = %user.id, "User registered");
        self.events
            .append_and_enrich(
                self.event(Some(&user), SecurityAction::Register, EventStatus::Success, ctx)
                    .with_email(&user.email),
            )
            .await;

        let email = user.email.clone();
        let name = user.display_name().to_string();
        self.notify("verification email", move |n| async move {
            n.send_verification(&email, &token, &name).await
        });

        Ok(user.sanitized())
    }

    /// Redeem an email verification token.
    pub async fn verify_email(&self, token: &str, ctx: &RequestContext) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_by_verification_token(token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if user
            .email_verification_expires
            .map_or(true, |expires| expires <= Utc::now())
        {
            return Err(ServiceError::TokenExpired);
        }

        self.users
            .update_with(user.id, &|user| {
                user.email_verified = true;
                user.email_verification_token = None;
                user.email_verification_expires = None;
                false
            })
            .await?;

        self.events
            .append(self.event(
                Some(&user),
                SecurityAction::EmailVerification,
                EventStatus::Success,
                ctx,
            ))
            .await;
        Ok(())
    }

    /// Issue a fresh verification token. Always returns Ok so callers cannot
    /// probe which addresses exist.
    pub async fn resend_verification(&self, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(());
        };
        if user.email_verified {
            return Ok(());
        }

        let token = random_token();
        let stored = token.clone();
        self.users
            .update_with(user.id, &move |user| {
                user.email_verification_token = Some(stored.clone());
                user.email_verification_expires =
                    Some(Utc::now() + Duration::hours(VERIFICATION_TOKEN_HOURS));
                false
            })
            .await?;

        let email = user.email.clone();
        let name = user.display_name().to_string();
        self.notify("verification email", move |n| async move {
            n.send_verification(&email, &token, &name).await
        });
        Ok(())
    }

    // --- login, refresh, logout ---

    /// Full login flow: lockout gate, password check with failure accounting,
    /// second factor when enrolled, risk assessment, token issuance and
    /// session/device registration.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        two_factor_code: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<LoginResponse, ServiceError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            self.events
                .append(
                    self.event(None, SecurityAction::Login, EventStatus::Failure, ctx)
                        .with_email(email)
                        .with_detail("unknown email"),
                )
                .await;
            return Err(ServiceError::InvalidCredentials);
        };

        if let Some(until) = user.locked_until.filter(|until| *until > Utc::now()) {
            self.events
                .append(
                    self.event(Some(&user), SecurityAction::Login, EventStatus::Failure, ctx)
                        .with_detail("account locked"),
                )
                .await;
            return Err(ServiceError::AccountLocked(until));
        }

        if !self.credentials.verify_password(&user, password)? {
            let record = self.credentials.record_failure(user.id).await?;
            self.events
                .append(
                    self.event(Some(&user), SecurityAction::Login, EventStatus::Failure, ctx)
                        .with_detail("wrong password"),
                )
                .await;
            if record.newly_locked {
                self.events
                    .append(self.event(
                        Some(&user),
                        SecurityAction::AccountLocked,
                        EventStatus::Warning,
                        ctx,
                    ))
                    .await;
                let email = user.email.clone();
                let name = user.display_name().to_string();
                let ip = ctx.ip.clone();
                self.notify("lockout alert", move |n| async move {
                    n.send_security_alert(
                        &email,
                        "Account temporarily locked",
                        "Your account was locked after repeated failed login attempts.",
                        &ip,
                        &name,
                    )
                    .await
                });
            }
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.email_verified {
            return Err(ServiceError::EmailNotVerified);
        }

        if user.two_factor_enabled {
            let Some(code) = two_factor_code else {
                return Err(ServiceError::TwoFactorRequired);
            };
            let outcome = self.two_factor.verify_at_login(&user, code).await?;
            if !outcome.accepted {
                self.events
                    .append(
                        self.event(Some(&user), SecurityAction::Login, EventStatus::Failure, ctx)
                            .with_detail("invalid two-factor code"),
                    )
                    .await;
                return Err(ServiceError::InvalidTwoFactorCode);
            }
            if outcome.via_backup_code {
                self.events
                    .append(
                        self.event(
                            Some(&user),
                            SecurityAction::TwoFactorVerified,
                            EventStatus::Success,
                            ctx,
                        )
                        .with_detail("backup code"),
                    )
                    .await;
            }
        }

        self.credentials.reset_failures(user.id).await?;

        let location = resolve_ip(self.resolver.as_ref(), &ctx.ip).await;
        let risk = self
            .risk
            .assess_login(&user, &ctx.ip, &ctx.user_agent, location.as_ref())
            .await?;

        let tokens = self.jwt.issue_pair(&user)?;
        let session = self
            .registry
            .create_session(user.id, &tokens.refresh_token, ctx.device_info())
            .await?;
        self.registry.upsert_device(user.id, &ctx.device_info()).await?;

        let ip = ctx.ip.clone();
        self.users
            .update_with(user.id, &move |user| {
                user.last_login_at = Some(Utc::now());
                user.last_login_ip = Some(ip.clone());
                false
            })
            .await?;

        self.events
            .append_and_enrich(self.event(
                Some(&user),
                SecurityAction::Login,
                EventStatus::Success,
                ctx,
            ))
            .await;
        self.events
            .append(
                self.event(
                    Some(&user),
                    SecurityAction::SessionCreated,
                    EventStatus::Success,
                    ctx,
                )
                .with_detail(session.id.to_string()),
            )
            .await;

        if risk.suspicious {
            let email = user.email.clone();
            let name = user.display_name().to_string();
            let ip = ctx.ip.clone();
            let body = format!("Unusual sign-in detected: {}.", risk.reasons.join(", "));
            self.notify("suspicious login alert", move |n| async move {
                n.send_security_alert(&email, "New sign-in to your account", &body, &ip, &name)
                    .await
            });
        }

        tracing::info!(user_id = %user.id, session_id = %session.id, "Login succeeded");

        Ok(LoginResponse {
            user: user.sanitized(),
            tokens,
            session_id: session.id,
            risk,
        })
    }

    /// Exchange a refresh token for a fresh pair, rotating the session's
    /// stored token. A replayed token fails with [`ServiceError::SessionRevoked`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<TokenPair, ServiceError> {
        let claims = self.jwt.verify_refresh(refresh_token)?;
        let user_id = claims.user_id()?;

        let session = self
            .registry
            .find_active_by_refresh_token(refresh_token)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(ServiceError::SessionRevoked)?;

        let user = self.require_user(user_id).await?;
        let tokens = self.jwt.issue_pair(&user)?;
        self.registry
            .rotate_session(session.id, refresh_token, &tokens.refresh_token)
            .await?;

        tracing::debug!(
            user_id = %user_id,
            session_id = %session.id,
            ip = %ctx.ip,
            "Tokens refreshed"
        );
        Ok(tokens)
    }

    /// End the session bound to a refresh token. Idempotent: an unknown or
    /// already-revoked token is a no-op.
    pub async fn logout(&self, refresh_token: &str, ctx: &RequestContext) -> Result<(), ServiceError> {
        let Some(session) = self
            .registry
            .find_active_by_refresh_token(refresh_token)
            .await?
        else {
            return Ok(());
        };

        self.registry
            .revoke_session(session.user_id, session.id)
            .await?;
        self.events
            .append(SecurityEvent::new(
                Some(session.user_id),
                SecurityAction::Logout,
                EventStatus::Success,
                &ctx.ip,
                &ctx.user_agent,
            ))
            .await;
        Ok(())
    }

    /// Validate an access token and return its claims.
    pub fn verify_access(&self, token: &str) -> Result<Claims, ServiceError> {
        self.jwt.verify_access(token)
    }

    // --- password recovery and change ---

    /// Issue a password reset token. Always returns Ok so callers cannot
    /// probe which addresses exist.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(());
        };

        let token = random_token();
        let stored = token.clone();
        self.users
            .update_with(user.id, &move |user| {
                user.password_reset_token = Some(stored.clone());
                user.password_reset_expires = Some(Utc::now() + Duration::hours(RESET_TOKEN_HOURS));
                false
            })
            .await?;

        let email = user.email.clone();
        let name = user.display_name().to_string();
        self.notify("password reset email", move |n| async move {
            n.send_password_reset(&email, &token, &name).await
        });
        Ok(())
    }

    /// Redeem a reset token and set a new password. Clears lockout state and
    /// revokes every session.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_by_reset_token(token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if user
            .password_reset_expires
            .map_or(true, |expires| expires <= Utc::now())
        {
            return Err(ServiceError::TokenExpired);
        }

        let strength = password_strength(new_password);
        if strength.is_weak() {
            return Err(ServiceError::WeakPassword(strength));
        }

        self.credentials.set_password(&user, new_password).await?;
        self.users
            .update_with(user.id, &|user| {
                user.password_reset_token = None;
                user.password_reset_expires = None;
                false
            })
            .await?;
        self.credentials.reset_failures(user.id).await?;
        self.registry.revoke_all_sessions(user.id, None).await?;

        self.events
            .append_and_enrich(self.event(
                Some(&user),
                SecurityAction::PasswordReset,
                EventStatus::Success,
                ctx,
            ))
            .await;

        let email = user.email.clone();
        let name = user.display_name().to_string();
        self.notify("password changed email", move |n| async move {
            n.send_password_changed(&email, &name).await
        });
        Ok(())
    }

    /// Change the password of a logged-in user. Other sessions are revoked;
    /// the session bound to `keep_refresh_token` survives.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        keep_refresh_token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let user = self.require_user(user_id).await?;

        if !self.credentials.verify_password(&user, current_password)? {
            return Err(ServiceError::InvalidCredentials);
        }

        let strength = password_strength(new_password);
        if strength.is_weak() {
            return Err(ServiceError::WeakPassword(strength));
        }

        self.credentials.set_password(&user, new_password).await?;

        let risk = self
            .risk
            .assess_password_change(&user, &ctx.ip, &ctx.user_agent)
            .await?;

        self.registry
            .revoke_all_sessions(user.id, keep_refresh_token)
            .await?;

        self.events
            .append_and_enrich(self.event(
                Some(&user),
                SecurityAction::PasswordChange,
                EventStatus::Success,
                ctx,
            ))
            .await;

        let email = user.email.clone();
        let name = user.display_name().to_string();
        if risk.suspicious {
            let ip = ctx.ip.clone();
            let body = format!("Your password was changed: {}.", risk.reasons.join(", "));
            self.notify("suspicious password change alert", move |n| async move {
                n.send_security_alert(&email, "Password changed", &body, &ip, &name)
                    .await
            });
        } else {
            self.notify("password changed email", move |n| async move {
                n.send_password_changed(&email, &name).await
            });
        }
        Ok(())
    }

    // --- two-factor lifecycle ---

    /// Start two-factor enrollment; returns the secret, provisioning URI and
    /// backup codes to show the user once.
    pub async fn begin_two_factor_enrollment(
        &self,
        user_id: Uuid,
    ) -> Result<TwoFactorEnrollment, ServiceError> {
        let user = self.require_user(user_id).await?;
        self.two_factor.begin_enrollment(&user).await
    }

    /// Confirm enrollment with a current code; flips two-factor on.
    pub async fn confirm_two_factor_enrollment(
        &self,
        user_id: Uuid,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let user = self.require_user(user_id).await?;
        if !self.two_factor.confirm_enrollment(&user, code).await? {
            return Err(ServiceError::InvalidTwoFactorCode);
        }
        self.events
            .append(self.event(
                Some(&user),
                SecurityAction::TwoFactorEnabled,
                EventStatus::Success,
                ctx,
            ))
            .await;
        Ok(())
    }

    /// Turn two-factor off. Requires the password and a valid current code or
    /// backup code.
    pub async fn disable_two_factor(
        &self,
        user_id: Uuid,
        password: &str,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let user = self.require_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(ServiceError::TwoFactorNotEnabled);
        }
        if !self.credentials.verify_password(&user, password)? {
            return Err(ServiceError::InvalidCredentials);
        }
        if !self.two_factor.verify_at_login(&user, code).await?.accepted {
            return Err(ServiceError::InvalidTwoFactorCode);
        }

        self.two_factor.disable(user.id).await?;
        self.events
            .append(self.event(
                Some(&user),
                SecurityAction::TwoFactorDisabled,
                EventStatus::Warning,
                ctx,
            ))
            .await;

        let email = user.email.clone();
        let name = user.display_name().to_string();
        let ip = ctx.ip.clone();
        self.notify("two-factor disabled alert", move |n| async move {
            n.send_security_alert(
                &email,
                "Two-factor authentication disabled",
                "Two-factor authentication was turned off on your account.",
                &ip,
                &name,
            )
            .await
        });
        Ok(())
    }

    /// Replace the backup-code set. Requires the password.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        password: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let user = self.require_user(user_id).await?;
        if !self.credentials.verify_password(&user, password)? {
            return Err(ServiceError::InvalidCredentials);
        }
        self.two_factor.regenerate_backup_codes(&user).await
    }

    // --- sessions and devices ---

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        self.registry.list_sessions(user_id).await
    }

    pub async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        self.registry.revoke_session(user_id, session_id).await?;
        self.events
            .append(
                SecurityEvent::new(
                    Some(user_id),
                    SecurityAction::SessionRevoked,
                    EventStatus::Success,
                    &ctx.ip,
                    &ctx.user_agent,
                )
                .with_detail(session_id.to_string()),
            )
            .await;
        Ok(())
    }

    /// Revoke every session except the one bound to `keep_refresh_token`.
    pub async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        keep_refresh_token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        let revoked = self
            .registry
            .revoke_all_sessions(user_id, keep_refresh_token)
            .await?;
        if revoked > 0 {
            self.events
                .append(
                    SecurityEvent::new(
                        Some(user_id),
                        SecurityAction::SessionRevoked,
                        EventStatus::Success,
                        &ctx.ip,
                        &ctx.user_agent,
                    )
                    .with_detail(format!("{} sessions", revoked)),
                )
                .await;
        }
        Ok(revoked)
    }

    pub async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, ServiceError> {
        self.registry.list_devices(user_id).await
    }

    pub async fn trust_device(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        trusted: bool,
    ) -> Result<(), ServiceError> {
        self.registry.trust_device(user_id, fingerprint, trusted).await
    }

    /// Remove a device and revoke its sessions.
    pub async fn revoke_device(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        let revoked = self.registry.revoke_device(user_id, fingerprint).await?;
        self.events
            .append(
                SecurityEvent::new(
                    Some(user_id),
                    SecurityAction::SessionRevoked,
                    EventStatus::Success,
                    &ctx.ip,
                    &ctx.user_agent,
                )
                .with_detail(format!("device {}", fingerprint)),
            )
            .await;
        Ok(revoked)
    }

    /// Remove every device except the current one, revoking their sessions.
    pub async fn revoke_all_devices_except(
        &self,
        user_id: Uuid,
        keep_fingerprint: &str,
    ) -> Result<u64, ServiceError> {
        self.registry
            .revoke_all_devices_except(user_id, keep_fingerprint)
            .await
    }

    // --- audit surface ---

    pub async fn security_events(
        &self,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<EventPage, ServiceError> {
        self.events.query(filter, pagination).await
    }

    pub async fn security_summary(&self, user_id: Uuid) -> Result<SecuritySummary, ServiceError> {
        self.events.summarize(user_id).await
    }
}
