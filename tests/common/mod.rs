//! Shared setup for the integration tests: an in-memory backend, a
//! notification sender that records what it was asked to deliver, and a
//! fully wired service with cheap hashing parameters.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth_core::config::{AuthConfig, Environment, JwtConfig, SecurityPolicy};
use auth_core::services::{AuthService, NotificationSender, NullResolver, RequestContext};
use auth_core::store::MemoryStore;
use auth_core::utils::HashingConfig;
use tokio::sync::Mutex;

pub const PASSWORD: &str = "Tr0ub4dor&3!horse";
pub const AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";
pub const IP: &str = "203.0.113.7";

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Verification { email: String, token: String },
    PasswordReset { email: String, token: String },
    PasswordChanged { email: String },
    SecurityAlert { email: String, title: String },
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send_verification(
        &self,
        email: &str,
        token: &str,
        _name: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().await.push(Sent::Verification {
            email: email.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        token: &str,
        _name: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().await.push(Sent::PasswordReset {
            email: email.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }

    async fn send_password_changed(&self, email: &str, _name: &str) -> Result<(), anyhow::Error> {
        self.sent.lock().await.push(Sent::PasswordChanged {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn send_security_alert(
        &self,
        email: &str,
        title: &str,
        _body: &str,
        _ip: &str,
        _name: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent.lock().await.push(Sent::SecurityAlert {
            email: email.to_string(),
            title: title.to_string(),
        });
        Ok(())
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        service_name: "auth-core-test".into(),
        log_level: "error".into(),
        jwt: JwtConfig {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        security: SecurityPolicy {
            max_login_attempts: 5,
            lockout_minutes: 30,
            totp_skew: 2,
            totp_issuer: "auth-core-test".into(),
            backup_code_count: 10,
            login_risk_threshold: 50,
            password_change_risk_threshold: 40,
            session_ttl_days: 7,
            // Cheap parameters keep the suite fast.
            hashing: HashingConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        },
    }
}

pub struct Harness {
    pub auth: AuthService,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "error".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = AuthService::new(
            &test_config(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            Arc::new(NullResolver),
        )
        .expect("service wiring");
        Self {
            auth,
            store,
            notifier,
        }
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::new(IP, AGENT)
    }

    /// Register an account and redeem its verification token.
    pub async fn registered_user(&self, email: &str) -> uuid::Uuid {
        let ctx = self.ctx();
        let user = self
            .auth
            .register(email, PASSWORD, None, &ctx)
            .await
            .expect("register");
        let token = self
            .wait_for(|sent| match sent {
                Sent::Verification { email: e, token } if e == &user.email => {
                    Some(token.clone())
                }
                _ => None,
            })
            .await;
        self.auth.verify_email(&token, &ctx).await.expect("verify");
        user.id
    }

    /// Poll the recorded notifications until `pick` matches one. Deliveries
    /// happen off the request path, so a short wait is expected.
    pub async fn wait_for<T>(&self, pick: impl Fn(&Sent) -> Option<T>) -> T {
        for _ in 0..100 {
            if let Some(found) = self.notifier.sent.lock().await.iter().find_map(&pick) {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected notification was never sent");
    }
}
