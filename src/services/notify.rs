//! Notification sender contract.
//!
//! Rendering, delivery and retry are the collaborator's concern; the core
//! hands over plain data and treats every failure as non-fatal (caught and
//! logged at the call site).

use async_trait::async_trait;

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_verification(
        &self,
        email: &str,
        token: &str,
        name: &str,
    ) -> Result<(), anyhow::Error>;

    async fn send_password_reset(
        &self,
        email: &str,
        token: &str,
        name: &str,
    ) -> Result<(), anyhow::Error>;

    async fn send_password_changed(&self, email: &str, name: &str) -> Result<(), anyhow::Error>;

    async fn send_security_alert(
        &self,
        email: &str,
        title: &str,
        body: &str,
        ip: &str,
        name: &str,
    ) -> Result<(), anyhow::Error>;
}

/// No-op sender for deployments without outbound mail and for tests.
#[derive(Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl NotificationSender for NullNotifier {
    async fn send_verification(
        &self,
        _email: &str,
        _token: &str,
        _name: &str,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn send_password_reset(
        &self,
        _email: &str,
        _token: &str,
        _name: &str,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn send_password_changed(&self, _email: &str, _name: &str) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn send_security_alert(
        &self,
        _email: &str,
        _title: &str,
        _body: &str,
        _ip: &str,
        _name: &str,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
