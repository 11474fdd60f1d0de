//! Account-security core: credential verification with progressive lockout,
//! two-factor authentication, risk scoring, JWT issuance, session and device
//! tracking, and an append-only security event log.
//!
//! The crate is transport-agnostic. Persistence, notification delivery and
//! IP geolocation are trait collaborators ([`store`], [`services::notify`],
//! [`services::location`]); [`store::MemoryStore`] is the in-process
//! reference backend.
//!
//! ```no_run
//! use std::sync::Arc;
//! use auth_core::config::AuthConfig;
//! use auth_core::services::{AuthService, NullNotifier, NullResolver, RequestContext};
//! use auth_core::store::MemoryStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_env()?;
//! let store = Arc::new(MemoryStore::new());
//! let auth = AuthService::new(
//!     &config,
//!     store.clone(),
//!     store.clone(),
//!     store.clone(),
//!     store,
//!     Arc::new(NullNotifier),
//!     Arc::new(NullResolver),
//! )?;
//!
//! let ctx = RequestContext::new("203.0.113.7", "Mozilla/5.0");
//! auth.register("user@example.com", "correct horse battery staple", None, &ctx)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use services::{AuthService, RequestContext, ServiceError};
