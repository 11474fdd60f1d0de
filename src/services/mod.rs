//! Service layer: each service owns one slice of account-security state,
//! composed by [`auth::AuthService`].

pub mod auth;
pub mod credentials;
pub mod error;
pub mod events;
pub mod jwt;
pub mod location;
pub mod notify;
pub mod registry;
pub mod risk;
pub mod two_factor;

pub use auth::{AuthService, LoginResponse, RequestContext};
pub use credentials::{CredentialService, FailureRecord};
pub use error::ServiceError;
pub use events::SecurityEventLog;
pub use jwt::{Claims, JwtService, TokenPair};
pub use location::{LocationResolver, NullResolver};
pub use notify::{NotificationSender, NullNotifier};
pub use registry::SessionRegistry;
pub use risk::{RiskAssessment, RiskEngine};
pub use two_factor::{TwoFactorEnrollment, TwoFactorOutcome, TwoFactorService};
