pub mod device;
pub mod security_event;
pub mod session;
pub mod user;

pub use device::{fingerprint, parse_user_agent, Device, DeviceType};
pub use security_event::{
    EventFilter, EventPage, EventStatus, GeoLocation, Pagination, SecurityAction, SecurityEvent,
    SecuritySummary,
};
pub use session::{DeviceInfo, Session};
pub use user::{SanitizedUser, User, UserRole};
