//! Location resolver contract.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::models::GeoLocation;

#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// Resolve an IP to a location, or `None` when unknown. Implementations
    /// should keep their timeouts short; a miss degrades gracefully.
    async fn resolve(&self, ip: &str) -> Option<GeoLocation>;
}

/// Resolver that never knows anything.
#[derive(Clone, Default)]
pub struct NullResolver;

#[async_trait]
impl LocationResolver for NullResolver {
    async fn resolve(&self, _ip: &str) -> Option<GeoLocation> {
        None
    }
}

/// True for loopback and private-range addresses, which resolve to the fixed
/// local marker without any resolver call.
pub fn is_private_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => {
            v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
        }
        Err(_) => false,
    }
}

/// Resolve with the private-address short-circuit applied.
pub async fn resolve_ip(resolver: &dyn LocationResolver, ip: &str) -> Option<GeoLocation> {
    if is_private_ip(ip) {
        return Some(GeoLocation::local());
    }
    resolver.resolve(ip).await
}
