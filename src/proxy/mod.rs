//! Proxy pool management.
//!
//! - [`pool`] - Round-robin pool with rolling per-endpoint quotas
//! - [`validator`] - Concurrent health probe run once before dispatch

pub mod pool;
pub mod validator;

pub use pool::{Lease, ProxyPool};
pub use validator::ProxyValidator;

/// Normalize a proxy address to `scheme://host:port` form
///
/// Addresses without a scheme are assumed to be plain HTTP proxies.
/// Returns `None` for blank input or anything that does not parse as a URL
/// with a host.
pub fn normalize_proxy_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = url::Url::parse(&candidate).ok()?;
    parsed.host_str()?;
    Some(candidate.trim_end_matches('/').to_string())
}
