//! Client identity extraction for admission control.
//!
//! The rate ledger keys on a stable per-connection identity derived from the
//! real client address. Forwarded-IP headers (`X-Forwarded-For`,
//! `X-Real-IP`) are only honored when the connection itself originates from
//! a trusted proxy network; otherwise the socket peer address wins, so a
//! direct client cannot spoof its way out of its own bucket.
//!
//! When no trusted ranges are configured every source is trusted
//! (development mode), matching the behavior of running without a reverse
//! proxy in front.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::warn;

/// Fallback identity when neither headers nor the socket yield an address.
///
/// All such requests share one ledger entry, which keeps them collectively
/// rate-limited rather than unlimited.
pub const UNKNOWN_CLIENT: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation (e.g. "10.0.0.0/8", "::1/128") or a single IP
    /// (implicit /32 or /128). Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let (ip_part, prefix_part) = match cidr.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = ip_part.parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        let prefix_len = match prefix_part {
            Some(prefix) => {
                let len: u8 = prefix.parse().ok()?;
                if len > max_prefix {
                    return None;
                }
                len
            }
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check whether `ip` falls inside this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            // IPv4 and IPv6 don't match
            _ => false,
        }
    }
}

/// Set of proxy networks whose forwarded-IP headers are honored.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Parse CIDR strings; invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether forwarded headers from this peer should be honored.
    /// With no ranges configured, every peer is trusted.
    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(&peer))
    }
}

// =============================================================================
// Identity Resolution
// =============================================================================

/// Derive the ledger key for a request.
///
/// Priority, when the peer is a trusted proxy (or no ranges are configured):
/// 1. first entry of `X-Forwarded-For`
/// 2. `X-Real-IP`
/// 3. the socket peer address
///
/// An untrusted peer's headers are ignored outright and its socket address
/// is used. Requests with no resolvable address at all share
/// [`UNKNOWN_CLIENT`].
pub fn client_identity<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    let honor_headers = match peer {
        Some(ip) => trusted.is_trusted(ip),
        // No socket info (e.g. in-process tests): fall back to headers.
        None => true,
    };

    if honor_headers && let Some(ip) = forwarded_ip(req) {
        return Cow::Owned(ip.to_string());
    }

    match peer {
        Some(ip) => Cow::Owned(ip.to_string()),
        None => Cow::Borrowed(UNKNOWN_CLIENT),
    }
}

/// First forwarded address found in proxy headers, if any.
fn forwarded_ip<B>(req: &Request<B>) -> Option<&str> {
    // X-Forwarded-For holds "client, proxy1, proxy2"; the first entry is the
    // original client.
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first);
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        let value = value.trim();
        if !value.is_empty() {
            return Some(value);
        }
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_peer(peer: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>(peer.parse().unwrap()));
        req
    }

    #[test]
    fn test_cidr_parse() {
        assert!(CidrRange::parse("10.0.0.0/8").is_some());
        assert!(CidrRange::parse("::1/128").is_some());
        assert!(CidrRange::parse("192.168.1.1").is_some()); // implicit /32
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("10.0.0.0/8").unwrap();
        assert!(cidr.contains(&"10.0.0.1".parse().unwrap()));
        assert!(cidr.contains(&"10.255.255.255".parse().unwrap()));
        assert!(!cidr.contains(&"11.0.0.1".parse().unwrap()));

        let slash24 = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(slash24.contains(&"192.168.1.200".parse().unwrap()));
        assert!(!slash24.contains(&"192.168.2.1".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_header_priority() {
        let trusted = TrustedProxyConfig::default();

        let req = request_with_peer(
            "10.0.0.1:9999",
            &[
                ("x-forwarded-for", "203.0.113.50, 10.0.0.1"),
                ("x-real-ip", "198.51.100.7"),
            ],
        );
        assert_eq!(client_identity(&req, &trusted), "203.0.113.50");

        let req = request_with_peer("10.0.0.1:9999", &[("x-real-ip", "198.51.100.7")]);
        assert_eq!(client_identity(&req, &trusted), "198.51.100.7");
    }

    #[test]
    fn test_socket_peer_fallback() {
        let trusted = TrustedProxyConfig::default();
        let req = request_with_peer("203.0.113.9:4242", &[]);
        assert_eq!(client_identity(&req, &trusted), "203.0.113.9");
    }

    #[test]
    fn test_untrusted_peer_headers_are_ignored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);

        // Peer outside the trusted range: its forwarded header is spoofable
        // and must not become the ledger key.
        let req = request_with_peer(
            "203.0.113.9:4242",
            &[("x-forwarded-for", "198.51.100.7")],
        );
        assert_eq!(client_identity(&req, &trusted), "203.0.113.9");

        // Peer inside the trusted range: the forwarded header wins.
        let req = request_with_peer("10.1.2.3:4242", &[("x-forwarded-for", "198.51.100.7")]);
        assert_eq!(client_identity(&req, &trusted), "198.51.100.7");
    }

    #[test]
    fn test_unknown_when_nothing_resolvable() {
        let trusted = TrustedProxyConfig::default();
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identity(&req, &trusted), UNKNOWN_CLIENT);
    }
}
