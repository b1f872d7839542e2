//! Client IP extraction and trusted proxy validation.
//!
//! The rate limiter keys its counters by client IP. This module decides which
//! address that is.
//!
//! # Resolution Order
//!
//! 1. If trusted proxies are configured and the TCP peer is **not** one of
//!    them, the peer address is used and forwarding headers are ignored.
//! 2. First entry of `X-Forwarded-For` (when non-empty)
//! 3. `X-Real-IP` (when non-empty)
//! 4. The TCP peer address from Axum's `ConnectInfo`
//! 5. [`LOOPBACK_PLACEHOLDER`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Without `TRUSTED_PROXIES`, forwarding headers are believed from any peer.
//! A client that can reach this service directly can then rotate spoofed
//! addresses in `X-Forwarded-For` to dodge its limit, or pin someone else's
//! address to exhaust their quota. Deploy behind a proxy that overwrites the
//! header, and list that proxy's network in `TRUSTED_PROXIES`.
//!
//! # The Placeholder Bucket
//!
//! Requests with no identifiable address all share the `127.0.0.1` bucket.
//! That is deliberate: unidentifiable clients are limited collectively rather
//! than not at all.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Client identifier used when no address can be determined.
pub const LOOPBACK_PLACEHOLDER: &str = "127.0.0.1";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    /// Network address
    network: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is treated as a single host (/32 or /128).
    /// Returns `None` if the format is invalid.
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
            Some(p) => p.parse::<u8>().ok().filter(|len| *len <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            // IPv4 and IPv6 don't match
            _ => false,
        }
    }
}

/// Configuration for trusted proxy validation.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Create a new trusted proxy configuration from CIDR strings.
    ///
    /// Invalid CIDR strings are logged as warnings and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    /// Check if trusted proxy validation is enabled (any ranges configured).
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Check if a peer may supply forwarding headers.
    ///
    /// Every peer is trusted when no ranges are configured.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// First non-empty address from the forwarding headers.
fn forwarded_ip<B>(req: &Request<B>) -> Option<&str> {
    // Format: "client, proxy1, proxy2" - the first entry is the client
    if let Some(value) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        && let Some(first) = value.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return Some(first);
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Resolve the client identifier for a request.
///
/// Returns `Cow::Borrowed` for the placeholder, so the common "nothing known"
/// case allocates nothing.
pub fn client_ip<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = peer_ip(req);

    if let Some(peer) = peer
        && !trusted_proxies.is_trusted(&peer)
    {
        if forwarded_ip(req).is_some() {
            debug!(peer = %peer, "Ignoring forwarding headers from untrusted peer");
        }
        return Cow::Owned(peer.to_string());
    }

    if let Some(ip) = forwarded_ip(req) {
        return Cow::Owned(ip.to_string());
    }

    match peer {
        Some(peer) => Cow::Owned(peer.to_string()),
        None => Cow::Borrowed(LOOPBACK_PLACEHOLDER),
    }
}
