//! HTTP middleware making up the request admission path.
//!
//! - **Session Gate**: classifies the path and redirects visitors without a
//!   session away from protected pages, and signed-in users away from
//!   login/register
//! - **Rate Limiting**: fixed-window counter per client IP in a shared store,
//!   failing open when the store is unavailable
//! - **Client IP / Trusted Proxies**: which address a request is counted against
//!
//! # Architecture
//!
//! ```text
//! Request → Session Gate ──→ page handlers
//!              ↓   └─ /api ─→ Rate Limiter → API handlers
//!         307 redirect            ↓
//!                          429 Too Many Requests
//! ```
//!
//! The gates are independent: neither reads the other's outcome.

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod route_class;

pub use auth::{GateAction, SessionGate, decide, login_redirect_location};
pub use ip::{LOOPBACK_PLACEHOLDER, TrustedProxyConfig, client_ip};
pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimitLayer};
pub use route_class::{RouteClass, RouteRule, RouteTable};
