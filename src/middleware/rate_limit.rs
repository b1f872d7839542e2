//! Fixed-window rate limiting middleware.
//!
//! # Algorithm
//!
//! Each client gets one counter per window, keyed `rate-limit:<client-ip>`:
//!
//! 1. `INCR` the key (the store creates it at 1 when absent)
//! 2. If the result is 1, this request opened the window: `EXPIRE key 60`
//! 3. If the result exceeds the ceiling, reject with 429
//!
//! The window starts at the first request, not at a wall-clock boundary, and
//! resets when the key expires.
//!
//! # Known Limitation
//!
//! `INCR` and `EXPIRE` are separate commands. If `EXPIRE` fails after the
//! creating `INCR`, the key has no TTL and the client's window never resets.
//! Later requests do not retry the `EXPIRE`.
//!
//! # Failure Handling
//!
//! Store errors fail **open**: the request is allowed, the error is logged and
//! counted, and nothing propagates to the client. Losing the store must not
//! take the API down with it.
//!
//! # Response Headers
//!
//! Allowed and rejected responses carry:
//! - `X-RateLimit-Limit`: Requests allowed per window
//! - `X-RateLimit-Remaining`: Requests left in the current window
//!
//! Fail-open responses carry neither, since the count is unknown.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::Json;
use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use super::ip::{TrustedProxyConfig, client_ip};
use crate::config::{RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW_SECS};
use crate::metrics;
use crate::rate_store::{RateStore, StoreResult};

/// Body message of the 429 response.
pub const RATE_LIMITED_MESSAGE: &str = "Limite de requisições excedido";

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";

const KEY_PREFIX: &str = "rate-limit:";

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Within the window's budget; `count` is this request's position in the window.
    Allowed { count: i64 },
    /// Over budget.
    Limited { count: i64 },
    /// The store failed, so the request is let through uncounted.
    FailOpen,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateDecision::Limited { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateDecision::Allowed { .. } => "allowed",
            RateDecision::Limited { .. } => "limited",
            RateDecision::FailOpen => "fail_open",
        }
    }
}

/// Store key for a client.
pub fn rate_limit_key(client_id: &str) -> String {
    format!("{KEY_PREFIX}{client_id}")
}

/// Fixed-window counter over a [`RateStore`].
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn RateStore>,
    window_secs: u64,
    max_requests: u32,
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("backend", &self.store.backend())
            .field("window_secs", &self.window_secs)
            .field("max_requests", &self.max_requests)
            .finish()
    }
}

impl FixedWindowLimiter {
    /// Limiter with the compiled-in window (60 s) and ceiling (60 requests).
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self::with_limits(store, RATE_LIMIT_WINDOW_SECS, RATE_LIMIT_MAX_REQUESTS)
    }

    pub fn with_limits(store: Arc<dyn RateStore>, window_secs: u64, max_requests: u32) -> Self {
        Self {
            store,
            window_secs,
            max_requests,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request from `client_id` and decide whether it may proceed.
    ///
    /// Never returns an error: store failures become [`RateDecision::FailOpen`].
    pub async fn check(&self, client_id: &str) -> RateDecision {
        let key = rate_limit_key(client_id);

        let count = match timed("INCR", self.store.incr(&key)).await {
            Ok(count) => count,
            Err(e) => {
                error!(key = %key, error = %e, "Rate store INCR failed, allowing request");
                return self.record(RateDecision::FailOpen);
            }
        };

        if count == 1 {
            match timed("EXPIRE", self.store.expire(&key, self.window_secs)).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(key = %key, "Rate store EXPIRE found no key");
                }
                Err(e) => {
                    // The key is left without a TTL; the request itself still counts.
                    error!(key = %key, error = %e, "Rate store EXPIRE failed, allowing request");
                    return self.record(RateDecision::FailOpen);
                }
            }
        }

        let decision = if count > i64::from(self.max_requests) {
            RateDecision::Limited { count }
        } else {
            RateDecision::Allowed { count }
        };
        self.record(decision)
    }

    /// Requests left in the window after `count` requests.
    pub fn remaining(&self, count: i64) -> i64 {
        (i64::from(self.max_requests) - count).max(0)
    }

    fn record(&self, decision: RateDecision) -> RateDecision {
        metrics::record_rate_limit_decision(decision.as_str());
        decision
    }
}

/// Await a store command, recording its latency and any failure.
async fn timed<T>(
    command: &'static str,
    fut: impl std::future::Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    let start = Instant::now();
    let result = fut.await;
    metrics::record_store_duration(command, start.elapsed().as_secs_f64());
    if result.is_err() {
        metrics::record_store_error(command);
    }
    result
}

/// The 429 response.
pub fn rate_limited_response(limit: u32) -> Response<Body> {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": RATE_LIMITED_MESSAGE })),
    )
        .into_response();
    set_rate_headers(&mut response, limit, 0);
    response
}

fn set_rate_headers(response: &mut Response<Body>, limit: u32, remaining: i64) {
    let headers = response.headers_mut();
    headers.insert(HEADER_LIMIT, HeaderValue::from(limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(remaining));
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let store: Arc<dyn RateStore> = Arc::new(MemoryRateStore::new());
/// let layer = RateLimitLayer::new(FixedWindowLimiter::new(store), &[]);
/// let api = Router::new()
///     .route("/projects", get(handler))
///     .layer(layer);
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: FixedWindowLimiter,
    /// Trusted proxy configuration for IP spoofing mitigation
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(limiter: FixedWindowLimiter, trusted_proxies: &[String]) -> Self {
        Self {
            limiter,
            trusted_proxies: Arc::new(TrustedProxyConfig::new(trusted_proxies)),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: FixedWindowLimiter,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        // Extract client IP before moving req
        let client = client_ip(&req, &self.trusted_proxies).into_owned();

        Box::pin(async move {
            let decision = limiter.check(&client).await;
            let limit = limiter.max_requests();

            match decision {
                RateDecision::Allowed { count } => {
                    debug!(client_ip = %client, count, "Rate limit check passed");
                    let mut response = inner.call(req).await?;
                    set_rate_headers(&mut response, limit, limiter.remaining(count));
                    Ok(response)
                }
                RateDecision::FailOpen => inner.call(req).await,
                RateDecision::Limited { count } => {
                    warn!(
                        client_ip = %client,
                        path = %req.uri().path(),
                        count,
                        "Rate limit exceeded for IP"
                    );
                    Ok(rate_limited_response(limit))
                }
            }
        })
    }
}
