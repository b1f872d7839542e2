//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets and propagates X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Session Gate    │ ← 307 to /login or / (skips /api)
//! └────────┬─────────┘
//!          ├──────────────── /api ───────┐
//!          ▼                             ▼
//!     page shell,               ┌──────────────────┐
//!     /health, /ready           │  Rate Limiting   │ ← 429 if exceeded
//!                               └────────┬─────────┘
//!                                        ▼
//!                                   API handlers
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/ready` - Health & monitoring
//! - `/api/auth/session` - Session introspection; other `/api` paths are 404
//! - everything else - Page shell

use axum::Router;
use axum::http::HeaderName;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::route_class::API_PREFIX;
use crate::middleware::{FixedWindowLimiter, RateLimitLayer, SessionGate};
use crate::state::AppState;

/// Header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router with all routes and middleware configured.
///
/// - **Rate Limiting**: on the API namespace, unless `RATE_LIMIT_ENABLED=false`
/// - **Session Gate**: always on
/// - **CORS**: Configured from `cors_allowed_origins`
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    // =========================================================================
    // API namespace
    // =========================================================================
    let mut api = Router::new()
        .route("/auth/session", get(handlers::current_session))
        .fallback(handlers::api_not_found);

    if config.rate_limit_enabled {
        let limiter = FixedWindowLimiter::new(state.rate_store.clone());
        info!(
            backend = state.rate_store.backend(),
            max_requests = limiter.max_requests(),
            trusted_proxies = config.trusted_proxies.len(),
            "Rate limiting enabled"
        );
        api = api.layer(RateLimitLayer::new(limiter, &config.trusted_proxies));
    } else {
        warn!("Rate limiting disabled (RATE_LIMIT_ENABLED=false)");
    }

    // =========================================================================
    // Build Router with Routes
    // =========================================================================
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let gate = SessionGate::new(state.sessions.clone());

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .nest(API_PREFIX, api)
        .fallback(handlers::page_shell)
        // Applied bottom to top: the last layer sees the request first
        .layer(gate)
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
