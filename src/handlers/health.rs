//! Health and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check with rate store status
//! - `GET /ready` - Kubernetes-compatible readiness probe
//!
//! # Health vs Readiness
//!
//! - **Health** (`/health`): Returns 200 even if degraded, includes details
//! - **Readiness** (`/ready`): Returns 503 once shutdown has begun
//!
//! A down rate store only degrades health. The limiter fails open, so the
//! service still serves traffic without it.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "rate_store": "redis",
///   "rate_store_connected": true,
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let rate_store_connected = state.store_connected();

    Json(HealthResponse {
        status: if rate_store_connected {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        rate_store: state.rate_store.backend().to_string(),
        rate_store_connected,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
///
/// ```yaml
/// readinessProbe:
///   httpGet:
///     path: /ready
///     port: 3000
/// ```
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.is_shutting_down() {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(StatusCode::OK)
    }
}
