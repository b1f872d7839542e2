//! Session introspection under the API namespace.
//!
//! The session gate never touches `/api`, so this handler authorizes the
//! request itself and answers with JSON instead of redirecting.

use axum::Json;
use axum::extract::{OriginalUri, State};
use axum::http::HeaderMap;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::SessionResponse;
use crate::state::AppState;

/// `GET /api/auth/session`
///
/// Returns the signed-in user and the token's expiry, or 401.
#[instrument(skip(state, headers))]
pub async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<SessionResponse>> {
    let session = state
        .sessions
        .session_from_headers(&headers)
        .ok_or_else(|| AppError::Unauthorized("No valid session".to_string()))?;

    debug!(user_id = %session.user_id(), "Session lookup");
    Ok(Json(SessionResponse::from(&session)))
}

/// Fallback for unknown API routes.
pub async fn api_not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("No API route for {}", uri.path()))
}
