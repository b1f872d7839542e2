use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the rate store is unreachable
    pub status: String,
    /// Rate store backend (`redis` or `memory`)
    pub rate_store: String,
    /// Result of the last store ping
    pub rate_store_connected: bool,
    /// Service version
    pub version: String,
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// User part of the session response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Body of `GET /api/auth/session`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    /// When the token expires
    pub expires: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        let claims = &session.claims;
        let expires = i64::try_from(claims.exp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            user: SessionUser {
                id: claims.sub.clone(),
                name: claims.name.clone(),
                email: claims.email.clone(),
                role: claims.role.clone(),
            },
            expires,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::SessionClaims;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            rate_store: "memory".to_string(),
            rate_store_connected: true,
            version: "0.1.0".to_string(),
            uptime_seconds: 12,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"rate_store\":\"memory\""));
    }

    #[test]
    fn test_session_response_from_session() {
        let mut claims = SessionClaims::new("user-1", 3600)
            .with_role("admin")
            .with_profile("Ana", "ana@example.com");
        claims.exp = 1_700_000_000;
        let response = SessionResponse::from(&Session { claims });

        assert_eq!(response.user.id, "user-1");
        assert_eq!(response.user.role.as_deref(), Some("admin"));
        assert_eq!(response.user.email.as_deref(), Some("ana@example.com"));
        assert_eq!(response.expires.timestamp(), 1_700_000_000);
    }
}
