//! Session token decoding.
//!
//! Session tokens are HS256 JWTs issued by the identity provider and signed
//! with the shared `SESSION_SECRET`. This module only reads them; it never
//! refreshes, rotates, or revokes a session.
//!
//! # Token Sources
//!
//! Checked in order, first hit wins:
//!
//! 1. A cookie with one of the configured names (`session-token`,
//!    `__Secure-session-token` by default)
//! 2. The chunked form of that cookie, `<name>.0`, `<name>.1`, ... concatenated
//!    in index order, used by providers whose tokens outgrow one cookie
//! 3. An `Authorization: Bearer <token>` header
//!
//! Any decoding failure (bad signature, expired, malformed, missing `sub`)
//! yields `None`. Callers treat that exactly like an absent token.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Upper bound on cookie chunks stitched together.
const MAX_COOKIE_CHUNKS: usize = 16;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User identifier
    pub sub: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
    /// Issued-at, seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Token identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional role claim (e.g. "admin", "member")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl SessionClaims {
    /// Claims for `user_id` expiring `ttl_secs` from now.
    pub fn new(user_id: impl Into<String>, ttl_secs: u64) -> Self {
        let now = now_secs();
        Self {
            sub: user_id.into(),
            exp: now.saturating_add(ttl_secs),
            iat: Some(now),
            jti: Some(Uuid::new_v4().to_string()),
            name: None,
            email: None,
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.email = Some(email.into());
        self
    }
}

/// A verified session, as seen by downstream handlers.
///
/// The session gate inserts this into request extensions when a request
/// carries a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub claims: SessionClaims,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> Option<&str> {
        self.claims.role.as_deref()
    }
}

/// Verifies session tokens against the shared secret.
///
/// Cheap to clone; keys and cookie names are behind `Arc`.
#[derive(Clone)]
pub struct SessionVerifier {
    decoding_key: Arc<DecodingKey>,
    encoding_key: Arc<EncodingKey>,
    validation: Arc<Validation>,
    cookie_names: Arc<Vec<String>>,
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("cookie_names", &self.cookie_names)
            .finish_non_exhaustive()
    }
}

impl SessionVerifier {
    /// Create a verifier.
    ///
    /// # Arguments
    ///
    /// * `secret` - Shared HS256 signing secret
    /// * `cookie_names` - Cookie names that may carry the token, in lookup order
    pub fn new(secret: &str, cookie_names: Vec<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(validation),
            cookie_names: Arc::new(cookie_names),
        }
    }

    /// Decode and verify a raw token. Returns `None` on any failure.
    pub fn verify(&self, token: &str) -> Option<Session> {
        match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(Session {
                claims: data.claims,
            }),
            Ok(_) => {
                debug!("Session token has an empty subject");
                None
            }
            Err(e) => {
                debug!(error = %e, "Session token rejected");
                None
            }
        }
    }

    /// Find the token in the request headers and verify it.
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Option<Session> {
        let token = self.extract_token(headers)?;
        self.verify(&token)
    }

    /// Locate the raw token in cookies or the `Authorization` header.
    pub fn extract_token(&self, headers: &HeaderMap) -> Option<String> {
        let cookies: Vec<(&str, &str)> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect();

        for name in self.cookie_names.iter() {
            if let Some((_, value)) = cookies.iter().find(|(n, _)| *n == name.as_str()) {
                return Some((*value).to_string());
            }
            if let Some(joined) = join_cookie_chunks(&cookies, name) {
                return Some(joined);
            }
        }

        bearer_token(headers).map(str::to_string)
    }

    /// Sign claims into a token with the shared secret.
    ///
    /// Tokens are normally issued by the identity provider; this exists for
    /// tooling and tests that need a token the gate will accept.
    ///
    /// # Errors
    ///
    /// Returns the underlying `jsonwebtoken` error if encoding fails.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
    }
}

/// Split a `Cookie` header value into `(name, value)` pairs.
///
/// Malformed pairs (no `=`, empty name) are skipped. Values wrapped in double
/// quotes are unquoted.
pub fn parse_cookie_header(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some((name, value))
    })
}

/// Concatenate `<name>.0`, `<name>.1`, ... until the first missing index.
fn join_cookie_chunks(cookies: &[(&str, &str)], name: &str) -> Option<String> {
    let mut joined = String::new();
    for index in 0..MAX_COOKIE_CHUNKS {
        let chunk_name = format!("{name}.{index}");
        match cookies.iter().find(|(n, _)| *n == chunk_name) {
            Some((_, value)) => joined.push_str(value),
            None => break,
        }
    }
    (!joined.is_empty()).then_some(joined)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
