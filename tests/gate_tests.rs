//! Router-level tests for the admission path.
//!
//! Drive the full Axum router in-process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory rate store (or a store that always fails).
//!
//! Run with: `cargo test --test gate_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use admission_gate::rate_store::{MemoryRateStore, RateStore, StoreError, StoreResult};
use admission_gate::{AppState, Config, SessionClaims, SessionVerifier, build_router};

// ============================================================================
// Fixtures
// ============================================================================

/// Store that is always unreachable.
struct UnreachableStore;

#[async_trait]
impl RateStore for UnreachableStore {
    async fn incr(&self, _key: &str) -> StoreResult<i64> {
        Err(StoreError::Connection("connection refused".into()))
    }
    async fn expire(&self, _key: &str, _seconds: u64) -> StoreResult<bool> {
        Err(StoreError::Connection("connection refused".into()))
    }
    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Connection("connection refused".into()))
    }
    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with(Config::default(), Arc::new(MemoryRateStore::new()))
    }

    fn with(config: Config, store: Arc<dyn RateStore>) -> Self {
        let state = AppState::new(config, store);
        let router = build_router(state.clone());
        Self { router, state }
    }

    fn token(&self, claims: &SessionClaims) -> String {
        self.state.sessions.issue(claims).unwrap()
    }

    fn valid_token(&self) -> String {
        self.token(&SessionClaims::new("user-1", 3600).with_role("member"))
    }

    async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, path: &str) -> Response<Body> {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    async fn get_with_cookie(&self, path: &str, cookie: &str) -> Response<Body> {
        self.send(
            Request::get(path)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn get_from(&self, path: &str, client_ip: &str) -> Response<Body> {
        self.send(
            Request::get(path)
                .header("x-forwarded-for", client_ip)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Session Gate
// ============================================================================

#[tokio::test]
async fn test_protected_route_without_session_redirects_to_login() {
    let app = TestApp::new();

    let response = app.get("/projects/42").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/login?callbackUrl=%2Fprojects%2F42");
}

#[tokio::test]
async fn test_root_without_session_redirects_to_login() {
    let app = TestApp::new();

    let response = app.get("/").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/login?callbackUrl=%2F");
}

#[tokio::test]
async fn test_callback_carries_path_only() {
    let app = TestApp::new();

    let response = app.get("/tasks?filter=open").await;

    assert_eq!(location(&response), "/login?callbackUrl=%2Ftasks");
}

#[tokio::test]
async fn test_protected_route_with_session_passes() {
    let app = TestApp::new();
    let cookie = format!("session-token={}", app.valid_token());

    let response = app.get_with_cookie("/dashboard", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Signed in as user-1"));
}

#[tokio::test]
async fn test_secure_cookie_name_accepted() {
    let app = TestApp::new();
    let cookie = format!("theme=dark; __Secure-session-token={}", app.valid_token());

    let response = app.get_with_cookie("/settings/profile", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chunked_cookie_accepted() {
    let app = TestApp::new();
    let token = app.valid_token();
    let (head, tail) = token.split_at(token.len() / 2);
    let cookie = format!("session-token.1={tail}; session-token.0={head}");

    let response = app.get_with_cookie("/teams", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let app = TestApp::new();
    let request = Request::get("/projects")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.valid_token()))
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_token_is_unauthenticated() {
    let app = TestApp::new();
    let mut claims = SessionClaims::new("user-1", 3600);
    claims.exp = 1_000_000_000;
    let cookie = format!("session-token={}", app.token(&claims));

    let response = app.get_with_cookie("/dashboard", &cookie).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_unauthenticated() {
    let app = TestApp::new();
    let foreign = SessionVerifier::new(
        "some-other-secret-that-is-long-enough-1234",
        vec!["session-token".to_string()],
    );
    let token = foreign.issue(&SessionClaims::new("user-1", 3600)).unwrap();

    let response = app
        .get_with_cookie("/dashboard", &format!("session-token={token}"))
        .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_garbage_token_is_unauthenticated() {
    let app = TestApp::new();

    let response = app
        .get_with_cookie("/dashboard", "session-token=not.a.jwt")
        .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_auth_only_routes_redirect_signed_in_users_to_root() {
    let app = TestApp::new();
    let cookie = format!("session-token={}", app.valid_token());

    for path in ["/login", "/register"] {
        let response = app.get_with_cookie(path, &cookie).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{path}");
        assert_eq!(location(&response), "/", "{path}");
    }
}

#[tokio::test]
async fn test_auth_only_routes_open_to_visitors() {
    let app = TestApp::new();

    let response = app.get("/login").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("data-form=\"/login\""));
}

#[tokio::test]
async fn test_public_route_open_to_everyone() {
    let app = TestApp::new();
    let cookie = format!("session-token={}", app.valid_token());

    assert_eq!(app.get("/about").await.status(), StatusCode::OK);
    assert_eq!(
        app.get_with_cookie("/about", &cookie).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_api_is_not_redirected_regardless_of_token() {
    let app = TestApp::new();

    let no_token = app.get("/api/auth/session").await;
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

    let bad_token = app
        .get_with_cookie("/api/auth/session", "session-token=garbage")
        .await;
    assert_eq!(bad_token.status(), StatusCode::UNAUTHORIZED);

    let unknown = app.get("/api/projects").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(unknown).await["error"], "not_found");
}

#[tokio::test]
async fn test_session_endpoint_returns_user() {
    let app = TestApp::new();
    let claims = SessionClaims::new("user-7", 3600)
        .with_role("admin")
        .with_profile("Bia", "bia@example.com");
    let cookie = format!("session-token={}", app.token(&claims));

    let response = app.get_with_cookie("/api/auth/session", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["id"], "user-7");
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["email"], "bia@example.com");
    assert!(body["expires"].is_string());
}

// ============================================================================
// Rate Limiter
// ============================================================================

#[tokio::test]
async fn test_sixty_requests_allowed_then_rejected() {
    let app = TestApp::new();

    for n in 1..=60 {
        let response = app.get_from("/api/auth/session", "203.0.113.7").await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS, "request {n}");
        assert_eq!(response.headers()["x-ratelimit-limit"], "60");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (60 - n).to_string().as_str()
        );
    }

    let response = app.get_from("/api/auth/session", "203.0.113.7").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "error": "Limite de requisições excedido" }));
}

#[tokio::test]
async fn test_clients_have_separate_windows() {
    let app = TestApp::new();

    for _ in 0..61 {
        app.get_from("/api/auth/session", "203.0.113.7").await;
    }

    let other = app.get_from("/api/auth/session", "198.51.100.1").await;
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_clients_without_address_share_placeholder_bucket() {
    let app = TestApp::new();

    for _ in 0..60 {
        app.get("/api/auth/session").await;
    }

    let response = app.get_from("/api/auth/session", "127.0.0.1").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(start_paused = true)]
async fn test_window_resets_after_expiry() {
    let app = TestApp::new();

    for _ in 0..61 {
        app.get_from("/api/auth/session", "203.0.113.7").await;
    }
    assert_eq!(
        app.get_from("/api/auth/session", "203.0.113.7").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::advance(Duration::from_secs(61)).await;

    let response = app.get_from("/api/auth/session", "203.0.113.7").await;
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "59");
}

#[tokio::test]
async fn test_store_failure_fails_open() {
    let app = TestApp::with(Config::default(), Arc::new(UnreachableStore));

    for _ in 0..100 {
        let response = app.get_from("/api/auth/session", "203.0.113.7").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_pages_are_not_counted() {
    let app = TestApp::new();

    for _ in 0..100 {
        app.get_from("/about", "203.0.113.7").await;
    }

    let response = app.get_from("/api/auth/session", "203.0.113.7").await;
    assert_eq!(response.headers()["x-ratelimit-remaining"], "59");
}

#[tokio::test]
async fn test_rate_limit_can_be_disabled() {
    let config = Config {
        rate_limit_enabled: false,
        ..Config::default()
    };
    let app = TestApp::with(config, Arc::new(MemoryRateStore::new()));

    for _ in 0..70 {
        let response = app.get_from("/api/auth/session", "203.0.113.7").await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}

#[tokio::test]
async fn test_untrusted_peer_cannot_spoof_forwarded_for() {
    use axum::extract::ConnectInfo;
    use std::net::SocketAddr;

    let config = Config {
        trusted_proxies: vec!["10.0.0.0/8".to_string()],
        ..Config::default()
    };
    let app = TestApp::with(config, Arc::new(MemoryRateStore::new()));
    let peer: SocketAddr = "203.0.113.7:40000".parse().unwrap();

    // Rotating X-Forwarded-For does not escape the peer's window
    for n in 0..61 {
        let mut request = Request::get("/api/auth/session")
            .header("x-forwarded-for", format!("192.0.2.{n}"))
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        let response = app.send(request).await;

        if n < 60 {
            assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        } else {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }
}

// ============================================================================
// Health & Ambient Layers
// ============================================================================

#[tokio::test]
async fn test_health_reports_store() {
    let app = TestApp::new();

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["rate_store"], "memory");
    assert_eq!(body["rate_store_connected"], true);
}

#[tokio::test]
async fn test_health_degraded_when_store_down() {
    let app = TestApp::with(Config::default(), Arc::new(UnreachableStore));
    app.state.check_store().await;

    let body = body_json(app.get("/health").await).await;

    assert_eq!(body["status"], "degraded");
    assert_eq!(body["rate_store_connected"], false);
}

#[tokio::test]
async fn test_ready_until_shutdown() {
    let app = TestApp::new();
    assert_eq!(app.get("/ready").await.status(), StatusCode::OK);

    app.state.shutdown().await;

    assert_eq!(
        app.get("/ready").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_request_id_is_set_and_propagated() {
    let app = TestApp::new();

    let generated = app.get("/health").await;
    assert!(generated.headers().contains_key("x-request-id"));

    let request = Request::get("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let propagated = app.send(request).await;
    assert_eq!(propagated.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_redirects_also_carry_request_id() {
    let app = TestApp::new();

    let response = app.get("/dashboard").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(response.headers().contains_key("x-request-id"));
}
