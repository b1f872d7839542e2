//! Session gate middleware.
//!
//! Decides, per request, whether to pass it through or redirect, based on the
//! path's [`RouteClass`] and whether the request carries a valid session token.
//!
//! # Decision Table
//!
//! | Route class | Session? | Action                                        |
//! |-------------|----------|-----------------------------------------------|
//! | api         | either   | pass through, token not even decoded          |
//! | protected   | no       | redirect to `/login?callbackUrl=<path>`       |
//! | protected   | yes      | pass through                                  |
//! | auth-only   | yes      | redirect to `/`                               |
//! | auth-only   | no       | pass through                                  |
//! | public      | either   | pass through                                  |
//!
//! API routes are skipped because they authorize requests themselves and
//! answer with JSON errors rather than redirects.
//!
//! # Failure Handling
//!
//! A token that fails verification for any reason counts as no session, so a
//! protected route fails closed to the login redirect. The gate never mutates
//! session state.
//!
//! Redirects use `307 Temporary Redirect`.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::{IntoResponse, Redirect};
use tower::{Layer, Service};
use tracing::{debug, info};

use super::route_class::{CALLBACK_PARAM, LOGIN_PATH, ROOT_PATH, RouteClass, RouteTable};
use crate::metrics;
use crate::session::SessionVerifier;

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Hand the request to the inner service
    Allow,
    /// Send the visitor to the login page, remembering where they were going
    RedirectToLogin,
    /// Send a signed-in user away from login/register
    RedirectToRoot,
}

impl GateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateAction::Allow => "allow",
            GateAction::RedirectToLogin => "redirect_login",
            GateAction::RedirectToRoot => "redirect_root",
        }
    }
}

/// Apply the decision table.
pub fn decide(class: RouteClass, authenticated: bool) -> GateAction {
    match (class, authenticated) {
        (RouteClass::Protected, false) => GateAction::RedirectToLogin,
        (RouteClass::AuthOnly, true) => GateAction::RedirectToRoot,
        (RouteClass::Protected, true)
        | (RouteClass::AuthOnly, false)
        | (RouteClass::Public, _)
        | (RouteClass::Api, _) => GateAction::Allow,
    }
}

/// `Location` for the login redirect: the original path, URL-encoded, as the
/// callback parameter.
pub fn login_redirect_location(original_path: &str) -> String {
    format!(
        "{LOGIN_PATH}?{CALLBACK_PARAM}={}",
        urlencoding::encode(original_path)
    )
}

/// Session gate layer.
///
/// # Example
///
/// ```rust,ignore
/// let gate = SessionGate::new(verifier);
/// let app = Router::new()
///     .route("/dashboard", get(handler))
///     .layer(gate);
/// ```
#[derive(Clone)]
pub struct SessionGate {
    verifier: SessionVerifier,
    routes: Arc<RouteTable>,
}

impl SessionGate {
    /// Create a gate over the default route table.
    pub fn new(verifier: SessionVerifier) -> Self {
        Self::with_routes(verifier, RouteTable::default())
    }

    /// Create a gate over a custom route table.
    pub fn with_routes(verifier: SessionVerifier, routes: RouteTable) -> Self {
        Self {
            verifier,
            routes: Arc::new(routes),
        }
    }
}

impl<S> Layer<S> for SessionGate {
    type Service = SessionGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionGateService {
            inner,
            verifier: self.verifier.clone(),
            routes: self.routes.clone(),
        }
    }
}

/// Session gate service wrapper.
#[derive(Clone)]
pub struct SessionGateService<S> {
    inner: S,
    verifier: SessionVerifier,
    routes: Arc<RouteTable>,
}

impl<S> Service<Request<Body>> for SessionGateService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let class = self.routes.classify(req.uri().path());

        if class == RouteClass::Api {
            metrics::record_gate_decision(class.as_str(), "bypass");
            return Box::pin(async move { inner.call(req).await });
        }

        let session = self.verifier.session_from_headers(req.headers());
        let action = decide(class, session.is_some());
        metrics::record_gate_decision(class.as_str(), action.as_str());

        let path = req.uri().path();
        let response = match action {
            GateAction::Allow => {
                debug!(path, class = %class, authenticated = session.is_some(), "Gate pass");
                if let Some(session) = session {
                    req.extensions_mut().insert(session);
                }
                return Box::pin(async move { inner.call(req).await });
            }
            GateAction::RedirectToLogin => {
                info!(path, "No valid session for protected route, redirecting to login");
                Redirect::temporary(&login_redirect_location(path)).into_response()
            }
            GateAction::RedirectToRoot => {
                info!(path, "Signed-in user on auth-only route, redirecting to root");
                Redirect::temporary(ROOT_PATH).into_response()
            }
        };

        Box::pin(async move { Ok(response) })
    }
}
