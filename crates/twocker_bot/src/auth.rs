//! HTTP Basic authentication for the control surface.

use crate::api::{ApiResponse, ApiState};
use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Identity used when authentication is disabled.
const ANONYMOUS: &str = "anonymous";

/// Operator credentials.
#[derive(Clone)]
pub struct AuthConfig {
    enabled: bool,
    username: String,
    password: String,
}

impl AuthConfig {
    /// Require `username` and `password` on protected routes.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            enabled: true,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Let every request through.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            password: String::new(),
        }
    }

    /// Whether credentials are required.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Compare in constant time. Both fields are always compared.
    fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(self.password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Caller identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"twocker\"")],
        Json(ApiResponse::error("Invalid credentials")),
    )
        .into_response()
}

fn locked_out() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ApiResponse::error(
            "Too many failed login attempts. Please try again later.",
        )),
    )
        .into_response()
}

/// Middleware guarding every route except `/health`.
///
/// Failed attempts count against the submitted username. Once the login
/// limiter trips, even correct credentials are refused until the window
/// passes. A success clears the count.
pub(crate) async fn require_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth = state.auth();
    if !auth.enabled() {
        request
            .extensions_mut()
            .insert(Identity(ANONYMOUS.to_string()));
        return next.run(request).await;
    }

    let Some((username, password)) = basic_credentials(request.headers()) else {
        debug!("Request without credentials");
        return unauthorized();
    };

    let limiter = state.login_limiter();
    if limiter.is_limited(&username) {
        warn!(username = %username, "Login locked out");
        return locked_out();
    }

    if !auth.verify(&username, &password) {
        limiter.record(&username);
        warn!(username = %username, "Failed login attempt");
        return unauthorized();
    }

    limiter.clear(&username);
    request.extensions_mut().insert(Identity(username));
    next.run(request).await
}
