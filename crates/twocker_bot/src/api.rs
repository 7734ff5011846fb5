//! HTTP control surface.

use crate::auth::{AuthConfig, Identity, require_auth};
use crate::service::BotService;
use crate::state::ConfigDelta;
use axum::{
    Extension, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};
use twocker_error::{TwockerError, TwockerErrorKind};
use twocker_rate_limit::SlidingWindowLimiter;

/// Status lookups left in the caller's window.
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// API state shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    service: BotService,
    auth: Arc<AuthConfig>,
    login_limiter: Arc<SlidingWindowLimiter>,
}

impl ApiState {
    /// Creates new API state.
    pub fn new(
        service: BotService,
        auth: AuthConfig,
        login_limiter: Arc<SlidingWindowLimiter>,
    ) -> Self {
        Self {
            service,
            auth: Arc::new(auth),
            login_limiter,
        }
    }

    /// Control facade.
    pub fn service(&self) -> &BotService {
        &self.service
    }

    pub(crate) fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub(crate) fn login_limiter(&self) -> &SlidingWindowLimiter {
        &self.login_limiter
    }
}

/// Envelope for control responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    /// `success` or `error`
    pub status: &'static str,
    /// Human readable outcome
    pub message: String,
    /// Payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    /// Successful outcome with a payload.
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        }
    }

    /// Failed outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data: None,
        }
    }
}

/// Maps domain errors to status codes.
struct ApiError(TwockerError);

impl From<TwockerError> for ApiError {
    fn from(err: TwockerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0.kind() {
            TwockerErrorKind::Validation(e) => (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("Invalid {}: {}", e.field, e.reason))),
            )
                .into_response(),
            TwockerErrorKind::RateLimit(e) => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ApiResponse::error("Rate limit exceeded")),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&e.retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            TwockerErrorKind::Upstream(e) => {
                error!(error = %e, "Upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ApiResponse::error("Twitch is unavailable")),
                )
                    .into_response()
            }
            _ => {
                error!(error = %self.0, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("Internal error")),
                )
                    .into_response()
            }
        }
    }
}

/// Creates the control API router.
///
/// `/health` is open. Every other route sits behind [`AuthConfig`].
pub fn create_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/settings", get(get_settings))
        .route("/update_settings", post(update_settings))
        .route("/toggle_bot", post(toggle_bot))
        .route("/channel_status/:channel", get(channel_status))
        .route("/channel_emotes/:channel", get(channel_emotes))
        .route("/bot_info", get(bot_info))
        .route("/cache_stats", get(cache_stats))
        .route("/logs", get(logs))
        .route("/check_live/:channel", get(check_live))
        .route("/check_follow/:channel", get(check_follow))
        .route("/check_ban/:channel", get(check_ban))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.service.health()))
}

async fn get_settings(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ApiResponse::success(
        "Current settings",
        json!(state.service.config()),
    ))
}

async fn update_settings(
    State(state): State<ApiState>,
    body: Result<Json<ConfigDelta>, JsonRejection>,
) -> Result<Response, ApiError> {
    let delta = match body {
        Ok(Json(delta)) => delta,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable settings body");
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!(
                    "Invalid request body: {}",
                    rejection.body_text()
                ))),
            )
                .into_response());
        }
    };
    let config = state.service.update_config(&delta).await?;
    Ok(Json(ApiResponse::success("Settings updated successfully", json!(config))).into_response())
}

async fn toggle_bot(State(state): State<ApiState>) -> Result<Json<ApiResponse>, ApiError> {
    let is_active = state.service.toggle().await?;
    let message = if is_active {
        "Bot activated"
    } else {
        "Bot deactivated"
    };
    Ok(Json(ApiResponse::success(
        message,
        json!({ "is_active": is_active }),
    )))
}

/// Attach the caller's remaining status allowance.
fn with_allowance(state: &ApiState, identity: &Identity, body: Value) -> Response {
    let mut response = Json(body).into_response();
    let remaining = state.service.status_allowance(&identity.0);
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    response
}

async fn channel_status(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.service.get_status(&identity.0, &channel).await?;
    Ok(with_allowance(&state, &identity, json!(status)))
}

async fn channel_emotes(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let emotes = state.service.channel_emotes(&identity.0, &channel).await?;
    Ok(with_allowance(&state, &identity, json!({ "emotes": emotes })))
}

async fn check_live(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.service.get_status(&identity.0, &channel).await?;
    Ok(with_allowance(&state, &identity, json!({ "is_live": status.is_live })))
}

async fn check_follow(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.service.get_status(&identity.0, &channel).await?;
    Ok(with_allowance(
        &state,
        &identity,
        json!({ "is_following": status.is_following }),
    ))
}

async fn check_ban(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.service.get_status(&identity.0, &channel).await?;
    Ok(with_allowance(&state, &identity, json!({ "is_banned": status.is_banned })))
}

/// Activity as server-sent events: the retained history, then live events
/// until the client goes away.
async fn logs(State(state): State<ApiState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (history, mut live) = state.service.events().subscribe();
    let stream = async_stream::stream! {
        for event in history {
            yield Ok(Event::default().event("message").data(event.to_string()));
        }
        loop {
            match live.recv().await {
                Ok(event) => {
                    yield Ok(Event::default().event("message").data(event.to_string()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Log subscriber fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn bot_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.service.bot_info().await)
}

async fn cache_stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.service.get_cache_stats())
}
