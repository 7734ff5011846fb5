//! Helix REST client.

use crate::api::{TwitchApi, normalize_login};
use crate::credentials::TwitchCredentials;
use crate::responses::{Emote, HelixPage, HelixStream, HelixUser};
use async_trait::async_trait;
use derive_getters::Getters;
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, instrument, warn};
use twocker_cache::{TtlCache, TtlCacheConfig};
use twocker_error::{ConfigError, UpstreamError, UpstreamErrorKind};
use twocker_rate_limit::UpstreamThrottle;

/// Production Helix endpoint.
pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Connection settings for the Helix client.
#[derive(Debug, Clone, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct HelixConfig {
    /// API root, without a trailing slash
    #[serde(default = "default_base_url")]
    base_url: String,
    /// Whole-request timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    /// Connect timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,
    /// Extra attempts after an `Unavailable` failure
    #[serde(default = "default_max_retries")]
    max_retries: usize,
    /// First retry delay (milliseconds)
    #[serde(default = "default_retry_base_ms")]
    retry_base_ms: u64,
    /// How long resolved login ids are remembered (seconds)
    #[serde(default = "default_user_id_ttl_secs")]
    user_id_ttl_secs: u64,
}

fn default_base_url() -> String {
    HELIX_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_user_id_ttl_secs() -> u64 {
    3600
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_id_ttl_secs: default_user_id_ttl_secs(),
        }
    }
}

/// Client for the Twitch Helix API.
///
/// Holds one pooled HTTP client for its whole life. Every attempt is paced by
/// the [`UpstreamThrottle`] and bounded, wait for capacity included, by the
/// configured timeout. Only `Unavailable` failures are retried, with jittered
/// backoff.
///
/// Failures are classified as:
/// - timeout, including waiting on the throttle: [`UpstreamErrorKind::Timeout`]
/// - connect failure, 5xx, 429: [`UpstreamErrorKind::Unavailable`]
/// - 401, 403: [`UpstreamErrorKind::Auth`]
/// - 404: [`UpstreamErrorKind::NotFound`]
/// - any other 4xx: [`UpstreamErrorKind::Rejected`]
/// - undecodable body: [`UpstreamErrorKind::Malformed`]
pub struct HelixClient {
    http: reqwest::Client,
    credentials: TwitchCredentials,
    config: HelixConfig,
    throttle: UpstreamThrottle,
    user_ids: TtlCache<String, String>,
}

impl HelixClient {
    /// Create a client.
    pub fn new(
        credentials: TwitchCredentials,
        config: HelixConfig,
        throttle: UpstreamThrottle,
    ) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build HTTP client: {}", e)))?;

        let user_ids = TtlCache::new(
            "helix_user_ids",
            &TtlCacheConfig::default().with_ttl_secs(config.user_id_ttl_secs),
        );

        debug!(base_url = %config.base_url, timeout_ms = config.timeout_ms, "Creating Helix client");
        Ok(Self {
            http,
            credentials,
            config,
            throttle,
            user_ids,
        })
    }

    /// Connection settings in use.
    pub fn config(&self) -> &HelixConfig {
        &self.config
    }

    #[instrument(skip(self))]
    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let strategy = ExponentialBackoff::from_millis(self.config.retry_base_ms)
            .factor(2)
            .max_delay(Duration::from_secs(4))
            .map(jitter)
            .take(self.config.max_retries);

        Retry::spawn(strategy, move || async move {
            match self.get_once(path, query).await {
                Ok(value) => Ok(value),
                Err(e) if matches!(e.kind(), UpstreamErrorKind::Unavailable(_)) => {
                    warn!(error = %e, "Helix unavailable, will retry");
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => Err(RetryError::Permanent(e)),
            }
        })
        .await
    }

    async fn get_once<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let deadline = Duration::from_millis(self.config.timeout_ms);
        tokio::time::timeout(deadline, self.attempt(path, query))
            .await
            .map_err(|_| {
                warn!(path, timeout_ms = self.config.timeout_ms, "Helix call exceeded deadline");
                UpstreamError::new(UpstreamErrorKind::Timeout(path.to_string()))
            })?
    }

    async fn attempt<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, path);
        let _permit = self.throttle.acquire().await;

        let response = self
            .http
            .get(&url)
            .query(query)
            .header("Client-Id", self.credentials.client_id())
            .bearer_auth(self.credentials.bearer())
            .send()
            .await
            .map_err(|e| classify_transport(path, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(path, e))?;

        if !status.is_success() {
            return Err(classify_status(path, status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            UpstreamError::new(UpstreamErrorKind::Malformed(format!(
                "{}: {}",
                path, e
            )))
        })
    }
}

fn classify_transport(path: &str, e: reqwest::Error) -> UpstreamError {
    let kind = if e.is_timeout() {
        UpstreamErrorKind::Timeout(path.to_string())
    } else if e.is_decode() {
        UpstreamErrorKind::Malformed(format!("{}: {}", path, e))
    } else {
        UpstreamErrorKind::Unavailable(format!("{}: {}", path, e))
    };
    UpstreamError::new(kind)
}

fn classify_status(path: &str, status: StatusCode, body: &str) -> UpstreamError {
    let message = format!("{} returned {}: {}", path, status, body.trim());
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamErrorKind::Auth {
            status_code: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => UpstreamErrorKind::Unavailable(message),
        StatusCode::NOT_FOUND => UpstreamErrorKind::NotFound(message),
        s if s.is_client_error() => UpstreamErrorKind::Rejected {
            status_code: s.as_u16(),
            message,
        },
        _ => UpstreamErrorKind::Unavailable(message),
    };
    UpstreamError::new(kind)
}

#[async_trait]
impl TwitchApi for HelixClient {
    #[instrument(skip(self))]
    async fn user_id(&self, login: &str) -> Result<String, UpstreamError> {
        let login = normalize_login(login);
        let lookup = login.clone();
        self.user_ids
            .get_or_fetch(login, move || async move {
                let page: HelixPage<HelixUser> =
                    self.get("/users", &[("login", lookup.as_str())]).await?;
                page.data
                    .into_iter()
                    .next()
                    .map(|user| user.id)
                    .ok_or_else(|| UpstreamError::new(UpstreamErrorKind::NotFound(lookup)))
            })
            .await
    }

    #[instrument(skip(self))]
    async fn bot_login(&self) -> Result<String, UpstreamError> {
        let page: HelixPage<HelixUser> = self.get("/users", &[]).await?;
        page.data.into_iter().next().map(|user| user.login).ok_or_else(|| {
            UpstreamError::new(UpstreamErrorKind::Malformed(
                "token has no associated user".to_string(),
            ))
        })
    }

    #[instrument(skip(self))]
    async fn is_live(&self, channel: &str) -> Result<bool, UpstreamError> {
        let channel = normalize_login(channel);
        let page: HelixPage<HelixStream> = self
            .get("/streams", &[("user_login", channel.as_str())])
            .await?;
        Ok(page.data.iter().any(|stream| stream.kind == "live"))
    }

    #[instrument(skip(self))]
    async fn is_following(&self, user: &str, channel: &str) -> Result<bool, UpstreamError> {
        let (user_id, channel_id) = tokio::try_join!(self.user_id(user), self.user_id(channel))?;
        let page: HelixPage<IgnoredAny> = self
            .get(
                "/channels/followed",
                &[
                    ("user_id", user_id.as_str()),
                    ("broadcaster_id", channel_id.as_str()),
                ],
            )
            .await?;
        Ok(!page.data.is_empty())
    }

    #[instrument(skip(self))]
    async fn is_banned(&self, user: &str, channel: &str) -> Result<bool, UpstreamError> {
        let (user_id, channel_id) = tokio::try_join!(self.user_id(user), self.user_id(channel))?;
        let page: HelixPage<IgnoredAny> = self
            .get(
                "/moderation/banned",
                &[
                    ("broadcaster_id", channel_id.as_str()),
                    ("user_id", user_id.as_str()),
                ],
            )
            .await?;
        Ok(!page.data.is_empty())
    }

    #[instrument(skip(self))]
    async fn channel_emotes(&self, channel: &str) -> Result<Vec<Emote>, UpstreamError> {
        let channel_id = self.user_id(channel).await?;
        let page: HelixPage<Emote> = self
            .get("/chat/emotes", &[("broadcaster_id", channel_id.as_str())])
            .await?;
        Ok(page.data)
    }
}
