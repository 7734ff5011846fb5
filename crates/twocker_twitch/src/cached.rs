//! Caching decorator over a [`TwitchApi`].

use crate::api::{TwitchApi, normalize_login};
use crate::responses::Emote;
use async_trait::async_trait;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use twocker_cache::{CacheStats, TtlCache, TtlCacheConfig};
use twocker_error::{UpstreamError, UpstreamErrorKind};

/// Which lookup a cache entry answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Operation {
    /// Live status of a channel
    #[display("live_status")]
    LiveStatus,
    /// Whether a user follows a channel
    #[display("follow_status")]
    FollowStatus,
    /// Whether a user is banned in a channel
    #[display("banned_status")]
    BannedStatus,
    /// Login of the bot account
    #[display("bot_login")]
    BotLogin,
    /// Emotes of a channel
    #[display("channel_emotes")]
    ChannelEmotes,
}

/// Cache key. Entries for different channels or operations never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
pub struct StatusKey {
    operation: Operation,
    channel: String,
    user: Option<String>,
}

impl StatusKey {
    /// Key for a channel-only lookup.
    pub fn for_channel(operation: Operation, channel: &str) -> Self {
        Self {
            operation,
            channel: normalize_login(channel),
            user: None,
        }
    }

    /// Key for a lookup about `user` in `channel`.
    pub fn for_user_in_channel(operation: Operation, user: &str, channel: &str) -> Self {
        Self {
            operation,
            channel: normalize_login(channel),
            user: Some(normalize_login(user)),
        }
    }
}

impl std::fmt::Display for StatusKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}:{}:{}", self.operation, user, self.channel),
            None => write!(f, "{}:{}", self.operation, self.channel),
        }
    }
}

/// Lifetimes for the two status caches.
#[derive(Debug, Clone, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct StatusCacheConfig {
    /// Live, follow and emote lookups (seconds)
    #[serde(default = "default_status_ttl")]
    status_ttl_secs: u64,
    /// Ban lookups (seconds)
    #[serde(default = "default_ban_ttl")]
    ban_ttl_secs: u64,
}

fn default_status_ttl() -> u64 {
    300
}

fn default_ban_ttl() -> u64 {
    60
}

impl Default for StatusCacheConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: default_status_ttl(),
            ban_ttl_secs: default_ban_ttl(),
        }
    }
}

#[derive(Debug, Clone)]
enum CachedValue {
    Flag(bool),
    Text(String),
    Emotes(Arc<Vec<Emote>>),
}

impl CachedValue {
    fn flag(self, key: &StatusKey) -> Result<bool, UpstreamError> {
        match self {
            CachedValue::Flag(value) => Ok(value),
            other => Err(mismatch(key, &other)),
        }
    }

    fn text(self, key: &StatusKey) -> Result<String, UpstreamError> {
        match self {
            CachedValue::Text(value) => Ok(value),
            other => Err(mismatch(key, &other)),
        }
    }

    fn emotes(self, key: &StatusKey) -> Result<Vec<Emote>, UpstreamError> {
        match self {
            CachedValue::Emotes(value) => Ok(value.as_ref().clone()),
            other => Err(mismatch(key, &other)),
        }
    }
}

fn mismatch(key: &StatusKey, value: &CachedValue) -> UpstreamError {
    UpstreamError::new(UpstreamErrorKind::Malformed(format!(
        "cache entry {} holds {:?}",
        key, value
    )))
}

/// [`TwitchApi`] that answers from expiring caches before asking `inner`.
///
/// Ban status lives in its own, shorter-lived cache so a new ban stops the
/// bot quickly. Failed lookups are never cached. Login to id resolution is
/// passed straight through: the inner client keeps its own id cache.
pub struct CachedTwitchApi {
    inner: Arc<dyn TwitchApi>,
    status: TtlCache<StatusKey, CachedValue>,
    bans: TtlCache<StatusKey, bool>,
}

impl CachedTwitchApi {
    /// Wrap `inner` with caches sized by `config`.
    pub fn new(inner: Arc<dyn TwitchApi>, config: &StatusCacheConfig) -> Self {
        Self {
            inner,
            status: TtlCache::new(
                "twitch_status",
                &TtlCacheConfig::default().with_ttl_secs(config.status_ttl_secs),
            ),
            bans: TtlCache::new(
                "twitch_bans",
                &TtlCacheConfig::default().with_ttl_secs(config.ban_ttl_secs),
            ),
        }
    }

    /// Counters for the status cache.
    pub fn status_stats(&self) -> CacheStats {
        self.status.stats()
    }

    /// Counters for the ban cache.
    pub fn ban_stats(&self) -> CacheStats {
        self.bans.stats()
    }

    /// Drop expired entries from both caches.
    pub fn sweep(&self) -> usize {
        self.status.sweep() + self.bans.sweep()
    }

    async fn cached<F, Fut>(&self, key: StatusKey, fetch: F) -> Result<CachedValue, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CachedValue, UpstreamError>>,
    {
        self.status.get_or_fetch(key, fetch).await
    }
}

#[async_trait]
impl TwitchApi for CachedTwitchApi {
    async fn user_id(&self, login: &str) -> Result<String, UpstreamError> {
        self.inner.user_id(login).await
    }

    async fn bot_login(&self) -> Result<String, UpstreamError> {
        let key = StatusKey::for_channel(Operation::BotLogin, "");
        let inner = &self.inner;
        self.cached(key.clone(), move || async move {
            inner.bot_login().await.map(CachedValue::Text)
        })
        .await?
        .text(&key)
    }

    async fn is_live(&self, channel: &str) -> Result<bool, UpstreamError> {
        let key = StatusKey::for_channel(Operation::LiveStatus, channel);
        let inner = &self.inner;
        self.cached(key.clone(), move || async move {
            inner.is_live(channel).await.map(CachedValue::Flag)
        })
        .await?
        .flag(&key)
    }

    async fn is_following(&self, user: &str, channel: &str) -> Result<bool, UpstreamError> {
        let key = StatusKey::for_user_in_channel(Operation::FollowStatus, user, channel);
        let inner = &self.inner;
        self.cached(key.clone(), move || async move {
            inner.is_following(user, channel).await.map(CachedValue::Flag)
        })
        .await?
        .flag(&key)
    }

    async fn is_banned(&self, user: &str, channel: &str) -> Result<bool, UpstreamError> {
        let key = StatusKey::for_user_in_channel(Operation::BannedStatus, user, channel);
        let inner = &self.inner;
        self.bans
            .get_or_fetch(key, move || async move { inner.is_banned(user, channel).await })
            .await
    }

    async fn channel_emotes(&self, channel: &str) -> Result<Vec<Emote>, UpstreamError> {
        let key = StatusKey::for_channel(Operation::ChannelEmotes, channel);
        let inner = &self.inner;
        self.cached(key.clone(), move || async move {
            inner
                .channel_emotes(channel)
                .await
                .map(|emotes| CachedValue::Emotes(Arc::new(emotes)))
        })
        .await?
        .emotes(&key)
    }
}
