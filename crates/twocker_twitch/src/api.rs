//! Platform status lookups.

use crate::Emote;
use async_trait::async_trait;
use derive_getters::Getters;
use serde::Serialize;
use twocker_error::UpstreamError;

/// Combined status of one channel from the bot account's point of view.
///
/// A field is `None` when the lookup behind it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct ChannelStatus {
    channel: String,
    is_live: Option<bool>,
    is_following: Option<bool>,
    is_banned: Option<bool>,
}

impl ChannelStatus {
    /// Build a status from the three lookups.
    pub fn new(
        channel: impl Into<String>,
        is_live: Option<bool>,
        is_following: Option<bool>,
        is_banned: Option<bool>,
    ) -> Self {
        Self {
            channel: channel.into(),
            is_live,
            is_following,
            is_banned,
        }
    }
}

/// Canonical form of a login or channel name: trimmed, without a leading
/// `#`, lowercased.
///
/// ```
/// assert_eq!(twocker_twitch::normalize_login(" #SomeChannel "), "somechannel");
/// ```
pub fn normalize_login(login: &str) -> String {
    login.trim().trim_start_matches('#').to_lowercase()
}

/// Read-only questions the bot asks the streaming platform.
///
/// Channel and user arguments are logins. Implementations compare them
/// case-insensitively.
#[async_trait]
pub trait TwitchApi: Send + Sync {
    /// Numeric id for a login.
    async fn user_id(&self, login: &str) -> Result<String, UpstreamError>;

    /// Login of the account the credentials belong to.
    async fn bot_login(&self) -> Result<String, UpstreamError>;

    /// Whether the channel is broadcasting.
    async fn is_live(&self, channel: &str) -> Result<bool, UpstreamError>;

    /// Whether `user` follows `channel`.
    async fn is_following(&self, user: &str, channel: &str) -> Result<bool, UpstreamError>;

    /// Whether `user` is banned in `channel`.
    async fn is_banned(&self, user: &str, channel: &str) -> Result<bool, UpstreamError>;

    /// Emotes owned by the channel.
    async fn channel_emotes(&self, channel: &str) -> Result<Vec<Emote>, UpstreamError>;

    /// Run the live, follow and ban lookups concurrently.
    ///
    /// Failures are logged and reported as unknown rather than returned.
    #[tracing::instrument(skip(self))]
    async fn channel_status(&self, user: &str, channel: &str) -> ChannelStatus {
        let (live, following, banned) = tokio::join!(
            self.is_live(channel),
            self.is_following(user, channel),
            self.is_banned(user, channel),
        );
        ChannelStatus::new(
            channel,
            known("is_live", live),
            known("is_following", following),
            known("is_banned", banned),
        )
    }
}

fn known(check: &'static str, result: Result<bool, UpstreamError>) -> Option<bool> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(check, error = %e, "Status lookup failed, reporting unknown");
            None
        }
    }
}
