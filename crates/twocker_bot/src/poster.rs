//! One fire of the post loop: pre-send checks, then the send.

use crate::events::EventLog;
use crate::metrics::PostMetrics;
use crate::state::BotConfig;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use twocker_error::TransientError;
use twocker_twitch::{ChatSender, TwitchApi};

/// Why a fire did not send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SkipReason {
    /// The bot account is banned in the channel
    #[display("bot is banned in channel")]
    Banned,
    /// The channel is offline
    #[display("channel is offline")]
    Offline,
    /// The live check failed
    #[display("live status unknown")]
    LiveUnknown,
    /// The bot was switched off before the fire
    #[display("bot is inactive")]
    Inactive,
}

/// Result of one fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The message was handed to chat
    Sent,
    /// The fire decided not to send
    Skipped(SkipReason),
    /// The send failed; the loop carries on
    Failed,
}

/// Performs the checks and the send for a scheduled fire.
pub struct Poster {
    twitch: Arc<dyn TwitchApi>,
    chat: Arc<dyn ChatSender>,
    bot_account: String,
    metrics: PostMetrics,
    events: EventLog,
}

impl Poster {
    /// Create a poster sending as `bot_account`.
    pub fn new(
        twitch: Arc<dyn TwitchApi>,
        chat: Arc<dyn ChatSender>,
        bot_account: impl Into<String>,
        metrics: PostMetrics,
        events: EventLog,
    ) -> Self {
        Self {
            twitch,
            chat,
            bot_account: bot_account.into().to_lowercase(),
            metrics,
            events,
        }
    }

    /// Account the bot posts as.
    pub fn bot_account(&self) -> &str {
        &self.bot_account
    }

    /// Run one fire against the config as it is now.
    ///
    /// A banned bot never sends. An offline or unknown live status skips the
    /// fire unless `ignore_live_status` is set. Not following only warns.
    #[instrument(skip(self, config), fields(channel = %config.channel()))]
    pub async fn fire(&self, config: &BotConfig) -> PostOutcome {
        self.metrics.record_execution();
        let outcome = self.check_and_send(config).await;
        match &outcome {
            PostOutcome::Sent => {
                self.metrics.record_success();
                self.events
                    .info(format!("Message sent on {}: {}", config.channel(), config.message()));
            }
            PostOutcome::Skipped(SkipReason::Banned) => {
                self.metrics.record_skip();
                self.events
                    .error(format!("Skipped post: banned from {}", config.channel()));
            }
            PostOutcome::Skipped(reason) => {
                info!(%reason, "Skipping scheduled post");
                self.metrics.record_skip();
                self.events.warn(format!("Skipped post: {}", reason));
            }
            PostOutcome::Failed => self.metrics.record_failure(),
        }
        outcome
    }

    async fn check_and_send(&self, config: &BotConfig) -> PostOutcome {
        if !config.active() {
            return PostOutcome::Skipped(SkipReason::Inactive);
        }
        let channel = config.channel().as_str();
        let bot = self.bot_account.as_str();

        let (banned, live, following) = tokio::join!(
            self.twitch.is_banned(bot, channel),
            self.twitch.is_live(channel),
            self.twitch.is_following(bot, channel),
        );

        match banned {
            Ok(true) => {
                error!(bot, "Bot is banned in channel, not sending");
                return PostOutcome::Skipped(SkipReason::Banned);
            }
            Ok(false) => {}
            Err(e) => warn!(
                error = %e,
                transient = e.is_transient(),
                "Ban status unknown, continuing"
            ),
        }

        match live {
            Ok(true) => {}
            Ok(false) if *config.ignore_live_status() => {
                info!("Channel offline, posting anyway")
            }
            Ok(false) => return PostOutcome::Skipped(SkipReason::Offline),
            Err(e) if *config.ignore_live_status() => {
                warn!(error = %e, "Live status unknown, posting anyway")
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Live status unknown");
                return PostOutcome::Skipped(SkipReason::LiveUnknown);
            }
        }

        match following {
            Ok(true) => {}
            Ok(false) => warn!(bot, "Bot does not follow channel"),
            Err(e) => warn!(error = %e, "Follow status unknown"),
        }

        match self.chat.send(channel, config.message()).await {
            Ok(()) => {
                info!("Posted scheduled message");
                PostOutcome::Sent
            }
            Err(e) => {
                error!(error = %e, message = %config.message(), "Send failure");
                self.events.error(format!("Error sending message: {}", e.kind()));
                PostOutcome::Failed
            }
        }
    }
}
