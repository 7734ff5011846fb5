//! Control facade over state, scheduler and status lookups.

use crate::events::EventLog;
use crate::metrics::{PostMetrics, PostMetricsSnapshot};
use crate::poster::Poster;
use crate::scheduler::Scheduler;
use crate::state::{BotConfig, BotState, ConfigDelta, normalize_channel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use twocker_cache::CacheStats;
use twocker_error::{TwockerResult, ValidationError};
use twocker_rate_limit::{RateWindow, SlidingWindowLimiter};
use twocker_twitch::{CachedTwitchApi, ChannelStatus, ChatSender, Emote, TwitchApi};

/// Account name reported when the platform cannot be asked.
const FALLBACK_BOT_NAME: &str = "TwockerBot";

/// Status of one channel as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    /// Channel login
    pub channel: String,
    /// Live status, `None` when unknown
    pub is_live: Option<bool>,
    /// Follow status, `None` when unknown
    pub is_following: Option<bool>,
    /// Ban status, `None` when unknown
    pub is_banned: Option<bool>,
    /// When the view was assembled
    pub last_checked: DateTime<Utc>,
}

impl From<ChannelStatus> for StatusView {
    fn from(status: ChannelStatus) -> Self {
        Self {
            channel: status.channel().clone(),
            is_live: *status.is_live(),
            is_following: *status.is_following(),
            is_banned: *status.is_banned(),
            last_checked: Utc::now(),
        }
    }
}

/// Liveness summary.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    /// Always `healthy` while the process answers
    pub status: &'static str,
    /// Wall clock time of the report
    pub timestamp: DateTime<Utc>,
    /// Whether the bot is switched on
    pub bot_active: bool,
    /// Seconds since the service was created
    pub uptime_seconds: u64,
    /// Post loop counters
    pub posts: PostMetricsSnapshot,
}

/// Cache counters for clients.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsView {
    /// Live, follow and emote lookups
    pub twitch_cache: CacheStats,
    /// Ban lookups
    pub ban_cache: CacheStats,
    /// Seconds since the service was created
    pub uptime_seconds: u64,
}

/// Who the bot is and where it posts.
#[derive(Debug, Clone, Serialize)]
pub struct BotInfo {
    /// Bot account login
    pub username: String,
    /// Whether the bot is switched on
    pub active: bool,
    /// Configured channel
    pub current_channel: String,
}

struct ServiceInner {
    state: BotState,
    scheduler: Scheduler,
    twitch: Arc<CachedTwitchApi>,
    chat: Arc<dyn ChatSender>,
    metrics: PostMetrics,
    events: EventLog,
    status_limiter: SlidingWindowLimiter,
    bot_account: String,
    control: tokio::sync::Mutex<()>,
    started_at: Instant,
}

/// The operations a control surface may invoke.
///
/// Cheap to clone. `update_config` and `toggle` are serialized against each
/// other and return only after the scheduler matches the new state.
#[derive(Clone)]
pub struct BotService {
    inner: Arc<ServiceInner>,
}

impl BotService {
    /// Wire the service together. The scheduler stays stopped until
    /// [`BotService::start`].
    pub fn new(
        state: BotState,
        twitch: Arc<CachedTwitchApi>,
        chat: Arc<dyn ChatSender>,
        bot_account: impl Into<String>,
        status_window: RateWindow,
    ) -> Self {
        let bot_account = bot_account.into();
        let metrics = PostMetrics::new();
        let events = EventLog::new();
        let lookups: Arc<dyn TwitchApi> = twitch.clone();
        let poster = Arc::new(Poster::new(
            lookups,
            Arc::clone(&chat),
            bot_account.clone(),
            metrics.clone(),
            events.clone(),
        ));
        let scheduler = Scheduler::new(state.clone(), poster);
        Self {
            inner: Arc::new(ServiceInner {
                state,
                scheduler,
                twitch,
                chat,
                metrics,
                events,
                status_limiter: SlidingWindowLimiter::new("status", status_window),
                bot_account,
                control: tokio::sync::Mutex::new(()),
                started_at: Instant::now(),
            }),
        }
    }

    /// Arm the scheduler if the initial config is active.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let _control = self.inner.control.lock().await;
        let config = self.inner.state.snapshot();
        if *config.active() {
            info!(
                channel = %config.channel(),
                interval_minutes = config.interval_minutes(),
                "Bot active at startup"
            );
            self.inner.scheduler.start().await;
            self.inner
                .events
                .info(format!("Bot started as {} (active)", self.inner.bot_account));
        } else {
            info!("Bot inactive at startup");
            self.inner
                .events
                .info(format!("Bot started as {} (inactive)", self.inner.bot_account));
        }
    }

    /// Current config.
    pub fn config(&self) -> BotConfig {
        self.inner.state.snapshot()
    }

    /// Shared state, for subscribers.
    pub fn state(&self) -> &BotState {
        &self.inner.state
    }

    /// Validate and apply a delta, then reconcile the scheduler.
    #[instrument(skip(self))]
    pub async fn update_config(&self, delta: &ConfigDelta) -> TwockerResult<BotConfig> {
        let _control = self.inner.control.lock().await;
        let change = match self.inner.state.update(delta) {
            Ok(change) => change,
            Err(e) => {
                self.inner
                    .events
                    .error(format!("Failed to update settings: {} {}", e.field, e.reason));
                return Err(e.into());
            }
        };
        self.inner.scheduler.reconcile(&change).await;
        let current = change.into_current();
        self.inner.events.info(format!(
            "Settings updated - Channel: {}, Interval: {}min, Ignore Live: {}, Random: {}",
            current.channel(),
            current.interval_minutes(),
            current.ignore_live_status(),
            current.random_interval()
        ));
        Ok(current)
    }

    /// Flip `active`, then reconcile the scheduler. Returns the new value.
    ///
    /// Activation is refused while the ban cache says the bot is banned in
    /// the configured channel. An unknown ban status does not block it.
    #[instrument(skip(self))]
    pub async fn toggle(&self) -> TwockerResult<bool> {
        let _control = self.inner.control.lock().await;
        let config = self.inner.state.snapshot();
        if !config.active() && !config.channel().is_empty() {
            self.refuse_if_banned(config.channel()).await?;
        }
        let change = self.inner.state.toggle()?;
        self.inner.scheduler.reconcile(&change).await;
        let active = *change.current().active();
        info!(active, "Bot toggled");
        self.inner.events.info(if active {
            "Bot activated"
        } else {
            "Bot deactivated"
        });
        Ok(active)
    }

    async fn refuse_if_banned(&self, channel: &str) -> TwockerResult<()> {
        match self
            .inner
            .twitch
            .is_banned(&self.inner.bot_account, channel)
            .await
        {
            Ok(true) => {
                warn!(channel, "Refusing activation, bot is banned");
                self.inner
                    .events
                    .error(format!("Cannot activate: banned from {}", channel));
                Err(ValidationError::new("active", format!("bot is banned in {}", channel)).into())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Ban status unknown, activating anyway");
                Ok(())
            }
        }
    }

    /// Whether the post loop is armed.
    pub async fn is_running(&self) -> bool {
        self.inner.scheduler.is_running().await
    }

    fn admit(&self, identity: &str, channel: &str) -> TwockerResult<String> {
        self.inner.status_limiter.check(identity)?;
        let channel = normalize_channel(channel)?;
        if channel.is_empty() {
            Err(ValidationError::new("channel", "must not be empty"))?
        }
        Ok(channel)
    }

    /// Live, follow and ban status of a channel, each `None` when unknown.
    #[instrument(skip(self))]
    pub async fn get_status(&self, identity: &str, channel: &str) -> TwockerResult<StatusView> {
        let channel = self.admit(identity, channel)?;
        let status = self
            .inner
            .twitch
            .channel_status(&self.inner.bot_account, &channel)
            .await;
        Ok(status.into())
    }

    /// Emotes of a channel. Upstream failures yield an empty list.
    #[instrument(skip(self))]
    pub async fn channel_emotes(&self, identity: &str, channel: &str) -> TwockerResult<Vec<Emote>> {
        let channel = self.admit(identity, channel)?;
        match self.inner.twitch.channel_emotes(&channel).await {
            Ok(emotes) => Ok(emotes),
            Err(e) => {
                warn!(error = %e, "Emote lookup failed");
                Ok(Vec::new())
            }
        }
    }

    /// Status lookups `identity` may still make in the current window.
    pub fn status_allowance(&self, identity: &str) -> u32 {
        self.inner.status_limiter.remaining(identity)
    }

    /// Cache counters.
    pub fn get_cache_stats(&self) -> CacheStatsView {
        CacheStatsView {
            twitch_cache: self.inner.twitch.status_stats(),
            ban_cache: self.inner.twitch.ban_stats(),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Liveness summary.
    pub fn health(&self) -> HealthView {
        HealthView {
            status: "healthy",
            timestamp: Utc::now(),
            bot_active: *self.inner.state.snapshot().active(),
            uptime_seconds: self.uptime_seconds(),
            posts: self.inner.metrics.snapshot(),
        }
    }

    /// Bot account, activity and channel.
    #[instrument(skip(self))]
    pub async fn bot_info(&self) -> BotInfo {
        let config = self.inner.state.snapshot();
        let username = match self.inner.twitch.bot_login().await {
            Ok(login) => login,
            Err(e) => {
                warn!(error = %e, "Bot login lookup failed");
                if self.inner.bot_account.is_empty() {
                    FALLBACK_BOT_NAME.to_string()
                } else {
                    self.inner.bot_account.clone()
                }
            }
        };
        BotInfo {
            username,
            active: *config.active(),
            current_channel: config.channel().clone(),
        }
    }

    /// Post loop counters.
    pub fn metrics(&self) -> &PostMetrics {
        &self.inner.metrics
    }

    /// Recent activity.
    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    /// Drop expired cache entries and idle limiter identities.
    pub fn sweep(&self) -> usize {
        self.inner.twitch.sweep() + self.inner.status_limiter.sweep()
    }

    /// Stop the post loop and close chat.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _control = self.inner.control.lock().await;
        self.inner.scheduler.stop().await;
        self.inner.chat.close().await;
        info!("Bot service shut down");
        self.inner.events.info("Bot service shut down");
    }

    fn uptime_seconds(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
