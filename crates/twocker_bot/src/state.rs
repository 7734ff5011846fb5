//! The bot's mutable configuration.

use derive_getters::Getters;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use twocker_error::ValidationError;

static CHANNEL_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,25}$"));

/// Longest message Twitch accepts in one `PRIVMSG`.
pub const MAX_MESSAGE_BYTES: usize = 500;

/// What the bot posts, where, and how often.
///
/// Invariants, checked by every mutation path:
/// - `interval_minutes` is in 1..=60
/// - random bounds are in 1..=300 with max above min
/// - `channel` and `message` are non-empty while `active`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct BotConfig {
    channel: String,
    message: String,
    interval_minutes: u64,
    active: bool,
    ignore_live_status: bool,
    random_interval: bool,
    random_min_interval: u64,
    random_max_interval: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            message: String::new(),
            interval_minutes: 5,
            active: false,
            ignore_live_status: false,
            random_interval: false,
            random_min_interval: 20,
            random_max_interval: 60,
        }
    }
}

/// Partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, derive_setters::Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct ConfigDelta {
    /// Channel login
    #[serde(default)]
    pub channel: Option<String>,
    /// Message text
    #[serde(default)]
    pub message: Option<String>,
    /// Fixed wait between posts (minutes)
    #[serde(default, alias = "interval")]
    pub interval_minutes: Option<u64>,
    /// Whether the bot posts at all
    #[serde(default)]
    pub active: Option<bool>,
    /// Post even when the channel is offline
    #[serde(default)]
    pub ignore_live_status: Option<bool>,
    /// Draw each wait from the random bounds
    #[serde(default)]
    pub random_interval: Option<bool>,
    /// Lower random bound (minutes)
    #[serde(default)]
    pub random_min_interval: Option<u64>,
    /// Upper random bound (minutes)
    #[serde(default)]
    pub random_max_interval: Option<u64>,
}

/// Normalize a channel login: trimmed, without `#`, lower-cased.
///
/// An empty result is allowed here. Whether it is acceptable depends on
/// whether the bot is active.
pub fn normalize_channel(raw: &str) -> Result<String, ValidationError> {
    let channel = raw.trim().trim_start_matches('#').to_lowercase();
    if channel.is_empty() {
        return Ok(channel);
    }
    let valid = match CHANNEL_NAME.as_ref() {
        Ok(pattern) => pattern.is_match(&channel),
        Err(_) => false,
    };
    if valid {
        Ok(channel)
    } else {
        Err(ValidationError::new(
            "channel",
            "must be 1 to 25 letters, digits or underscores",
        ))
    }
}

fn normalize_message(raw: &str) -> Result<String, ValidationError> {
    let message = raw.trim();
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(ValidationError::new(
            "message",
            format!("must be at most {} bytes", MAX_MESSAGE_BYTES),
        ));
    }
    Ok(message.to_string())
}

impl BotConfig {
    /// Produce the config that results from applying `delta`, or the first
    /// rule it breaks.
    pub fn apply(&self, delta: &ConfigDelta) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        if let Some(channel) = &delta.channel {
            next.channel = normalize_channel(channel)?;
        }
        if let Some(message) = &delta.message {
            next.message = normalize_message(message)?;
        }
        if let Some(minutes) = delta.interval_minutes {
            next.interval_minutes = minutes;
        }
        if let Some(active) = delta.active {
            next.active = active;
        }
        if let Some(ignore) = delta.ignore_live_status {
            next.ignore_live_status = ignore;
        }
        if let Some(random) = delta.random_interval {
            next.random_interval = random;
        }
        if let Some(min) = delta.random_min_interval {
            next.random_min_interval = min;
        }
        if let Some(max) = delta.random_max_interval {
            next.random_max_interval = max;
        }
        next.validate()?;
        Ok(next)
    }

    /// Check the invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=60).contains(&self.interval_minutes) {
            return Err(ValidationError::new(
                "interval_minutes",
                "must be between 1 and 60",
            ));
        }
        for (field, value) in [
            ("random_min_interval", self.random_min_interval),
            ("random_max_interval", self.random_max_interval),
        ] {
            if !(1..=300).contains(&value) {
                return Err(ValidationError::new(field, "must be between 1 and 300"));
            }
        }
        if self.random_max_interval <= self.random_min_interval {
            return Err(ValidationError::new(
                "random_max_interval",
                "must be greater than random_min_interval",
            ));
        }
        if self.active && self.channel.is_empty() {
            return Err(ValidationError::new(
                "channel",
                "must not be empty while the bot is active",
            ));
        }
        if self.active && self.message.is_empty() {
            return Err(ValidationError::new(
                "message",
                "must not be empty while the bot is active",
            ));
        }
        Ok(())
    }

    /// Fixed wait between posts.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    /// Wait before the next post, drawn from the random bounds when enabled.
    pub fn next_wait(&self) -> Duration {
        if self.random_interval {
            let min = self.random_min_interval * 60;
            let max = self.random_max_interval * 60;
            let secs = rand::thread_rng().gen_range(min..=max);
            Duration::from_secs(secs)
        } else {
            self.interval()
        }
    }
}

/// Config before and after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct ConfigChange {
    previous: BotConfig,
    current: BotConfig,
}

impl ConfigChange {
    /// Whether anything differs.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    /// Consume the change, keeping the new config.
    pub fn into_current(self) -> BotConfig {
        self.current
    }
}

/// Single point of truth for the [`BotConfig`].
///
/// Readers get consistent snapshots. Writers validate against the current
/// value and publish the result in one step, so a rejected update leaves no
/// trace and a concurrent reader never sees half of one.
#[derive(Debug, Clone)]
pub struct BotState {
    config: Arc<watch::Sender<BotConfig>>,
}

impl BotState {
    /// Start from a config. It is validated first.
    pub fn new(initial: BotConfig) -> Result<Self, ValidationError> {
        initial.validate()?;
        let (config, _) = watch::channel(initial);
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Copy of the current config.
    pub fn snapshot(&self) -> BotConfig {
        self.config.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<BotConfig> {
        self.config.subscribe()
    }

    /// Apply a delta atomically.
    pub fn update(&self, delta: &ConfigDelta) -> Result<ConfigChange, ValidationError> {
        self.mutate(|current| current.apply(delta))
    }

    /// Flip `active`. Activating with an empty channel or message fails.
    pub fn toggle(&self) -> Result<ConfigChange, ValidationError> {
        self.mutate(|current| {
            let mut next = current.clone();
            next.active = !current.active;
            next.validate()?;
            Ok(next)
        })
    }

    fn mutate<F>(&self, compute: F) -> Result<ConfigChange, ValidationError>
    where
        F: FnOnce(&BotConfig) -> Result<BotConfig, ValidationError>,
    {
        let mut outcome = None;
        self.config.send_if_modified(|current| match compute(current) {
            Ok(next) => {
                let previous = std::mem::replace(current, next.clone());
                let changed = previous != next;
                outcome = Some(Ok(ConfigChange {
                    previous,
                    current: next,
                }));
                changed
            }
            Err(e) => {
                debug!(error = %e, "Rejected config change");
                outcome = Some(Err(e));
                false
            }
        });
        match outcome {
            Some(Ok(change)) => {
                if change.changed() {
                    info!(
                        channel = %change.current.channel,
                        interval_minutes = change.current.interval_minutes,
                        active = change.current.active,
                        "Bot config updated"
                    );
                }
                Ok(change)
            }
            Some(Err(e)) => Err(e),
            None => Err(ValidationError::new("config", "update was not applied")),
        }
    }
}
