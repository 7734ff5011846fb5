//! Process configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. `twocker.toml` in the working directory (optional)
//! 3. Environment variables such as `TWITCH_TOKEN` or `DEFAULT_INTERVAL`

use crate::auth::AuthConfig;
use crate::state::{BotConfig, ConfigDelta};
use config::{Config, Environment, File};
use derive_getters::Getters;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use tracing::{debug, instrument};
use twocker_error::ConfigError;
use twocker_rate_limit::{RateWindow, ThrottleConfig};
use std::time::Duration;
use twocker_twitch::{HelixConfig, IrcConfig, StatusCacheConfig, TwitchCredentials};

/// Base name of the optional config file.
pub const CONFIG_FILE: &str = "twocker";

/// Everything the process reads at startup.
#[derive(Clone, Deserialize, Getters)]
pub struct TwockerConfig {
    /// Chat token, `oauth:` prefixed
    twitch_token: String,
    /// Application client id
    client_id: String,
    /// Bot login; resolved from the token when absent
    #[serde(default)]
    bot_username: Option<String>,

    #[serde(default)]
    twitch_channel: String,
    #[serde(default = "default_message")]
    default_message: String,
    #[serde(default = "default_interval")]
    default_interval: u64,
    #[serde(default)]
    bot_active: bool,
    #[serde(default)]
    ignore_live_status: bool,
    #[serde(default)]
    random_interval: bool,
    #[serde(default = "default_random_min")]
    random_min_interval: u64,
    #[serde(default = "default_random_max")]
    random_max_interval: u64,

    #[serde(default = "default_true")]
    auth_enabled: bool,
    #[serde(default = "default_username")]
    api_username: String,
    #[serde(default)]
    api_password: String,
    #[serde(default = "default_api_rate_limit")]
    api_rate_limit: u32,

    #[serde(default = "default_cache_expiry")]
    cache_expiry: u64,
    #[serde(default = "default_ban_cache_expiry")]
    ban_cache_expiry: u64,
    #[serde(default = "default_upstream_timeout")]
    upstream_timeout_secs: u64,
    #[serde(default = "default_upstream_rpm")]
    upstream_requests_per_minute: u32,

    #[serde(default = "default_bind_addr")]
    bind_addr: String,
}

fn default_message() -> String {
    "Hello world!".to_string()
}

fn default_interval() -> u64 {
    5
}

fn default_random_min() -> u64 {
    20
}

fn default_random_max() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_api_rate_limit() -> u32 {
    100
}

fn default_cache_expiry() -> u64 {
    300 // 5 minutes
}

fn default_ban_cache_expiry() -> u64 {
    60
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_upstream_rpm() -> u32 {
    800
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl TwockerConfig {
    /// Load from `twocker.toml` (if present) and the process environment.
    #[instrument]
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None, None)
    }

    /// Load from an explicit file and an explicit environment.
    ///
    /// `file` replaces the default `twocker.toml` lookup and must exist.
    /// `env` replaces the process environment when given.
    #[instrument(skip(env))]
    pub fn load_from(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        debug!("Loading configuration");
        let builder = match file {
            Some(path) => Config::builder().add_source(File::from(path)),
            None => Config::builder().add_source(File::with_name(CONFIG_FILE).required(false)),
        };

        let config: Self = builder
            .add_source(Environment::default().try_parsing(true).source(env))
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check every value that can be checked without the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.twitch_token.starts_with("oauth:") {
            return Err(ConfigError::new("TWITCH_TOKEN must start with 'oauth:'"));
        }
        if self.twitch_token.len() < 20 {
            return Err(ConfigError::new("TWITCH_TOKEN is too short"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::new("CLIENT_ID must not be empty"));
        }
        if self.auth_enabled && self.api_password.len() < 8 {
            return Err(ConfigError::new(
                "API_PASSWORD must be at least 8 characters when AUTH_ENABLED",
            ));
        }
        if self.api_rate_limit < 10 {
            return Err(ConfigError::new("API_RATE_LIMIT must be at least 10"));
        }
        if self.cache_expiry < 60 {
            return Err(ConfigError::new("CACHE_EXPIRY must be at least 60 seconds"));
        }
        if self.ban_cache_expiry < 30 {
            return Err(ConfigError::new(
                "BAN_CACHE_EXPIRY must be at least 30 seconds",
            ));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::new("UPSTREAM_TIMEOUT_SECS must be at least 1"));
        }
        self.socket_addr()?;
        self.initial_bot_config()?;
        Ok(())
    }

    /// Bot config the process starts with.
    pub fn initial_bot_config(&self) -> Result<BotConfig, ConfigError> {
        let delta = ConfigDelta::default()
            .with_channel(self.twitch_channel.clone())
            .with_message(self.default_message.clone())
            .with_interval_minutes(self.default_interval)
            .with_active(self.bot_active)
            .with_ignore_live_status(self.ignore_live_status)
            .with_random_interval(self.random_interval)
            .with_random_min_interval(self.random_min_interval)
            .with_random_max_interval(self.random_max_interval);
        BotConfig::default()
            .apply(&delta)
            .map_err(|e| ConfigError::new(format!("Invalid {}: {}", e.field, e.reason)))
    }

    /// Address the HTTP surface listens on.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|e| ConfigError::new(format!("Invalid BIND_ADDR '{}': {}", self.bind_addr, e)))
    }

    /// Platform credentials.
    pub fn credentials(&self) -> TwitchCredentials {
        TwitchCredentials::new(self.twitch_token.clone(), self.client_id.clone())
    }

    /// Helix client settings.
    pub fn helix_config(&self) -> HelixConfig {
        HelixConfig::default().with_timeout_ms(self.upstream_timeout_secs * 1000)
    }

    /// Chat login as `nick`, bounded like the Helix calls.
    pub fn irc_config(&self, nick: &str) -> IrcConfig {
        IrcConfig::new(nick, &self.credentials())
            .with_timeout(Duration::from_secs(self.upstream_timeout_secs))
            .with_ban_ttl_secs(self.ban_cache_expiry)
    }

    /// Lifetimes of the status caches.
    pub fn status_cache_config(&self) -> StatusCacheConfig {
        StatusCacheConfig::default()
            .with_status_ttl_secs(self.cache_expiry)
            .with_ban_ttl_secs(self.ban_cache_expiry)
    }

    /// Outbound request budget.
    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig::new(
            self.upstream_requests_per_minute,
            *ThrottleConfig::default().max_concurrent(),
        )
    }

    /// Allowance on the status endpoints.
    pub fn status_window(&self) -> RateWindow {
        RateWindow::per_minute(self.api_rate_limit)
    }

    /// Operator credentials for the HTTP surface.
    pub fn auth_config(&self) -> AuthConfig {
        if self.auth_enabled {
            AuthConfig::new(self.api_username.clone(), self.api_password.clone())
        } else {
            AuthConfig::disabled()
        }
    }
}

impl std::fmt::Debug for TwockerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwockerConfig")
            .field("twitch_token", &"[redacted]")
            .field("client_id", &"[redacted]")
            .field("bot_username", &self.bot_username)
            .field("twitch_channel", &self.twitch_channel)
            .field("default_message", &self.default_message)
            .field("default_interval", &self.default_interval)
            .field("bot_active", &self.bot_active)
            .field("ignore_live_status", &self.ignore_live_status)
            .field("random_interval", &self.random_interval)
            .field("random_min_interval", &self.random_min_interval)
            .field("random_max_interval", &self.random_max_interval)
            .field("auth_enabled", &self.auth_enabled)
            .field("api_username", &self.api_username)
            .field("api_password", &"[redacted]")
            .field("api_rate_limit", &self.api_rate_limit)
            .field("cache_expiry", &self.cache_expiry)
            .field("ban_cache_expiry", &self.ban_cache_expiry)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("upstream_requests_per_minute", &self.upstream_requests_per_minute)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}
