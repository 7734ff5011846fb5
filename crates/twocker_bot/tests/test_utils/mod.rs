//! Test utilities for twocker_bot tests.
//!
//! Scripted stand-ins for the platform and chat, plus builders for a wired
//! [`BotService`].

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use twocker_bot::{BotConfig, BotService, BotState, ConfigDelta};
use twocker_error::{SendError, SendErrorKind, UpstreamError, UpstreamErrorKind};
use twocker_rate_limit::RateWindow;
use twocker_twitch::{
    CachedTwitchApi, ChatSender, Emote, EmoteImages, StatusCacheConfig, TwitchApi,
};

pub const BOT: &str = "twockerbot";

/// How a scripted lookup answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Fails,
}

impl Answer {
    fn result(self, op: &str) -> Result<bool, UpstreamError> {
        match self {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            Answer::Fails => Err(UpstreamError::new(UpstreamErrorKind::Unavailable(
                format!("{} unavailable", op),
            ))),
        }
    }
}

/// Scripted platform.
pub struct MockTwitch {
    pub live: Mutex<Answer>,
    pub following: Mutex<Answer>,
    pub banned: Mutex<Answer>,
    pub emotes_fail: Mutex<bool>,
    pub lookups: AtomicUsize,
    /// When set, live lookups wait for a permit
    pub live_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl Default for MockTwitch {
    fn default() -> Self {
        Self {
            live: Mutex::new(Answer::Yes),
            following: Mutex::new(Answer::Yes),
            banned: Mutex::new(Answer::No),
            emotes_fail: Mutex::new(false),
            lookups: AtomicUsize::new(0),
            live_gate: Mutex::new(None),
        }
    }
}

impl MockTwitch {
    pub fn offline() -> Self {
        let mock = Self::default();
        *mock.live.lock() = Answer::No;
        mock
    }

    /// Live lookups block until the returned semaphore gets permits.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let mock = Self::default();
        let gate = Arc::new(Semaphore::new(0));
        *mock.live_gate.lock() = Some(Arc::clone(&gate));
        (mock, gate)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

async fn pass(gate: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = gate.lock().clone();
    if let Some(gate) = gate {
        let _ = gate.acquire().await;
    }
}

#[async_trait]
impl TwitchApi for MockTwitch {
    async fn user_id(&self, login: &str) -> Result<String, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(format!("id-{}", login))
    }

    async fn bot_login(&self) -> Result<String, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(BOT.to_string())
    }

    async fn is_live(&self, _channel: &str) -> Result<bool, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        pass(&self.live_gate).await;
        let answer = *self.live.lock();
        answer.result("is_live")
    }

    async fn is_following(&self, _user: &str, _channel: &str) -> Result<bool, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let answer = *self.following.lock();
        answer.result("is_following")
    }

    async fn is_banned(&self, _user: &str, _channel: &str) -> Result<bool, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let answer = *self.banned.lock();
        answer.result("is_banned")
    }

    async fn channel_emotes(&self, channel: &str) -> Result<Vec<Emote>, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if *self.emotes_fail.lock() {
            return Err(UpstreamError::new(UpstreamErrorKind::Timeout(
                "channel_emotes".into(),
            )));
        }
        Ok(vec![Emote {
            id: "1".into(),
            name: format!("{}Hype", channel),
            images: EmoteImages {
                url_1x: "https://example.test/1x".into(),
                url_2x: "https://example.test/2x".into(),
                url_4x: "https://example.test/4x".into(),
            },
            tier: String::new(),
            emote_type: "subscriptions".into(),
        }])
    }
}

/// One delivered message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub at: Instant,
    pub channel: String,
    pub message: String,
}

/// Chat that records what it is asked to send.
#[derive(Default)]
pub struct MockChat {
    pub deliveries: Mutex<Vec<Delivery>>,
    /// Number of upcoming sends that fail
    pub failures_left: Mutex<usize>,
    pub attempts: AtomicUsize,
    pub closed: Mutex<bool>,
    /// When set, sends wait for a permit before delivering
    pub gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockChat {
    pub fn failing(times: usize) -> Self {
        let chat = Self::default();
        *chat.failures_left.lock() = times;
        chat
    }

    /// Sends block until the returned semaphore gets permits.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let chat = Self::default();
        let gate = Arc::new(Semaphore::new(0));
        *chat.gate.lock() = Some(Arc::clone(&gate));
        (chat, gate)
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Offsets of each delivery from `origin`, in whole seconds.
    pub fn send_offsets(&self, origin: Instant) -> Vec<u64> {
        self.deliveries
            .lock()
            .iter()
            .map(|d| d.at.duration_since(origin).as_secs())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatSender for MockChat {
    async fn send(&self, channel: &str, message: &str) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        pass(&self.gate).await;
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(SendError::new(
                    SendErrorKind::Connection("connection reset".into()),
                    channel,
                ));
            }
        }
        self.deliveries.lock().push(Delivery {
            at: Instant::now(),
            channel: channel.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}

/// An active config posting "Hello world!" to `somechannel` every
/// `interval_minutes`.
pub fn active_config(interval_minutes: u64) -> BotConfig {
    BotConfig::default()
        .apply(
            &ConfigDelta::default()
                .with_channel("somechannel".to_string())
                .with_message("Hello world!".to_string())
                .with_interval_minutes(interval_minutes)
                .with_active(true),
        )
        .expect("valid test config")
}

/// Service wired to the given mocks.
pub fn service_with(
    config: BotConfig,
    twitch: &Arc<MockTwitch>,
    chat: &Arc<MockChat>,
    status_window: RateWindow,
) -> BotService {
    let inner: Arc<dyn TwitchApi> = twitch.clone();
    let cached = Arc::new(CachedTwitchApi::new(inner, &StatusCacheConfig::default()));
    let chat: Arc<dyn ChatSender> = chat.clone();
    let state = BotState::new(config).expect("valid initial state");
    BotService::new(state, cached, chat, BOT, status_window)
}
