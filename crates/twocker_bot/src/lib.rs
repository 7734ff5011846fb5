//! Bot state, post scheduling and the control surface for Twocker.
//!
//! The pieces, from the inside out:
//! - [`BotState`] holds the one [`BotConfig`] and applies validated
//!   [`ConfigDelta`]s atomically.
//! - [`Scheduler`] owns at most one post loop. The loop waits an interval,
//!   reads the config as it is at that moment, and hands it to the [`Poster`].
//! - [`Poster`] runs the ban and live checks and sends the message.
//! - [`BotService`] is the control facade the HTTP layer ([`create_router`])
//!   talks to. Control calls are serialized and return once the scheduler
//!   matches the new state.
//! - [`EventLog`] keeps the last [`EVENT_HISTORY`] activity events and feeds
//!   them live to `/logs`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod auth;
mod config;
mod events;
mod maintenance;
mod metrics;
mod poster;
mod scheduler;
mod service;
mod state;

pub use api::{ApiResponse, ApiState, RATE_LIMIT_REMAINING, create_router};
pub use auth::{AuthConfig, Identity};
pub use self::config::{CONFIG_FILE, TwockerConfig};
pub use events::{BotEvent, EVENT_HISTORY, EventLevel, EventLog};
pub use maintenance::spawn_maintenance;
pub use metrics::{PostMetrics, PostMetricsSnapshot};
pub use poster::{PostOutcome, Poster, SkipReason};
pub use scheduler::Scheduler;
pub use service::{BotInfo, BotService, CacheStatsView, HealthView, StatusView};
pub use state::{BotConfig, BotState, ConfigChange, ConfigDelta};
