//! Twitch collaborators for the Twocker bot.
//!
//! - [`TwitchApi`] answers status questions about a channel (live, following,
//!   banned) and is implemented by [`HelixClient`] over the Helix REST API.
//! - [`CachedTwitchApi`] wraps any [`TwitchApi`] with expiring caches so
//!   repeated lookups stay inside platform quotas.
//! - [`ChatSender`] delivers messages, implemented by [`IrcChatSender`] over
//!   Twitch's IRC WebSocket gateway.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod cached;
mod chat;
mod credentials;
mod helix;
mod irc;
mod responses;

pub use api::{ChannelStatus, TwitchApi, normalize_login};
pub use cached::{CachedTwitchApi, Operation, StatusCacheConfig, StatusKey};
pub use chat::ChatSender;
pub use credentials::TwitchCredentials;
pub use helix::{HELIX_BASE_URL, HelixClient, HelixConfig};
pub use irc::{IRC_WS_URL, IrcChatSender, IrcConfig, IrcLine};
pub use responses::{Emote, EmoteImages};
