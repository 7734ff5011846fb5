//! Helix response payloads.

use serde::{Deserialize, Serialize};

/// Every Helix list endpoint wraps its results in `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct HelixPage<T> {
    pub(crate) data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixUser {
    pub(crate) id: String,
    pub(crate) login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelixStream {
    #[serde(rename = "type", default)]
    pub(crate) kind: String,
}

/// A channel emote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emote {
    /// Emote id
    pub id: String,
    /// Text that triggers the emote in chat
    pub name: String,
    /// Image URLs
    #[serde(default)]
    pub images: EmoteImages,
    /// Subscriber tier, empty for non-subscriber emotes
    #[serde(default)]
    pub tier: String,
    /// Emote kind such as `subscriptions` or `follower`
    #[serde(default)]
    pub emote_type: String,
}

/// Static image URLs for an emote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteImages {
    /// 28px image
    #[serde(default)]
    pub url_1x: String,
    /// 56px image
    #[serde(default)]
    pub url_2x: String,
    /// 112px image
    #[serde(default)]
    pub url_4x: String,
}
