//! Chat delivery.

use async_trait::async_trait;
use twocker_error::SendError;

/// Delivers a message to a channel's chat.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Send `message` to `channel`.
    async fn send(&self, channel: &str, message: &str) -> Result<(), SendError>;

    /// Close any open connection. Later sends may reconnect.
    async fn close(&self) {}
}
