//! Chat transport errors.

/// Reasons a chat message could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum SendErrorKind {
    /// Could not open or keep the chat connection
    #[display("Connection failed: {}", _0)]
    Connection(String),
    /// The server refused the login
    #[display("Login rejected: {}", _0)]
    LoginRejected(String),
    /// The bot account is banned from the channel
    #[display("Banned from channel")]
    Banned,
    /// The connection closed before the message was written
    #[display("Connection closed")]
    Closed,
}

/// Send failure with channel context and source location.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Send Error: {} (channel '{}') at line {} in {}", kind, channel, line, file)]
pub struct SendError {
    /// Error kind
    pub kind: SendErrorKind,
    /// Target channel
    pub channel: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl SendError {
    /// Create a new SendError for `channel` at the current location.
    #[track_caller]
    pub fn new(kind: SendErrorKind, channel: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            channel: channel.into(),
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &SendErrorKind {
        &self.kind
    }
}
