//! Twitch account credentials.

use serde::Deserialize;

/// OAuth token and application client id for the bot account.
///
/// The token is accepted with or without the `oauth:` prefix that chat
/// logins use. Debug output never shows either secret.
#[derive(Clone, Deserialize)]
pub struct TwitchCredentials {
    token: String,
    client_id: String,
}

impl TwitchCredentials {
    /// Create credentials from a token and client id.
    pub fn new(token: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client_id: client_id.into(),
        }
    }

    /// Token without the chat prefix, for `Authorization: Bearer`.
    pub fn bearer(&self) -> &str {
        self.token.strip_prefix("oauth:").unwrap_or(&self.token)
    }

    /// Token with the chat prefix, for the IRC `PASS` line.
    pub fn irc_password(&self) -> String {
        format!("oauth:{}", self.bearer())
    }

    /// Application client id for the `Client-Id` header.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for TwitchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchCredentials")
            .field("token", &"[redacted]")
            .field("client_id", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_handling() {
        let prefixed = TwitchCredentials::new("oauth:abc123", "cid");
        assert_eq!(prefixed.bearer(), "abc123");
        assert_eq!(prefixed.irc_password(), "oauth:abc123");

        let bare = TwitchCredentials::new("abc123", "cid");
        assert_eq!(bare.bearer(), "abc123");
        assert_eq!(bare.irc_password(), "oauth:abc123");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = TwitchCredentials::new("oauth:supersecrettoken", "myclientid");
        let shown = format!("{creds:?}");
        assert!(!shown.contains("supersecrettoken"));
        assert!(!shown.contains("myclientid"));
    }
}
