//! Chat delivery over Twitch's IRC WebSocket gateway.

use crate::api::normalize_login;
use crate::chat::ChatSender;
use crate::credentials::TwitchCredentials;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use twocker_cache::{TtlCache, TtlCacheConfig};
use twocker_error::{SendError, SendErrorKind};

/// Production chat gateway.
pub const IRC_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Channels the server has reported the bot banned from.
type BanList = TtlCache<String, ()>;

/// Login settings for the chat connection.
#[derive(Clone)]
pub struct IrcConfig {
    endpoint: String,
    nick: String,
    password: String,
    timeout: Duration,
    ban_ttl_secs: u64,
}

impl IrcConfig {
    /// Log in as `nick` with the credentials' token.
    pub fn new(nick: impl Into<String>, credentials: &TwitchCredentials) -> Self {
        Self {
            endpoint: IRC_WS_URL.to_string(),
            nick: nick.into().to_lowercase(),
            password: credentials.irc_password(),
            timeout: Duration::from_secs(10),
            ban_ttl_secs: 60,
        }
    }

    /// Connect somewhere other than the production gateway.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Bound on opening the connection and getting the login reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long a server ban notice blocks sends to its channel.
    pub fn with_ban_ttl_secs(mut self, secs: u64) -> Self {
        self.ban_ttl_secs = secs;
        self
    }

    /// Nick used on the connection.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Connect and login bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for IrcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcConfig")
            .field("endpoint", &self.endpoint)
            .field("nick", &self.nick)
            .field("password", &"[redacted]")
            .field("timeout", &self.timeout)
            .field("ban_ttl_secs", &self.ban_ttl_secs)
            .finish()
    }
}

/// One parsed IRC line, with IRCv3 tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcLine {
    /// `@key=value` tags
    pub tags: HashMap<String, String>,
    /// Source prefix without the leading colon
    pub prefix: Option<String>,
    /// Command or numeric reply
    pub command: String,
    /// Middle parameters
    pub params: Vec<String>,
    /// Trailing parameter without the leading colon
    pub trailing: Option<String>,
}

impl IrcLine {
    /// Parse a single line. Returns `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return None;
        }

        let mut parsed = IrcLine::default();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (tags, remainder) = stripped.split_once(' ')?;
            for tag in tags.split(';') {
                let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
                parsed.tags.insert(key.to_string(), value.to_string());
            }
            rest = remainder.trim_start();
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            parsed.prefix = Some(prefix.to_string());
            rest = remainder.trim_start();
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing.to_string())),
            None => (rest, None),
        };
        let mut words = head.split_whitespace();
        parsed.command = words.next()?.to_string();
        parsed.params = words.map(str::to_string).collect();
        parsed.trailing = trailing;
        Some(parsed)
    }

    /// Channel named in the first parameter, without the `#`.
    pub fn channel(&self) -> Option<&str> {
        self.params
            .first()
            .and_then(|param| param.strip_prefix('#'))
    }

    /// Value of the `msg-id` tag.
    pub fn msg_id(&self) -> Option<&str> {
        self.tags.get("msg-id").map(String::as_str)
    }
}

/// Build a `PRIVMSG` line. Line breaks in the message are flattened to
/// spaces so one call always produces exactly one chat message.
pub(crate) fn privmsg(channel: &str, message: &str) -> String {
    let flattened: String = message
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("PRIVMSG #{} :{}", channel, flattened.trim())
}

struct IrcSession {
    outgoing: mpsc::UnboundedSender<String>,
    joined: HashSet<String>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl IrcSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }

    fn write(&self, line: String) -> bool {
        self.outgoing.send(line).is_ok()
    }
}

impl Drop for IrcSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// [`ChatSender`] over the IRC WebSocket gateway.
///
/// Connects on first use and only hands the connection out once the server
/// has accepted the login (`001`). Opening the socket and waiting for that
/// reply share one timeout. Joins each channel the first time it is sent to,
/// answers server `PING`s, and reconnects on the next send after the
/// connection drops. A `msg_banned` notice makes sends to that channel fail
/// fast with [`SendErrorKind::Banned`] until the notice expires.
pub struct IrcChatSender {
    config: IrcConfig,
    session: tokio::sync::Mutex<Option<IrcSession>>,
    banned: Arc<BanList>,
}

impl IrcChatSender {
    /// Create a sender. No connection is opened until the first send.
    pub fn new(config: IrcConfig) -> Self {
        let banned = TtlCache::new(
            "irc_bans",
            &TtlCacheConfig::default().with_ttl_secs(config.ban_ttl_secs),
        );
        Self {
            config,
            session: tokio::sync::Mutex::new(None),
            banned: Arc::new(banned),
        }
    }

    /// Whether the server has recently told us the bot is banned in `channel`.
    pub fn is_banned_in(&self, channel: &str) -> bool {
        self.banned.get(&normalize_login(channel)).is_some()
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint, nick = %self.config.nick))]
    async fn connect(&self, channel: &str) -> Result<IrcSession, SendError> {
        match tokio::time::timeout(self.config.timeout, self.open(channel)).await {
            Ok(session) => session,
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "Chat login timed out");
                Err(SendError::new(
                    SendErrorKind::Connection(format!(
                        "no login reply within {:?}",
                        self.config.timeout
                    )),
                    channel,
                ))
            }
        }
    }

    async fn open(&self, channel: &str) -> Result<IrcSession, SendError> {
        let (socket, _) = tokio_tungstenite::connect_async(self.config.endpoint.as_str())
            .await
            .map_err(|e| SendError::new(SendErrorKind::Connection(e.to_string()), channel))?;
        let (mut sink, mut stream) = socket.split();
        let (outgoing, mut queued) = mpsc::unbounded_channel::<String>();
        let alive = Arc::new(AtomicBool::new(true));

        let writer_alive = Arc::clone(&alive);
        let writer = tokio::spawn(async move {
            while let Some(line) = queued.recv().await {
                if let Err(e) = sink.send(Message::text(line)).await {
                    warn!(error = %e, "Chat write failed");
                    break;
                }
            }
            writer_alive.store(false, Ordering::SeqCst);
        });

        let reader_alive = Arc::clone(&alive);
        let replies = outgoing.clone();
        let banned = Arc::clone(&self.banned);
        let (login_tx, login_rx) = oneshot::channel::<Result<(), String>>();
        let reader = tokio::spawn(async move {
            let mut login = Some(login_tx);
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        for raw in text.as_str().lines() {
                            let Some(line) = IrcLine::parse(raw) else {
                                continue;
                            };
                            match handle_line(&line, &replies, &banned) {
                                LineAction::Continue => {}
                                LineAction::Welcome => {
                                    if let Some(tx) = login.take() {
                                        let _ = tx.send(Ok(()));
                                    }
                                }
                                LineAction::LoginFailed(notice) => {
                                    if let Some(tx) = login.take() {
                                        let _ = tx.send(Err(notice));
                                    }
                                    reader_alive.store(false, Ordering::SeqCst);
                                    return;
                                }
                                LineAction::Reconnect => {
                                    reader_alive.store(false, Ordering::SeqCst);
                                    return;
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Chat read failed");
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
        });

        let session = IrcSession {
            outgoing,
            joined: HashSet::new(),
            alive,
            tasks: vec![writer, reader],
        };

        let login = [
            format!("PASS {}", self.config.password),
            format!("NICK {}", self.config.nick),
            "CAP REQ :twitch.tv/commands twitch.tv/tags".to_string(),
        ];
        for line in login {
            if !session.write(line) {
                return Err(SendError::new(SendErrorKind::Closed, channel));
            }
        }

        match login_rx.await {
            Ok(Ok(())) => {
                info!("Chat connection opened");
                Ok(session)
            }
            Ok(Err(notice)) => Err(SendError::new(SendErrorKind::LoginRejected(notice), channel)),
            Err(_) => Err(SendError::new(
                SendErrorKind::Connection("connection closed during login".to_string()),
                channel,
            )),
        }
    }
}

/// What the reader does after a server line.
#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    Continue,
    /// Login accepted
    Welcome,
    /// Login refused; the connection is useless
    LoginFailed(String),
    /// Server asked us to go away
    Reconnect,
}

fn handle_line(
    line: &IrcLine,
    replies: &mpsc::UnboundedSender<String>,
    banned: &BanList,
) -> LineAction {
    match line.command.as_str() {
        "PING" => {
            let token = line.trailing.as_deref().unwrap_or("tmi.twitch.tv");
            let _ = replies.send(format!("PONG :{}", token));
            LineAction::Continue
        }
        "NOTICE" => {
            let text = line.trailing.as_deref().unwrap_or_default();
            if line.msg_id() == Some("msg_banned") {
                if let Some(channel) = line.channel() {
                    warn!(channel, "Bot is banned from channel");
                    banned.insert(normalize_login(channel), ());
                }
                LineAction::Continue
            } else if text.contains("Login authentication failed")
                || text.contains("Improperly formatted auth")
            {
                warn!(notice = text, "Chat login rejected");
                LineAction::LoginFailed(text.to_string())
            } else {
                debug!(notice = text, "Chat notice");
                LineAction::Continue
            }
        }
        "RECONNECT" => {
            info!("Server requested reconnect");
            LineAction::Reconnect
        }
        "001" => {
            debug!("Chat login accepted");
            LineAction::Welcome
        }
        _ => LineAction::Continue,
    }
}

#[async_trait]
impl ChatSender for IrcChatSender {
    #[instrument(skip(self, message), fields(message_len = message.len()))]
    async fn send(&self, channel: &str, message: &str) -> Result<(), SendError> {
        let channel = normalize_login(channel);
        if self.is_banned_in(&channel) {
            return Err(SendError::new(SendErrorKind::Banned, channel));
        }

        let mut guard = self.session.lock().await;
        if guard.as_ref().is_none_or(|session| !session.is_alive()) {
            if guard.is_some() {
                info!("Chat connection lost, reconnecting");
            }
            *guard = None;
            *guard = Some(self.connect(&channel).await?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(SendError::new(SendErrorKind::Closed, channel));
        };

        if !session.joined.contains(&channel) {
            if !session.write(format!("JOIN #{}", channel)) {
                *guard = None;
                return Err(SendError::new(SendErrorKind::Closed, channel));
            }
            session.joined.insert(channel.clone());
            debug!(channel = %channel, "Joined channel");
        }

        if !session.write(privmsg(&channel, message)) {
            *guard = None;
            return Err(SendError::new(SendErrorKind::Closed, channel));
        }
        debug!(channel = %channel, "Message queued");
        Ok(())
    }

    async fn close(&self) {
        if self.session.lock().await.take().is_some() {
            info!("Chat connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_notice() {
        let line = IrcLine::parse(
            "@msg-id=msg_banned :tmi.twitch.tv NOTICE #somechannel :You are permanently banned from talking in somechannel.",
        )
        .expect("parsed");
        assert_eq!(line.command, "NOTICE");
        assert_eq!(line.channel(), Some("somechannel"));
        assert_eq!(line.msg_id(), Some("msg_banned"));
        assert_eq!(line.prefix.as_deref(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_parse_ping() {
        let line = IrcLine::parse("PING :tmi.twitch.tv\r\n").expect("parsed");
        assert_eq!(line.command, "PING");
        assert!(line.params.is_empty());
        assert_eq!(line.trailing.as_deref(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_parse_numeric_reply() {
        let line = IrcLine::parse(":tmi.twitch.tv 001 twockerbot :Welcome, GLHF!").expect("parsed");
        assert_eq!(line.command, "001");
        assert_eq!(line.params, vec!["twockerbot".to_string()]);
    }

    #[test]
    fn test_parse_blank() {
        assert!(IrcLine::parse("\r\n").is_none());
    }

    #[test]
    fn test_privmsg_flattens_line_breaks() {
        assert_eq!(
            privmsg("somechannel", "hello\r\nJOIN #other"),
            "PRIVMSG #somechannel :hello  JOIN #other"
        );
    }

    fn ban_list(ttl_secs: u64) -> BanList {
        TtlCache::new("irc_bans", &TtlCacheConfig::default().with_ttl_secs(ttl_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_notice_expires() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let banned = ban_list(60);
        let line = IrcLine::parse("@msg-id=msg_banned :tmi.twitch.tv NOTICE #SomeChannel :banned")
            .expect("parsed");
        assert_eq!(handle_line(&line, &tx, &banned), LineAction::Continue);
        assert!(banned.get(&"somechannel".to_string()).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(banned.get(&"somechannel".to_string()).is_none());
    }

    #[test]
    fn test_ping_is_answered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let line = IrcLine::parse("PING :tmi.twitch.tv").expect("parsed");
        assert_eq!(handle_line(&line, &tx, &ban_list(60)), LineAction::Continue);
        assert_eq!(rx.try_recv().ok().as_deref(), Some("PONG :tmi.twitch.tv"));
    }

    #[test]
    fn test_login_replies_are_classified() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let banned = ban_list(60);
        let welcome = IrcLine::parse(":tmi.twitch.tv 001 twockerbot :Welcome, GLHF!").expect("parsed");
        assert_eq!(handle_line(&welcome, &tx, &banned), LineAction::Welcome);

        let refused = IrcLine::parse(":tmi.twitch.tv NOTICE * :Login authentication failed")
            .expect("parsed");
        assert_eq!(
            handle_line(&refused, &tx, &banned),
            LineAction::LoginFailed("Login authentication failed".to_string())
        );

        let reconnect = IrcLine::parse(":tmi.twitch.tv RECONNECT").expect("parsed");
        assert_eq!(handle_line(&reconnect, &tx, &banned), LineAction::Reconnect);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = IrcConfig::new("TwockerBot", &TwitchCredentials::new("oauth:secret", "cid"));
        assert!(!format!("{config:?}").contains("secret"));
        assert_eq!(config.nick(), "twockerbot");
    }
}
