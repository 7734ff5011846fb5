//! Tests for chat delivery against a local WebSocket server.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use twocker_error::SendErrorKind;
use twocker_twitch::{ChatSender, IrcChatSender, IrcConfig, TwitchCredentials};

const WELCOME: &str = ":tmi.twitch.tv 001 twockerbot :Welcome, GLHF!";

async fn local_gateway() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    (listener, format!("ws://{}", addr))
}

fn sender(endpoint: &str) -> IrcChatSender {
    let credentials = TwitchCredentials::new("oauth:abc123", "cid");
    IrcChatSender::new(
        IrcConfig::new("TwockerBot", &credentials)
            .with_endpoint(endpoint)
            .with_timeout(Duration::from_millis(500)),
    )
}

/// Read client lines up to and including `NICK`.
async fn read_login(ws: &mut WebSocketStream<TcpStream>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(Ok(frame)) = ws.next().await {
        if let Message::Text(text) = frame {
            let line = text.as_str().to_string();
            let done = line.starts_with("NICK");
            lines.push(line);
            if done {
                break;
            }
        }
    }
    lines
}

async fn accept_and_welcome(listener: TcpListener) -> (WebSocketStream<TcpStream>, Vec<String>) {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
    let lines = read_login(&mut ws).await;
    ws.send(Message::text(WELCOME)).await.expect("welcome");
    (ws, lines)
}

#[tokio::test]
async fn test_login_join_and_privmsg() {
    let (listener, endpoint) = local_gateway().await;
    let server = tokio::spawn(async move {
        let (mut ws, mut lines) = accept_and_welcome(listener).await;
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let line = text.as_str().to_string();
                let done = line.starts_with("PRIVMSG");
                lines.push(line);
                if done {
                    break;
                }
            }
        }
        lines
    });

    let chat = sender(&endpoint);
    chat.send("#SomeChannel", "hello chat").await.expect("send");

    let lines = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server finished")
        .expect("server task");
    assert_eq!(
        lines,
        vec![
            "PASS oauth:abc123".to_string(),
            "NICK twockerbot".to_string(),
            "CAP REQ :twitch.tv/commands twitch.tv/tags".to_string(),
            "JOIN #somechannel".to_string(),
            "PRIVMSG #somechannel :hello chat".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_ban_notice_stops_further_sends() {
    let (listener, endpoint) = local_gateway().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_and_welcome(listener).await;
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame
                && text.as_str().starts_with("PRIVMSG")
            {
                ws.send(Message::text(
                    "@msg-id=msg_banned :tmi.twitch.tv NOTICE #somechannel :You are permanently banned from talking in somechannel.",
                ))
                .await
                .expect("notice");
            }
        }
    });

    let chat = sender(&endpoint);
    chat.send("somechannel", "first").await.expect("first send");

    let mut banned = false;
    for _ in 0..50 {
        if chat.is_banned_in("somechannel") {
            banned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(banned, "ban notice was not observed");

    let err = chat.send("somechannel", "second").await.unwrap_err();
    assert_eq!(err.kind(), &SendErrorKind::Banned);

    chat.close().await;
    server.abort();
}

#[tokio::test]
async fn test_unreachable_gateway_is_connection_error() {
    let (listener, endpoint) = local_gateway().await;
    drop(listener);

    let chat = sender(&endpoint);
    let err = chat.send("somechannel", "hello").await.unwrap_err();
    assert!(matches!(err.kind(), SendErrorKind::Connection(_)));
    assert_eq!(err.channel, "somechannel");
}

#[tokio::test]
async fn test_rejected_login_fails_the_send() {
    let (listener, endpoint) = local_gateway().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        read_login(&mut ws).await;
        ws.send(Message::text(
            ":tmi.twitch.tv NOTICE * :Login authentication failed",
        ))
        .await
        .expect("notice");
        let _ = ws.close(None).await;
    });

    let chat = sender(&endpoint);
    let err = chat.send("somechannel", "hello").await.unwrap_err();
    assert_eq!(
        err.kind(),
        &SendErrorKind::LoginRejected("Login authentication failed".to_string())
    );
    server.await.expect("server task");
}

#[tokio::test]
async fn test_stalled_websocket_handshake_times_out() {
    let (listener, endpoint) = local_gateway().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let chat = sender(&endpoint);
    let err = tokio::time::timeout(Duration::from_secs(5), chat.send("somechannel", "hello"))
        .await
        .expect("send finished")
        .unwrap_err();
    assert!(matches!(err.kind(), SendErrorKind::Connection(_)));
    server.abort();
}

#[tokio::test]
async fn test_missing_welcome_times_out() {
    let (listener, endpoint) = local_gateway().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        read_login(&mut ws).await;
        // Keep reading so the client sees an open but silent server.
        while ws.next().await.is_some() {}
    });

    let chat = sender(&endpoint);
    let err = tokio::time::timeout(Duration::from_secs(5), chat.send("somechannel", "hello"))
        .await
        .expect("send finished")
        .unwrap_err();
    assert!(matches!(err.kind(), SendErrorKind::Connection(_)));
    server.abort();
}
