//! End-to-end tests: real WebSocket clients and admin HTTP requests
//! against a server bound to random local ports.

use std::time::Duration;

use dustlobby::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const PASSWORD: &str = "secret";

struct TestServer {
    ws: String,
    admin: String,
}

fn test_config() -> ServerConfig {
    ServerConfig {
        ws_addr: "127.0.0.1:0".into(),
        admin_addr: "127.0.0.1:0".into(),
        admin_password: Some(PASSWORD.into()),
        feed_url: None,
        ..ServerConfig::default()
    }
}

/// Starts a server with alice (123) and bob (789) as known users and one
/// known level (5518).
async fn start_server(config: ServerConfig) -> TestServer {
    let server = DustlobbyServer::builder(config)
        .names(
            StaticNames::new()
                .with(UserId(123), "alice")
                .with(UserId(789), "bob"),
        )
        .levels(StaticLevels::new().with("Downhill-Rush-5518"))
        .build()
        .await
        .expect("server should build");

    let ws = server.local_addr().expect("ws addr").to_string();
    let admin = server.admin_addr().expect("admin addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    TestServer { ws, admin }
}

async fn connect(addr: &str, path: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, value: serde_json::Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("send");
}

/// Next decoded server message. Panics after 5 s of silence.
async fn recv(ws: &mut ClientWs) -> ServerMessage {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("recv");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("decode");
        }
    }
}

/// Skips messages until a snapshot matches `pred`.
async fn recv_state(ws: &mut ClientWs, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
    loop {
        if let ServerMessage::State(snapshot) = recv(ws).await {
            if pred(&snapshot) {
                return snapshot;
            }
        }
    }
}

async fn login(ws: &mut ClientWs, user: u64) -> Snapshot {
    send(ws, json!({ "type": "login", "user_id": user })).await;
    recv_state(ws, |s| s.has_user(UserId(user))).await
}

/// Like [`recv_state`], but pings while waiting so the connection outlives
/// a short heartbeat timeout.
async fn recv_state_pinging(ws: &mut ClientWs, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
    let give_up = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        assert!(tokio::time::Instant::now() < give_up, "no matching snapshot");
        send(ws, json!({ "type": "ping" })).await;
        let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_millis(300), ws.next()).await
        else {
            continue;
        };
        if let Ok(ServerMessage::State(snapshot)) = serde_json::from_str(text.as_str()) {
            if pred(&snapshot) {
                return snapshot;
            }
        }
    }
}

/// True once the server has closed the stream.
async fn closed(ws: &mut ClientWs) -> bool {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await {
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
            Err(_) => return false,
        }
    }
}

async fn admin_post(
    server: &TestServer,
    path: &str,
    form: &[(&str, &str)],
) -> (u16, serde_json::Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{}{path}", server.admin))
        .form(form)
        .send()
        .await
        .expect("admin request");
    let status = response.status().as_u16();
    let body = response.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

// =========================================================================
// Session
// =========================================================================

#[tokio::test]
async fn test_login_creates_lobby_with_user() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;

    let snapshot = login(&mut ws, 123).await;

    assert_eq!(snapshot.lobby_id, LobbyId(1));
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(snapshot.users[0].user_name, "alice");
}

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;

    send(&mut ws, json!({ "type": "ping" })).await;

    assert_eq!(recv(&mut ws).await, ServerMessage::Pong);
}

#[tokio::test]
async fn test_malformed_frame_reports_error_and_stays_open() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;

    send(&mut ws, json!({ "type": "dance" })).await;
    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error, got {other:?}"),
    }

    send(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::Pong);
}

#[tokio::test]
async fn test_login_out_of_range_user_rejected() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;

    send(&mut ws, json!({ "type": "login", "user_id": 0 })).await;

    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_unknown_user_rejected() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;

    send(&mut ws, json!({ "type": "login", "user_id": 456 })).await;

    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_spectator_sees_members_join() {
    let server = start_server(test_config()).await;
    let mut alice = connect(&server.ws, "/").await;
    login(&mut alice, 123).await;

    let mut bob = connect(&server.ws, "/?lobby=1").await;
    let first = recv_state(&mut bob, |_| true).await;
    assert!(first.has_user(UserId(123)));
    assert!(!first.has_user(UserId(789)));

    let joined = login(&mut bob, 789).await;
    assert_eq!(joined.lobby_id, LobbyId(1));
    assert_eq!(joined.users.len(), 2);

    let seen = recv_state(&mut alice, |s| s.has_user(UserId(789))).await;
    assert_eq!(seen.users.len(), 2);
}

#[tokio::test]
async fn test_connect_to_unknown_lobby_closes() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/?lobby=99").await;

    match recv(&mut ws).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(closed(&mut ws).await);
}

#[tokio::test]
async fn test_logout_removes_user_from_roster() {
    let server = start_server(test_config()).await;
    let mut alice = connect(&server.ws, "/").await;
    login(&mut alice, 123).await;
    let mut bob = connect(&server.ws, "/?lobby=1").await;
    login(&mut bob, 789).await;

    send(&mut bob, json!({ "type": "logout" })).await;

    let snapshot = recv_state(&mut alice, |s| !s.has_user(UserId(789))).await;
    assert_eq!(snapshot.users.len(), 1);
}

#[tokio::test]
async fn test_relogin_replaces_previous_user() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;
    login(&mut ws, 123).await;

    send(&mut ws, json!({ "type": "login", "user_id": 789 })).await;

    let snapshot =
        recv_state(&mut ws, |s| s.has_user(UserId(789)) && !s.has_user(UserId(123))).await;
    assert_eq!(snapshot.users.len(), 1);
}

#[tokio::test]
async fn test_logout_on_one_tab_keeps_user_from_other_tab() {
    let server = start_server(test_config()).await;
    let mut first = connect(&server.ws, "/").await;
    login(&mut first, 123).await;
    let mut second = connect(&server.ws, "/?lobby=1").await;
    login(&mut second, 123).await;

    send(&mut second, json!({ "type": "logout" })).await;
    // Frames are handled in order, so the pong means the logout is done.
    send(&mut second, json!({ "type": "ping" })).await;
    while recv(&mut second).await != ServerMessage::Pong {}

    let mut watcher = connect(&server.ws, "/?lobby=1").await;
    let snapshot = recv_state(&mut watcher, |_| true).await;
    assert!(snapshot.has_user(UserId(123)));
}

#[tokio::test]
async fn test_percent_encoded_lobby_query_accepted() {
    let server = start_server(test_config()).await;
    let mut alice = connect(&server.ws, "/").await;
    login(&mut alice, 123).await;

    let mut ws = connect(&server.ws, "/?lobby=%31").await;

    let snapshot = recv_state(&mut ws, |_| true).await;
    assert_eq!(snapshot.lobby_id, LobbyId(1));
}

#[tokio::test]
async fn test_silent_tcp_peer_does_not_block_other_clients() {
    let server = start_server(test_config()).await;
    let _silent = tokio::net::TcpStream::connect(server.ws.as_str())
        .await
        .expect("tcp connect");

    let connected = timeout(
        Duration::from_secs(3),
        tokio_tungstenite::connect_async(format!("ws://{}/", server.ws)),
    )
    .await;

    assert!(matches!(connected, Ok(Ok(_))));
}

#[tokio::test]
async fn test_silent_connection_closed_after_heartbeat_timeout() {
    let server = start_server(ServerConfig {
        heartbeat_timeout_secs: 1,
        ..test_config()
    })
    .await;
    let mut ws = connect(&server.ws, "/").await;

    assert!(closed(&mut ws).await);
}

#[tokio::test]
async fn test_timed_out_user_held_through_grace_then_dropped() {
    let server = start_server(ServerConfig {
        heartbeat_timeout_secs: 1,
        roster_grace_secs: 2,
        ..test_config()
    })
    .await;
    let mut ws = connect(&server.ws, "/").await;
    let before = login(&mut ws, 123).await;
    assert!(closed(&mut ws).await);

    // Back within grace: still listed, and logging in again changes nothing.
    let mut ws = connect(&server.ws, "/?lobby=1").await;
    let held = recv_state(&mut ws, |_| true).await;
    assert_eq!(held, before);
    let restored = login(&mut ws, 123).await;
    assert_eq!(restored, before);

    // Silent again, and this time nobody comes back.
    assert!(closed(&mut ws).await);
    let mut watcher = connect(&server.ws, "/?lobby=1").await;
    let gone = recv_state_pinging(&mut watcher, |s| !s.has_user(UserId(123))).await;
    assert_eq!(gone.lobby_id, LobbyId(1));
    assert!(gone.users.is_empty());
}

// =========================================================================
// Admin
// =========================================================================

#[tokio::test]
async fn test_admin_start_game_broadcasts_warmup_then_round() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;
    login(&mut ws, 123).await;

    let (status, body) = admin_post(
        &server,
        "/api/start_game",
        &[
            ("lobby_id", "1"),
            ("password", PASSWORD),
            ("level_id", "5518"),
            ("mode", "any"),
            ("warmup_seconds", "1"),
            ("round_seconds", "60"),
            ("break_seconds", "10"),
        ],
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["phase"], "warmup");

    let warmup = recv_state(&mut ws, |s| s.phase == Phase::Warmup).await;
    assert_eq!(warmup.mode, Some(Mode::Any));
    assert!(warmup.timer().is_some());

    let round = recv_state(&mut ws, |s| s.phase == Phase::Round).await;
    assert_eq!(round.scores, Some(Vec::new()));
}

#[tokio::test]
async fn test_admin_bad_password_forbidden_even_for_unknown_lobby() {
    let server = start_server(test_config()).await;

    let (status, _) = admin_post(
        &server,
        "/api/start_round",
        &[("lobby_id", "99"), ("password", "wrong")],
    )
    .await;
    assert_eq!(status, 403);

    let (status, _) = admin_post(
        &server,
        "/api/start_round",
        &[("lobby_id", "99"), ("password", PASSWORD)],
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_admin_close_lobby_disconnects_members() {
    let server = start_server(test_config()).await;
    let mut ws = connect(&server.ws, "/").await;
    login(&mut ws, 123).await;

    let (status, _) = admin_post(
        &server,
        "/api/close_lobby",
        &[("lobby_id", "1"), ("password", PASSWORD)],
    )
    .await;

    assert_eq!(status, 200);
    assert!(closed(&mut ws).await);
}

#[tokio::test]
async fn test_admin_create_lobby_then_spectate() {
    let server = start_server(test_config()).await;

    let (status, body) =
        admin_post(&server, "/api/create_lobby", &[]).await;
    assert_eq!(status, 200);
    assert_eq!(body["lobby_id"], 1);

    let mut ws = connect(&server.ws, "/?lobby=1").await;
    let snapshot = recv_state(&mut ws, |_| true).await;
    assert!(snapshot.users.is_empty());
}
