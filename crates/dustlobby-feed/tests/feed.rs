//! Integration tests for feed routing and the feed listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use dustlobby_feed::{FeedListener, route};
use dustlobby_lobby::{
    AdminCommand, GameConfig, Level, LobbyConfig, LobbyHandle, LobbyManager, ScoreEvent,
    SnapshotSink,
};
use dustlobby_protocol::{LobbyId, Mode, Phase, Snapshot, UserId};
use dustlobby_timer::Backoff;
use dustlobby_transport::ConnectionId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =========================================================================
// Helpers
// =========================================================================

struct NullSink;

impl SnapshotSink for NullSink {
    fn publish(&self, _snapshot: Snapshot) {}
    fn closed(&self, _lobby: LobbyId) {}
}

fn manager() -> LobbyManager {
    LobbyManager::new(LobbyConfig::default(), Arc::new(NullSink))
}

fn start_game(filename: &str) -> AdminCommand {
    AdminCommand::StartGame {
        level: Level::from_filename(filename),
        config: GameConfig {
            mode: Mode::Any,
            warmup_time: Duration::from_secs(1),
            round_time: Duration::from_secs(600),
            break_time: Duration::from_secs(30),
            rounds: None,
        },
    }
}

/// A lobby owned by user 789, already playing `filename`.
async fn lobby_in_round(manager: &LobbyManager, filename: &str) -> LobbyHandle {
    let handle = manager
        .create(Some((UserId(789), "bob".into(), ConnectionId::new(1))))
        .unwrap();
    handle.admin(start_game(filename)).await.unwrap();
    while handle.status().phase != Phase::Round {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle
}

fn score(map_id: u64) -> ScoreEvent {
    ScoreEvent {
        user_id: UserId(789),
        map_id,
        completion: 5,
        finesse: 5,
        time_ms: 35_821,
        timestamp: None,
    }
}

fn record(user: u64, level: &str, time: u64) -> Vec<u8> {
    let mut bytes = format!(
        r#"{{"user":{user},"level":"{level}","time":{time},"score_completion":5,"score_finesse":5,"timestamp":{},"username":"bob"}}"#,
        Utc::now().timestamp() + 1
    )
    .into_bytes();
    bytes.push(0x1E);
    bytes
}

/// Serves one feed response per connection, sending each chunk
/// separately, then closing. Counts connections.
async fn serve_feed(chunks: Vec<Vec<u8>>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/events", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let chunks = chunks.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n",
                    )
                    .await
                    .unwrap();
                for chunk in chunks {
                    socket.write_all(&chunk).await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    (url, connections)
}

async fn wait_for_scores(handle: &LobbyHandle, count: usize) -> Snapshot {
    for _ in 0..100 {
        let snapshot = handle.snapshot().await.unwrap();
        if snapshot.scores.as_ref().is_some_and(|s| s.len() >= count) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("scores never arrived");
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_route_reaches_every_matching_round_lobby() {
    let manager = manager();
    let a = lobby_in_round(&manager, "Downhill-Rush-5518").await;
    let b = lobby_in_round(&manager, "Downhill-Rush-5518").await;
    let other = lobby_in_round(&manager, "Other-Map-1234").await;

    let delivered = route(&manager, &score(5518)).await;

    assert_eq!(delivered, 2);
    for handle in [&a, &b] {
        assert_eq!(handle.snapshot().await.unwrap().scores.unwrap().len(), 1);
    }
    assert_eq!(other.snapshot().await.unwrap().scores, Some(vec![]));
}

#[tokio::test(start_paused = true)]
async fn test_route_skips_lobbies_not_in_round() {
    let manager = manager();
    let warming = manager
        .create(Some((UserId(789), "bob".into(), ConnectionId::new(1))))
        .unwrap();
    warming.admin(start_game("Downhill-Rush-5518")).await.unwrap();
    manager.create(None).unwrap();

    assert_eq!(route(&manager, &score(5518)).await, 0);
}

// =========================================================================
// Listener
// =========================================================================

#[tokio::test]
async fn test_listener_applies_streamed_scores() {
    let manager = manager();
    let handle = lobby_in_round(&manager, "Downhill-Rush-5518").await;

    // One record split across writes, a heartbeat, and junk to skip.
    let first = record(789, "Downhill-Rush-5518", 35_821);
    let (head, tail) = first.split_at(20);
    let chunks = vec![
        head.to_vec(),
        tail.to_vec(),
        vec![0x1E],
        b"not json\x1e".to_vec(),
        record(789, "Other-Map-1234", 1_000),
    ];
    let (url, _) = serve_feed(chunks).await;
    let listener = tokio::spawn(FeedListener::new(url, manager.clone()).run());

    let snapshot = wait_for_scores(&handle, 1).await;
    listener.abort();

    let scores = snapshot.scores.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].time_ms, 35_821);
    assert_eq!(scores[0].user_name, "bob");
}

#[tokio::test]
async fn test_listener_reconnects_after_stream_ends() {
    let manager = manager();
    let (url, connections) = serve_feed(vec![vec![0x1E]]).await;
    let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
    let listener = tokio::spawn(FeedListener::new(url, manager).with_backoff(backoff).run());

    for _ in 0..100 {
        if connections.load(Ordering::SeqCst) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    listener.abort();

    assert!(connections.load(Ordering::SeqCst) >= 3);
}
