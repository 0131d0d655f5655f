//! Per-lobby snapshot topics.
//!
//! Each lobby has a topic; each connection watching that lobby has a
//! `watch` slot in it. Publishing overwrites every slot, so a slow
//! connection skips intermediate snapshots but always ends on the latest
//! one, and never holds up the lobby.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dustlobby_lobby::SnapshotSink;
use dustlobby_protocol::{LobbyId, Snapshot};
use dustlobby_transport::ConnectionId;
use tokio::sync::watch;

/// What a subscriber reads: the latest snapshot, if any was published.
///
/// The sender side is dropped when the lobby closes, which ends the
/// subscriber's `changed()` loop.
pub type SnapshotFeed = watch::Receiver<Option<Arc<Snapshot>>>;

#[derive(Default)]
struct Topic {
    latest: Option<Arc<Snapshot>>,
    subscribers: HashMap<ConnectionId, watch::Sender<Option<Arc<Snapshot>>>>,
}

#[derive(Default)]
pub struct Fanout {
    topics: DashMap<LobbyId, Topic>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `conn` to `lobby`, replacing any earlier subscription of
    /// the same connection. The slot starts at the lobby's latest snapshot.
    pub fn subscribe(&self, lobby: LobbyId, conn: ConnectionId) -> SnapshotFeed {
        let mut topic = self.topics.entry(lobby).or_default();
        let (tx, rx) = watch::channel(topic.latest.clone());
        topic.subscribers.insert(conn, tx);
        tracing::debug!(lobby_id = %lobby, %conn, subscribers = topic.subscribers.len(), "subscribed");
        rx
    }

    pub fn unsubscribe(&self, lobby: LobbyId, conn: ConnectionId) {
        if let Some(mut topic) = self.topics.get_mut(&lobby) {
            topic.subscribers.remove(&conn);
        }
    }
}

impl SnapshotSink for Fanout {
    fn publish(&self, snapshot: Snapshot) {
        let lobby = snapshot.lobby_id;
        let snapshot = Arc::new(snapshot);
        let mut topic = self.topics.entry(lobby).or_default();
        topic.latest = Some(Arc::clone(&snapshot));
        // A send only fails once the receiver is gone.
        topic
            .subscribers
            .retain(|_, slot| slot.send(Some(Arc::clone(&snapshot))).is_ok());
    }

    fn closed(&self, lobby: LobbyId) {
        if let Some((_, topic)) = self.topics.remove(&lobby) {
            tracing::debug!(lobby_id = %lobby, subscribers = topic.subscribers.len(), "topic closed");
        }
    }
}
