//! Lobby manager: creates, tracks, and tears down lobby actors.

use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use dustlobby_protocol::{LobbyId, UserId};
use dustlobby_timer::PhaseClock;
use dustlobby_transport::ConnectionId;
use tokio::task::JoinHandle;

use crate::actor::spawn_lobby;
use crate::{LobbyConfig, LobbyError, LobbyHandle, SnapshotSink};

/// Owns every live lobby.
///
/// Cheap to clone. Lookups are lock-free; creation takes one short
/// mutex so ids stay dense and the capacity check can't race.
#[derive(Clone)]
pub struct LobbyManager {
    inner: Arc<Inner>,
}

struct Inner {
    lobbies: DashMap<LobbyId, LobbyHandle>,
    /// Next id to hand out. Held across the capacity check and insert.
    next_id: Mutex<u64>,
    config: LobbyConfig,
    sink: Arc<dyn SnapshotSink>,
    clock: PhaseClock,
}

impl LobbyManager {
    pub fn new(config: LobbyConfig, sink: Arc<dyn SnapshotSink>) -> Self {
        Self::with_clock(config, sink, PhaseClock::new())
    }

    /// Like [`LobbyManager::new`], with every lobby's wall-clock timers
    /// computed from `clock`.
    pub fn with_clock(config: LobbyConfig, sink: Arc<dyn SnapshotSink>, clock: PhaseClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                lobbies: DashMap::new(),
                next_id: Mutex::new(1),
                config,
                sink,
                clock,
            }),
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.inner.config
    }

    /// Starts a new idle lobby, with `owner` on its roster if given.
    ///
    /// # Errors
    /// [`LobbyError::CapacityReached`] when `max_lobbies` are live.
    pub fn create(
        &self,
        owner: Option<(UserId, String, ConnectionId)>,
    ) -> Result<LobbyHandle, LobbyError> {
        let max = self.inner.config.max_lobbies;
        let mut next_id = self
            .inner
            .next_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.inner.lobbies.len() >= max {
            tracing::warn!(max, "lobby limit reached");
            return Err(LobbyError::CapacityReached(max));
        }

        let id = LobbyId(*next_id);
        *next_id += 1;
        let owner_id = owner.as_ref().map(|(user, _, _)| *user);
        let (handle, task) = spawn_lobby(
            id,
            self.inner.config.clone(),
            self.inner.clock,
            Arc::clone(&self.inner.sink),
            owner,
        );
        self.inner.lobbies.insert(id, handle.clone());
        drop(next_id);

        tokio::spawn(supervise(Arc::downgrade(&self.inner), id, task));
        tracing::info!(lobby_id = %id, owner = ?owner_id, "lobby created");
        Ok(handle)
    }

    /// # Errors
    /// [`LobbyError::NotFound`] if no live lobby has this id.
    pub fn get(&self, id: LobbyId) -> Result<LobbyHandle, LobbyError> {
        self.inner
            .lobbies
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(LobbyError::NotFound(id))
    }

    /// Unregisters the lobby and tells its actor to stop.
    pub async fn destroy(&self, id: LobbyId) -> Result<(), LobbyError> {
        let (_, handle) = self
            .inner
            .lobbies
            .remove(&id)
            .ok_or(LobbyError::NotFound(id))?;
        // Already stopping if this fails; the supervisor finishes up.
        let _ = handle.close().await;
        tracing::info!(lobby_id = %id, "lobby destroyed");
        Ok(())
    }

    /// Handles to every live lobby, for scans that shouldn't hold the map.
    pub fn handles(&self) -> Vec<LobbyHandle> {
        self.inner
            .lobbies
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<LobbyId> {
        let mut ids: Vec<_> = self.inner.lobbies.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lobbies.is_empty()
    }
}

/// Waits for a lobby's actor to exit, then unregisters it and closes its
/// topic. A panicking actor takes down only its own lobby.
async fn supervise(inner: Weak<Inner>, id: LobbyId, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if e.is_panic() {
            tracing::error!(lobby_id = %id, "lobby actor panicked");
        } else {
            tracing::warn!(lobby_id = %id, error = %e, "lobby actor cancelled");
        }
    }
    let Some(inner) = inner.upgrade() else {
        return;
    };
    inner.lobbies.remove(&id);
    inner.sink.closed(id);
}
