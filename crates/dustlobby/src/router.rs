//! Routes connection requests to lobbies and lobby snapshots back out.

use std::sync::Arc;

use dashmap::DashMap;
use dustlobby_lobby::{LeaveOutcome, LobbyConfig, LobbyError, LobbyHandle, LobbyManager};
use dustlobby_protocol::{LobbyId, UserId};
use dustlobby_transport::ConnectionId;

use crate::fanout::{Fanout, SnapshotFeed};

/// The server's view of all lobbies.
///
/// Cheap to clone. Wraps the [`LobbyManager`] with the snapshot fan-out
/// and remembers which lobby each user is in, so a user playing in one
/// lobby who joins another is taken out of the first.
#[derive(Clone)]
pub struct LobbyRouter {
    lobbies: LobbyManager,
    fanout: Arc<Fanout>,
    memberships: Arc<DashMap<UserId, LobbyId>>,
}

impl LobbyRouter {
    pub fn new(config: LobbyConfig) -> Self {
        let fanout = Arc::new(Fanout::new());
        let lobbies = LobbyManager::new(config, fanout.clone());
        Self {
            lobbies,
            fanout,
            memberships: Arc::new(DashMap::new()),
        }
    }

    pub fn lobbies(&self) -> &LobbyManager {
        &self.lobbies
    }

    pub fn lobby(&self, id: LobbyId) -> Result<LobbyHandle, LobbyError> {
        self.lobbies.get(id)
    }

    /// Creates a lobby, with `owner` on its roster if given.
    pub async fn create(
        &self,
        owner: Option<(UserId, String, ConnectionId)>,
    ) -> Result<LobbyHandle, LobbyError> {
        let user = owner.as_ref().map(|(user, _, _)| *user);
        let handle = self.lobbies.create(owner)?;
        if let Some(user) = user {
            self.claim(user, handle.id()).await;
        }
        Ok(handle)
    }

    /// Adds `user` to `lobby`, first evicting them from any other lobby.
    pub async fn join(
        &self,
        lobby: LobbyId,
        user: UserId,
        name: String,
        conn: ConnectionId,
    ) -> Result<(), LobbyError> {
        let handle = self.lobbies.get(lobby)?;
        handle.join(user, name, conn).await?;
        self.claim(user, lobby).await;
        Ok(())
    }

    /// Logs `user` out of `lobby` on `conn`. They stay on the roster
    /// while another of their connections is logged in.
    pub async fn leave(
        &self,
        lobby: LobbyId,
        user: UserId,
        conn: ConnectionId,
    ) -> Result<LeaveOutcome, LobbyError> {
        let outcome = self.lobbies.get(lobby)?.leave(user, conn).await?;
        if outcome == LeaveOutcome::Removed {
            self.memberships.remove_if(&user, |_, current| *current == lobby);
        }
        Ok(outcome)
    }

    /// Reports a lost connection. The lobby decides whether to hold the
    /// user's slot.
    pub async fn disconnect(&self, lobby: LobbyId, user: UserId, conn: ConnectionId) {
        if let Ok(handle) = self.lobbies.get(lobby) {
            if let Err(e) = handle.disconnect(user, conn).await {
                tracing::debug!(lobby_id = %lobby, %user, error = %e, "disconnect not delivered");
            }
        }
    }

    /// Subscribes `conn` to `lobby`'s snapshots.
    ///
    /// # Errors
    /// [`LobbyError::NotFound`] if the lobby isn't live.
    pub fn subscribe(&self, lobby: LobbyId, conn: ConnectionId) -> Result<SnapshotFeed, LobbyError> {
        self.lobbies.get(lobby)?;
        Ok(self.fanout.subscribe(lobby, conn))
    }

    pub fn unsubscribe(&self, lobby: LobbyId, conn: ConnectionId) {
        self.fanout.unsubscribe(lobby, conn);
    }

    /// The lobby `user` last joined, if they haven't left it.
    pub fn membership(&self, user: UserId) -> Option<LobbyId> {
        self.memberships.get(&user).map(|entry| *entry.value())
    }

    /// Records `user` as a member of `lobby`, evicting them from the
    /// lobby they were in before.
    async fn claim(&self, user: UserId, lobby: LobbyId) {
        let previous = self.memberships.insert(user, lobby);
        let Some(previous) = previous.filter(|p| *p != lobby) else {
            return;
        };
        if let Ok(handle) = self.lobbies.get(previous) {
            tracing::info!(%user, from = %previous, to = %lobby, "user moved lobbies");
            let _ = handle.evict(user).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[tokio::test]
    async fn test_create_records_owner_membership() {
        let router = LobbyRouter::new(LobbyConfig::default());

        let handle = router
            .create(Some((UserId(123), "alice".into(), conn(1))))
            .await
            .unwrap();

        assert_eq!(router.membership(UserId(123)), Some(handle.id()));
    }

    #[tokio::test]
    async fn test_join_other_lobby_evicts_from_previous() {
        let router = LobbyRouter::new(LobbyConfig::default());
        let first = router
            .create(Some((UserId(123), "alice".into(), conn(1))))
            .await
            .unwrap();
        let second = router.create(None).await.unwrap();

        router
            .join(second.id(), UserId(123), "alice".into(), conn(2))
            .await
            .unwrap();

        assert!(!first.snapshot().await.unwrap().has_user(UserId(123)));
        assert!(second.snapshot().await.unwrap().has_user(UserId(123)));
        assert_eq!(router.membership(UserId(123)), Some(second.id()));
    }

    #[tokio::test]
    async fn test_leave_clears_membership() {
        let router = LobbyRouter::new(LobbyConfig::default());
        let handle = router
            .create(Some((UserId(123), "alice".into(), conn(1))))
            .await
            .unwrap();

        let outcome = router.leave(handle.id(), UserId(123), conn(1)).await.unwrap();

        assert_eq!(outcome, LeaveOutcome::Removed);
        assert_eq!(router.membership(UserId(123)), None);
    }

    #[tokio::test]
    async fn test_leave_on_second_tab_keeps_membership() {
        let router = LobbyRouter::new(LobbyConfig::default());
        let handle = router
            .create(Some((UserId(123), "alice".into(), conn(1))))
            .await
            .unwrap();
        router
            .join(handle.id(), UserId(123), "alice".into(), conn(2))
            .await
            .unwrap();

        let outcome = router.leave(handle.id(), UserId(123), conn(2)).await.unwrap();

        assert_eq!(outcome, LeaveOutcome::StillConnected);
        assert_eq!(router.membership(UserId(123)), Some(handle.id()));
        assert!(handle.snapshot().await.unwrap().has_user(UserId(123)));
    }

    #[tokio::test]
    async fn test_subscribe_unknown_lobby_not_found() {
        let router = LobbyRouter::new(LobbyConfig::default());
        assert!(matches!(
            router.subscribe(LobbyId(9), conn(1)),
            Err(LobbyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscriber_sees_join() {
        let router = LobbyRouter::new(LobbyConfig::default());
        let handle = router.create(None).await.unwrap();
        let mut feed = router.subscribe(handle.id(), conn(1)).unwrap();

        router
            .join(handle.id(), UserId(789), "bob".into(), conn(2))
            .await
            .unwrap();

        feed.changed().await.unwrap();
        assert!(feed.borrow_and_update().as_ref().unwrap().has_user(UserId(789)));
    }
}
