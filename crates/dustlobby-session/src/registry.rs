//! The session registry: every live connection and what it is bound to.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is a plain `HashMap`, not a concurrent one. The
//! server wraps it in a mutex and only ever holds the lock for the
//! duration of one of these synchronous calls, never across an await.

use std::collections::HashMap;

use dustlobby_protocol::{LobbyId, UserId};
use dustlobby_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Tracks all live sessions, keyed by connection.
///
/// ```text
/// open() ──→ login() ──→ bind_lobby() ──→ touch() ... ──→ close()
///               │                            │
///               ▼                            ▼ (deadline passed)
///            logout()                    mark_stale() ──→ close()
/// ```
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a freshly accepted connection.
    pub fn open(&mut self, conn: ConnectionId, now: Instant) -> &Session {
        tracing::debug!(%conn, "session opened");
        self.sessions
            .entry(conn)
            .or_insert_with(|| Session::new(conn, now))
    }

    pub fn get(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    /// Records inbound traffic and returns the new heartbeat deadline.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] for an unknown connection.
    pub fn touch(&mut self, conn: ConnectionId, now: Instant) -> Result<Instant, SessionError> {
        let timeout = self.config.heartbeat_timeout;
        let session = self.session_mut(conn)?;
        session.touch(now);
        Ok(session.heartbeat_deadline(timeout))
    }

    /// Sets the user logged in on `conn`.
    ///
    /// Returns the user previously logged in on this connection when it
    /// differs from `user`, so the caller can take that user out of
    /// the lobby first. A repeat login as the same user returns `None`.
    pub fn login(
        &mut self,
        conn: ConnectionId,
        user: UserId,
    ) -> Result<Option<UserId>, SessionError> {
        let session = self.session_mut(conn)?;
        let previous = session.user.replace(user).filter(|prev| *prev != user);
        tracing::debug!(%conn, %user, "session logged in");
        Ok(previous)
    }

    /// Clears the user on `conn`, returning who was logged in.
    pub fn logout(&mut self, conn: ConnectionId) -> Result<Option<UserId>, SessionError> {
        Ok(self.session_mut(conn)?.user.take())
    }

    /// Binds `conn` to `lobby`. See [`Session::bind_lobby`].
    pub fn bind_lobby(&mut self, conn: ConnectionId, lobby: LobbyId) -> Result<(), SessionError> {
        self.session_mut(conn)?.bind_lobby(lobby)
    }

    /// Marks `conn` as having missed its heartbeat deadline.
    pub fn mark_stale(&mut self, conn: ConnectionId) -> Result<(), SessionError> {
        self.session_mut(conn)?.state = SessionState::Stale;
        tracing::info!(%conn, "session stale, no traffic within heartbeat timeout");
        Ok(())
    }

    /// Removes the session, returning its final state.
    pub fn close(&mut self, conn: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&conn);
        if session.is_some() {
            tracing::debug!(%conn, "session closed");
        }
        session
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, conn: ConnectionId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(&conn)
            .ok_or(SessionError::NotFound(conn))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionConfig::default())
    }

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[test]
    fn test_open_registers_session() {
        let mut reg = registry();
        reg.open(conn(1), Instant::now());
        assert_eq!(reg.len(), 1);
        assert!(reg.get(conn(1)).is_some());
    }

    #[test]
    fn test_touch_unknown_connection_returns_not_found() {
        let mut reg = registry();
        let result = reg.touch(conn(9), Instant::now());
        assert!(matches!(result, Err(SessionError::NotFound(c)) if c == conn(9)));
    }

    #[test]
    fn test_touch_returns_deadline_from_config() {
        let mut reg = registry();
        let now = Instant::now();
        reg.open(conn(1), now);
        let deadline = reg.touch(conn(1), now).unwrap();
        assert_eq!(deadline, now + Duration::from_secs(15));
    }

    #[test]
    fn test_login_same_user_twice_reports_no_previous() {
        let mut reg = registry();
        reg.open(conn(1), Instant::now());

        assert_eq!(reg.login(conn(1), UserId(123)).unwrap(), None);
        assert_eq!(reg.login(conn(1), UserId(123)).unwrap(), None);
    }

    #[test]
    fn test_login_different_user_reports_previous() {
        let mut reg = registry();
        reg.open(conn(1), Instant::now());
        reg.login(conn(1), UserId(123)).unwrap();

        let previous = reg.login(conn(1), UserId(789)).unwrap();

        assert_eq!(previous, Some(UserId(123)));
        assert_eq!(reg.get(conn(1)).unwrap().user, Some(UserId(789)));
    }

    #[test]
    fn test_logout_returns_and_clears_user() {
        let mut reg = registry();
        reg.open(conn(1), Instant::now());
        reg.login(conn(1), UserId(5)).unwrap();

        assert_eq!(reg.logout(conn(1)).unwrap(), Some(UserId(5)));
        assert_eq!(reg.logout(conn(1)).unwrap(), None);
    }

    #[test]
    fn test_mark_stale_then_close_removes_session() {
        let mut reg = registry();
        reg.open(conn(1), Instant::now());
        reg.mark_stale(conn(1)).unwrap();
        assert_eq!(reg.get(conn(1)).unwrap().state, SessionState::Stale);

        let closed = reg.close(conn(1)).unwrap();

        assert_eq!(closed.state, SessionState::Stale);
        assert!(reg.is_empty());
        assert!(reg.close(conn(1)).is_none());
    }
}
