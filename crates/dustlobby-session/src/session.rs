//! Session types: the server's record of one live connection.
//!
//! A session is independent of lobby membership. It tracks:
//! - WHICH connection it is (`ConnectionId`)
//! - WHO logged in on it, if anyone (`UserId`)
//! - WHICH lobby it is bound to, if any (`LobbyId`)
//! - WHEN the client was last heard from (for the heartbeat timeout)

use std::time::Duration;

use dustlobby_protocol::{LobbyId, UserId};
use dustlobby_transport::ConnectionId;
use tokio::time::Instant;

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a connection may stay silent before the server considers
    /// it stale and closes it.
    ///
    /// Independent of the lobby's roster grace period: a stale session
    /// ends, but its user keeps their roster slot for the grace window.
    pub heartbeat_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Liveness of a session.
///
/// ```text
///   Active ──(no traffic for heartbeat_timeout)──→ Stale ──→ closed
///     ↑                                              │
///     └──────────(any inbound frame)─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Missed the heartbeat deadline; about to be closed.
    Stale,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One live client connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user: Option<UserId>,
    pub lobby: Option<LobbyId>,
    pub last_heartbeat: Instant,
    pub state: SessionState,
}

impl Session {
    pub fn new(connection_id: ConnectionId, now: Instant) -> Self {
        Self {
            connection_id,
            user: None,
            lobby: None,
            last_heartbeat: now,
            state: SessionState::Active,
        }
    }

    /// Records inbound traffic. Any frame counts as a heartbeat.
    pub fn touch(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.state = SessionState::Active;
    }

    /// When the session goes stale if nothing else arrives.
    pub fn heartbeat_deadline(&self, timeout: Duration) -> Instant {
        self.last_heartbeat + timeout
    }

    /// Associates the session with `lobby`.
    ///
    /// Re-binding to the same lobby is a no-op.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyBound`] if the session is bound to
    /// a different lobby.
    pub fn bind_lobby(&mut self, lobby: LobbyId) -> Result<(), SessionError> {
        match self.lobby {
            Some(bound) if bound != lobby => Err(SessionError::AlreadyBound {
                conn: self.connection_id,
                bound,
                requested: lobby,
            }),
            _ => {
                self.lobby = Some(lobby);
                Ok(())
            }
        }
    }
}
