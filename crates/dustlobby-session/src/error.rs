//! Error types for the session layer.

use dustlobby_protocol::{LobbyId, UserId};
use dustlobby_transport::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is registered for the connection.
    #[error("no session for {0}")]
    NotFound(ConnectionId),

    /// The connection is already bound to a different lobby.
    /// A session may be associated with at most one lobby.
    #[error("{conn} is bound to lobby {bound}, not {requested}")]
    AlreadyBound {
        conn: ConnectionId,
        bound: LobbyId,
        requested: LobbyId,
    },

    /// The user id doesn't belong to a known account.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// The name lookup service couldn't be reached or answered garbage.
    #[error("name lookup failed: {0}")]
    LookupFailed(String),
}
