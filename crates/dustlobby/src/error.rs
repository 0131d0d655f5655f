//! Unified error type for the Dustlobby server.

use dustlobby_feed::FeedError;
use dustlobby_lobby::LobbyError;
use dustlobby_protocol::ProtocolError;
use dustlobby_session::SessionError;
use dustlobby_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DustlobbyError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unknown user, name lookup).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A lobby-level error (not found, wrong phase, capacity).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The score feed failed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// The configuration couldn't be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding or serving the admin listener failed.
    #[error("admin server: {0}")]
    Admin(#[source] std::io::Error),
}

/// Errors loading [`ServerConfig`](crate::ServerConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The status code a rejected lobby operation reports, on the admin API
/// and in client error frames alike.
pub(crate) fn lobby_status(error: &LobbyError) -> u16 {
    match error {
        LobbyError::NotFound(_) => 404,
        LobbyError::CapacityReached(_) | LobbyError::Unavailable(_) => 503,
        LobbyError::InvalidPhase { .. } => 409,
        LobbyError::InvalidConfig(_) | LobbyError::NoLevel(_) | LobbyError::UnknownLevel(_) => {
            400
        }
        LobbyError::LevelLookup(_) => 502,
    }
}

/// Status code for a rejected login.
pub(crate) fn session_status(error: &SessionError) -> u16 {
    match error {
        SessionError::UnknownUser(_) => 400,
        SessionError::LookupFailed(_) => 503,
        SessionError::NotFound(_) | SessionError::AlreadyBound { .. } => 409,
    }
}

#[cfg(test)]
mod tests {
    use dustlobby_protocol::{LobbyId, Phase, UserId};

    use super::*;

    #[test]
    fn test_from_lobby_error() {
        let err: DustlobbyError = LobbyError::NotFound(LobbyId(4)).into();
        assert!(matches!(err, DustlobbyError::Lobby(_)));
        assert!(err.to_string().contains("L-4"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DustlobbyError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, DustlobbyError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: DustlobbyError = SessionError::UnknownUser(UserId(9)).into();
        assert!(matches!(err, DustlobbyError::Session(_)));
    }

    #[test]
    fn test_lobby_status_codes() {
        assert_eq!(lobby_status(&LobbyError::NotFound(LobbyId(1))), 404);
        assert_eq!(lobby_status(&LobbyError::CapacityReached(100)), 503);
        assert_eq!(
            lobby_status(&LobbyError::InvalidPhase {
                lobby: LobbyId(1),
                phase: Phase::Round,
                action: "start a game",
            }),
            409
        );
        assert_eq!(lobby_status(&LobbyError::InvalidConfig("x".into())), 400);
        assert_eq!(lobby_status(&LobbyError::LevelLookup("down".into())), 502);
    }

    #[test]
    fn test_session_status_codes() {
        assert_eq!(session_status(&SessionError::UnknownUser(UserId(1))), 400);
        assert_eq!(session_status(&SessionError::LookupFailed("x".into())), 503);
    }
}
