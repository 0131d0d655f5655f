//! Error types for the lobby layer.

use dustlobby_protocol::{LobbyId, Phase};

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The lobby does not exist (never created, or already closed).
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// The server is already running the maximum number of lobbies.
    #[error("lobby limit of {0} reached")]
    CapacityReached(usize),

    /// The lobby's command queue is closed or full.
    #[error("lobby {0} is unavailable")]
    Unavailable(LobbyId),

    /// The command isn't valid in the lobby's current phase.
    #[error("lobby {lobby} cannot {action} while in {phase}")]
    InvalidPhase {
        lobby: LobbyId,
        phase: Phase,
        action: &'static str,
    },

    /// A game parameter is missing or out of range.
    #[error("invalid game config: {0}")]
    InvalidConfig(String),

    /// A round was requested but no level has ever been chosen.
    #[error("lobby {0} has no level selected")]
    NoLevel(LobbyId),

    /// No level exists with this id.
    #[error("unknown level {0}")]
    UnknownLevel(u64),

    /// The level metadata service failed.
    #[error("level lookup failed: {0}")]
    LevelLookup(String),
}
