//! Messages exchanged on the client channel, and the lobby [`Snapshot`].
//!
//! Both directions use internally tagged JSON objects:
//!
//! ```text
//! client → server   {"type":"login","user_id":789}
//!                   {"type":"logout"}
//!                   {"type":"ping"}
//! server → client   {"type":"pong"}
//!                   {"type":"state","lobby_id":1,"phase":"round",...}
//!                   {"type":"error","code":404,"message":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{
    LevelInfo, LobbyId, Mode, Phase, RosterEntry, ScoreEntry, TimerWindow, UserId,
};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Commands a client may send.
///
/// Unknown `type` tags fail to decode, which the server reports as a
/// validation error without closing the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the connection's lobby as `user_id`, creating a lobby first
    /// when the connection isn't bound to one.
    Login { user_id: UserId },
    /// Leave the lobby immediately (no grace period).
    Logout,
    /// Liveness probe; answered with [`ServerMessage::Pong`].
    Ping,
}

impl ClientMessage {
    /// Checks rules that decoding alone can't express.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidMessage` for a `user_id` outside
    /// `1..=UserId::MAX`.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Login { user_id } if !user_id.is_valid() => {
                Err(ProtocolError::InvalidMessage(format!(
                    "user_id {} out of range 1..={}",
                    user_id.0,
                    UserId::MAX
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    /// The full current state of the subscribed lobby.
    State(Snapshot),
    /// Diagnostic for a rejected command. `code` follows HTTP
    /// conventions (400 validation, 404 unknown lobby, 503 unavailable).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The externally visible projection of one lobby.
///
/// Every broadcast carries a full snapshot rather than a diff, so a client
/// that just (re)connected converges from the next snapshot alone and a
/// slow subscriber can safely skip all but the latest one.
///
/// At most one of the three timer fields is set: the one named after
/// [`Snapshot::phase`]. Use [`Snapshot::set_timer`] to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub lobby_id: LobbyId,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warmup_timer: Option<TimerWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    round_timer: Option<TimerWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    break_timer: Option<TimerWindow>,
    #[serde(default)]
    pub users: Vec<RosterEntry>,
    /// Ranked best first. Absent until a round has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<ScoreEntry>>,
    /// Name of the previous round's best player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

impl Snapshot {
    /// An empty snapshot of an idle lobby.
    pub fn new(lobby_id: LobbyId) -> Self {
        Self {
            lobby_id,
            phase: Phase::Idle,
            mode: None,
            level: None,
            warmup_timer: None,
            round_timer: None,
            break_timer: None,
            users: Vec::new(),
            scores: None,
            winner: None,
        }
    }

    /// Sets `phase` and its timer window, clearing the other two timers.
    pub fn set_timer(&mut self, phase: Phase, window: Option<TimerWindow>) {
        self.phase = phase;
        self.warmup_timer = None;
        self.round_timer = None;
        self.break_timer = None;
        let slot = match phase {
            Phase::Idle => return,
            Phase::Warmup => &mut self.warmup_timer,
            Phase::Round => &mut self.round_timer,
            Phase::Break => &mut self.break_timer,
        };
        *slot = window;
    }

    /// The active timer window, if any.
    pub fn timer(&self) -> Option<TimerWindow> {
        self.warmup_timer.or(self.round_timer).or(self.break_timer)
    }

    /// Whether `user` is on the roster.
    pub fn has_user(&self, user: UserId) -> bool {
        self.users.iter().any(|u| u.user_id == user)
    }
}
