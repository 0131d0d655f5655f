//! Core types shared by the wire format and the lobby engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's numeric game account id.
///
/// This is the only identity the service knows about: there are no
/// passwords or tokens for players. `#[serde(transparent)]` keeps it a
/// plain number on the wire, so `UserId(42)` is just `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Largest account id the game hands out.
    pub const MAX: u64 = 1_000_000;

    /// Whether this id could belong to a real account (`1..=MAX`).
    pub fn is_valid(self) -> bool {
        (1..=Self::MAX).contains(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A lobby's id. Allocated sequentially starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LobbyId(pub u64);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The round lifecycle of a lobby.
///
/// ```text
///   Idle ──start──▶ Warmup ──▶ Round ──▶ Break ──▶ Round ...
///    ▲                                     │
///    └──────────── no rounds left ─────────┘
/// ```
///
/// Every phase except `Idle` has a deadline. The JSON form is lowercase,
/// matching the timer field names (`warmup_timer`, `round_timer`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No round scheduled; the roster is freely mutable.
    #[default]
    Idle,
    /// Countdown before the first round.
    Warmup,
    /// Scores for the active level are being collected.
    Round,
    /// Scores are frozen; waiting for the next round.
    Break,
}

impl Phase {
    /// Whether a transition `self → next` is a legal lifecycle step.
    ///
    /// `Break → Idle` is legal only when no further rounds are scheduled;
    /// that decision belongs to the lobby, not to this table.
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Warmup)
                | (Phase::Warmup, Phase::Round)
                | (Phase::Round, Phase::Break)
                | (Phase::Break, Phase::Round)
                | (Phase::Break, Phase::Idle)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Warmup => write!(f, "warmup"),
            Phase::Round => write!(f, "round"),
            Phase::Break => write!(f, "break"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Which finished runs count towards the score table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Any finished run counts.
    #[default]
    Any,
    /// Only runs with top completion and finesse (an "SS") count.
    Ss,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Mode::Any),
            "ss" => Ok(Mode::Ss),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Any => write!(f, "any"),
            Mode::Ss => write!(f, "ss"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot parts
// ---------------------------------------------------------------------------

/// Descriptive metadata for the selected level, as clients display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub name: String,
    pub play_uri: String,
    pub image_uri: String,
    /// Absent for the game's built-in levels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atlas_uri: Option<String>,
    pub leaderboard_uri: String,
}

/// The absolute start and end of the active phase.
///
/// Serialized as RFC 3339 UTC timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimerWindow {
    /// Whether `at` falls inside the window (start and end inclusive).
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// One roster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub user_name: String,
}

/// One row of the score table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub user_id: UserId,
    pub user_name: String,
    /// 0–5.
    pub completion: u8,
    /// 0–5.
    pub finesse: u8,
    pub time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_valid_bounds() {
        assert!(!UserId(0).is_valid());
        assert!(UserId(1).is_valid());
        assert!(UserId(1_000_000).is_valid());
        assert!(!UserId(1_000_001).is_valid());
    }

    #[test]
    fn test_user_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&UserId(789)).unwrap(), "789");
    }

    #[test]
    fn test_lobby_id_display() {
        assert_eq!(LobbyId(3).to_string(), "L-3");
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Warmup).unwrap(), "\"warmup\"");
        assert_eq!(serde_json::to_string(&Phase::Break).unwrap(), "\"break\"");
    }

    #[test]
    fn test_phase_transitions_follow_lifecycle() {
        assert!(Phase::Idle.can_transition_to(Phase::Warmup));
        assert!(Phase::Warmup.can_transition_to(Phase::Round));
        assert!(Phase::Round.can_transition_to(Phase::Break));
        assert!(Phase::Break.can_transition_to(Phase::Round));
        assert!(Phase::Break.can_transition_to(Phase::Idle));

        assert!(!Phase::Idle.can_transition_to(Phase::Round));
        assert!(!Phase::Warmup.can_transition_to(Phase::Break));
        assert!(!Phase::Round.can_transition_to(Phase::Warmup));
        assert!(!Phase::Round.can_transition_to(Phase::Idle));
    }

    #[test]
    fn test_mode_parses_form_values() {
        assert_eq!("any".parse::<Mode>(), Ok(Mode::Any));
        assert_eq!("ss".parse::<Mode>(), Ok(Mode::Ss));
        assert!("SS".parse::<Mode>().is_err());
    }

    #[test]
    fn test_level_info_omits_missing_atlas_uri() {
        let info = LevelInfo {
            name: "downhill".into(),
            play_uri: "dustforce://installPlay/0/downhill".into(),
            image_uri: "https://atlas.dustforce.com/gi/maps/downhill.png".into(),
            atlas_uri: None,
            leaderboard_uri: "https://dustkid.com/level/downhill".into(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("atlas_uri").is_none());
    }

    #[test]
    fn test_timer_window_contains_is_inclusive() {
        let start = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        let end = DateTime::<Utc>::from_timestamp(1_060, 0).unwrap();
        let window = TimerWindow { start, end };
        assert!(window.contains(start));
        assert!(window.contains(end));
        assert!(!window.contains(DateTime::<Utc>::from_timestamp(1_061, 0).unwrap()));
    }
}
