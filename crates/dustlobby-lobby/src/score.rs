//! Score events and ranking.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use dustlobby_protocol::{Mode, ScoreEntry, UserId};

/// Highest completion or finesse grade.
pub const MAX_GRADE: u8 = 5;

/// One finished run reported by the external feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEvent {
    pub user_id: UserId,
    pub map_id: u64,
    /// 0–5.
    pub completion: u8,
    /// 0–5.
    pub finesse: u8,
    pub time_ms: u64,
    /// When the run finished, if the feed says. Used to drop runs
    /// finished outside the round and to keep the later of two reports.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScoreEvent {
    /// Whether both grades are in `0..=5`.
    pub fn is_well_formed(&self) -> bool {
        self.completion <= MAX_GRADE && self.finesse <= MAX_GRADE
    }

    /// Whether this run counts under `mode`.
    pub fn counts_in(&self, mode: Mode) -> bool {
        match mode {
            Mode::Any => true,
            Mode::Ss => self.completion == MAX_GRADE && self.finesse == MAX_GRADE,
        }
    }
}

/// A run as stored in a lobby's score table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScoreRecord {
    /// The name at the time the run was accepted, so the row survives
    /// the user leaving the roster later.
    pub user_name: String,
    pub completion: u8,
    pub finesse: u8,
    pub time_ms: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScoreRecord {
    pub fn new(event: &ScoreEvent, user_name: String) -> Self {
        Self {
            user_name,
            completion: event.completion,
            finesse: event.finesse,
            time_ms: event.time_ms,
            timestamp: event.timestamp,
        }
    }

    pub fn entry(&self, user_id: UserId) -> ScoreEntry {
        ScoreEntry {
            user_id,
            user_name: self.user_name.clone(),
            completion: self.completion,
            finesse: self.finesse,
            time_ms: self.time_ms,
        }
    }
}

/// Best first: higher combined grade, then faster time, then earlier
/// finish, then lower user id so the order is total.
pub(crate) fn rank(
    a: &ScoreEntry,
    a_at: Option<DateTime<Utc>>,
    b: &ScoreEntry,
    b_at: Option<DateTime<Utc>>,
) -> Ordering {
    let grade = |e: &ScoreEntry| u16::from(e.completion) + u16::from(e.finesse);
    grade(b)
        .cmp(&grade(a))
        .then(a.time_ms.cmp(&b.time_ms))
        .then(a_at.cmp(&b_at))
        .then(a.user_id.cmp(&b.user_id))
}
