//! Feed records and their conversion into score events.

use chrono::DateTime;
use dustlobby_lobby::{Level, ScoreEvent};
use dustlobby_protocol::UserId;
use serde::Deserialize;

use crate::FeedError;

/// One finished run as published by the feed.
///
/// The feed sends many more fields (replay ids, input counts, ranks);
/// only the ones a lobby scores on are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedEvent {
    pub user: u64,
    /// Level filename, `<name>-<id>` for atlas levels.
    pub level: String,
    /// Run time in milliseconds.
    pub time: u64,
    pub score_completion: u8,
    pub score_finesse: u8,
    /// Unix seconds when the run finished.
    pub timestamp: i64,
    #[serde(default)]
    pub username: String,
}

impl FeedEvent {
    /// Parses one non-empty record.
    pub fn parse(record: &[u8]) -> Result<Self, FeedError> {
        Ok(serde_json::from_slice(record)?)
    }

    /// The score a lobby would apply, or `None` for runs on levels with no
    /// atlas id (built-in levels can't be selected for a game).
    pub fn to_score(&self) -> Option<ScoreEvent> {
        let map_id = Level::from_filename(self.level.as_str()).id()?;
        Some(ScoreEvent {
            user_id: UserId(self.user),
            map_id,
            completion: self.score_completion,
            finesse: self.score_finesse,
            time_ms: self.time,
            timestamp: DateTime::from_timestamp(self.timestamp, 0),
        })
    }
}
