//! Lobby and game configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use dustlobby_protocol::Mode;

use crate::{Level, LobbyError};

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Server-wide settings every lobby is created with.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// How long a user whose last connection dropped keeps their roster
    /// slot. Independent of the session heartbeat timeout.
    pub roster_grace: Duration,

    /// How long a lobby may sit with an empty roster before it closes.
    pub empty_grace: Duration,

    /// Capacity of each lobby's command queue.
    pub channel_size: usize,

    /// Maximum number of live lobbies.
    pub max_lobbies: usize,

    /// Phase durations and mode used when an admin command leaves them out.
    pub default_game: GameConfig,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            roster_grace: Duration::from_secs(30),
            empty_grace: Duration::from_secs(30),
            channel_size: 64,
            max_lobbies: 100,
            default_game: GameConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// How a lobby runs its rounds once a game is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    pub mode: Mode,
    pub warmup_time: Duration,
    pub round_time: Duration,
    pub break_time: Duration,
    /// Rounds to play before returning to idle. `None` repeats forever.
    pub rounds: Option<u32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Any,
            warmup_time: Duration::from_secs(10),
            round_time: Duration::from_secs(600),
            break_time: Duration::from_secs(30),
            rounds: None,
        }
    }
}

impl GameConfig {
    /// Accepted warmup length, in seconds.
    pub const WARMUP_SECS: RangeInclusive<u64> = 1..=300;
    /// Accepted round length, in seconds.
    pub const ROUND_SECS: RangeInclusive<u64> = 1..=7200;
    /// Accepted break length, in seconds.
    pub const BREAK_SECS: RangeInclusive<u64> = 1..=600;

    /// Checks every field against its accepted range.
    ///
    /// # Errors
    /// Returns [`LobbyError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), LobbyError> {
        check_secs("warmup_seconds", self.warmup_time, &Self::WARMUP_SECS)?;
        check_secs("round_seconds", self.round_time, &Self::ROUND_SECS)?;
        check_secs("break_seconds", self.break_time, &Self::BREAK_SECS)?;
        if self.rounds == Some(0) {
            return Err(LobbyError::InvalidConfig("rounds must be at least 1".into()));
        }
        Ok(())
    }
}

fn check_secs(
    field: &str,
    value: Duration,
    range: &RangeInclusive<u64>,
) -> Result<(), LobbyError> {
    let secs = value.as_secs();
    if value.subsec_nanos() != 0 || !range.contains(&secs) {
        return Err(LobbyError::InvalidConfig(format!(
            "{field} must be between {} and {}, got {}",
            range.start(),
            range.end(),
            value.as_secs_f64()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GameOverrides
// ---------------------------------------------------------------------------

/// Optional fields of a `start_round` command. Present fields replace
/// the lobby's current settings; absent fields keep them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameOverrides {
    pub level: Option<Level>,
    pub mode: Option<Mode>,
    pub warmup_time: Option<Duration>,
    pub round_time: Option<Duration>,
    pub break_time: Option<Duration>,
    pub rounds: Option<u32>,
}

impl GameOverrides {
    /// `base` with every present field replaced.
    pub fn apply(&self, base: GameConfig) -> GameConfig {
        GameConfig {
            mode: self.mode.unwrap_or(base.mode),
            warmup_time: self.warmup_time.unwrap_or(base.warmup_time),
            round_time: self.round_time.unwrap_or(base.round_time),
            break_time: self.break_time.unwrap_or(base.break_time),
            rounds: self.rounds.or(base.rounds),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_game_config_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let too_long = GameConfig {
            warmup_time: Duration::from_secs(301),
            ..GameConfig::default()
        };
        let zero_round = GameConfig {
            round_time: Duration::ZERO,
            ..GameConfig::default()
        };
        let fractional = GameConfig {
            break_time: Duration::from_millis(1500),
            ..GameConfig::default()
        };

        for config in [too_long, zero_round, fractional] {
            assert!(matches!(config.validate(), Err(LobbyError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let config = GameConfig {
            rounds: Some(0),
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_only_present_fields() {
        let overrides = GameOverrides {
            mode: Some(Mode::Ss),
            round_time: Some(Duration::from_secs(60)),
            ..GameOverrides::default()
        };

        let merged = overrides.apply(GameConfig::default());

        assert_eq!(merged.mode, Mode::Ss);
        assert_eq!(merged.round_time, Duration::from_secs(60));
        assert_eq!(merged.warmup_time, Duration::from_secs(10));
        assert_eq!(merged.break_time, Duration::from_secs(30));
        assert!(!overrides.is_empty());
        assert!(GameOverrides::default().is_empty());
    }
}
