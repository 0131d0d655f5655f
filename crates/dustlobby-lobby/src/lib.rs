//! Lobbies for Dustlobby.
//!
//! Each lobby runs as an isolated Tokio task (actor model) that owns its
//! roster, phase timers, and score table.
//!
//! # Key types
//!
//! - [`Lobby`]: the synchronous state machine (roster, phases, scores)
//! - [`LobbyHandle`]: send commands to a running lobby actor
//! - [`LobbyManager`]: creates, looks up, and destroys lobbies
//! - [`SnapshotSink`]: where lobbies publish their snapshots
//! - [`GameConfig`] / [`GameOverrides`]: phase durations and mode
//! - [`Level`] / [`LevelResolver`]: level descriptors and their lookup

#![allow(async_fn_in_trait)]

mod actor;
mod config;
mod error;
mod level;
mod lobby;
mod manager;
mod score;

pub use actor::{AdminCommand, LobbyHandle, SnapshotSink};
pub use config::{GameConfig, GameOverrides, LobbyConfig};
pub use error::LobbyError;
pub use level::{Level, LevelResolver, StaticLevels};
pub use lobby::{LeaveOutcome, Lobby, LobbyStatus, ScoreOutcome, Transition};
pub use manager::LobbyManager;
pub use score::{MAX_GRADE, ScoreEvent};
