//! Wire protocol for Dustlobby.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`UserId`], [`LobbyId`], [`Phase`], [`Mode`], [`LevelInfo`])
//!   shared by every layer of the server.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Snapshot`]) that
//!   travel as JSON text frames.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) converting messages to and
//!   from frame payloads.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (ClientMessage) → Router → Lobby
//! Lobby → Snapshot → Protocol (ServerMessage) → Transport (frames)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, ServerMessage, Snapshot};
pub use types::{
    LevelInfo, LobbyId, Mode, Phase, RosterEntry, ScoreEntry, TimerWindow,
    UserId,
};
