//! # Dustlobby
//!
//! Lobby server for timed Dustforce races.
//!
//! Players connect over WebSocket and log in with their numeric user id.
//! Each lobby is a single-writer actor running warmup, round and break
//! phases on a timer; scores arrive from the public run feed and every
//! change is pushed to the lobby's subscribers as a full snapshot.
//! Operators drive lobbies through a small form-based HTTP API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dustlobby::prelude::*;
//!
//! # async fn run() -> Result<(), DustlobbyError> {
//! let config = ServerConfig::load(None)?;
//! DustlobbyServer::builder(config).build().await?.run().await
//! # }
//! ```

pub mod admin;
pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod levels;
pub mod names;
pub mod router;
pub mod server;

mod handler;

pub use config::ServerConfig;
pub use error::{ConfigError, DustlobbyError};

/// Common imports for running or embedding a server.
pub mod prelude {
    pub use crate::admin::{AdminState, admin_router};
    pub use crate::client::{ClientConfig, ClientEvent, LobbyClient};
    pub use crate::config::ServerConfig;
    pub use crate::error::{ConfigError, DustlobbyError};
    pub use crate::levels::AtlasLevels;
    pub use crate::names::HitboxNames;
    pub use crate::router::LobbyRouter;
    pub use crate::server::{DustlobbyServer, DustlobbyServerBuilder};

    pub use dustlobby_lobby::{GameConfig, LevelResolver, LobbyConfig, StaticLevels};
    pub use dustlobby_protocol::{LobbyId, Mode, Phase, ServerMessage, Snapshot, UserId};
    pub use dustlobby_session::{NameResolver, NumericNames, StaticNames};
    pub use dustlobby_timer::Backoff;
}
