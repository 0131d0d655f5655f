//! Connection sessions for Dustlobby.
//!
//! This crate handles the client side of membership:
//!
//! 1. **Session tracking**: who is on each connection, which lobby the
//!    connection is bound to, and when it was last heard from
//!    ([`Session`], [`SessionRegistry`]).
//! 2. **Display names**: turning a bare numeric user id into the name the
//!    lobby shows ([`NameResolver`]).
//! 3. **Reconnection**: the client-side link state machine with
//!    exponential backoff ([`ReconnectMachine`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby Layer (above)     ← rosters are keyed by the UserId a session logs in as
//!     ↕
//! Session Layer (this)    ← connection identity, heartbeats, reconnects
//!     ↕
//! Transport + Protocol    ← ConnectionId, UserId, LobbyId
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod names;
mod reconnect;
mod registry;
mod session;

pub use error::SessionError;
pub use names::{NameResolver, NumericNames, StaticNames};
pub use reconnect::{LinkAction, LinkEvent, LinkState, ReconnectMachine};
pub use registry::SessionRegistry;
pub use session::{Session, SessionConfig, SessionState};
