//! Transport abstraction layer for Dustlobby.
//!
//! Provides the [`Transport`] and [`Connection`] traits the server's
//! connection handler is written against, and a WebSocket implementation.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection. Unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener handing out client connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Pending: Handshake<Connection = Self::Connection, Error = Self::Error>;
    type Error: std::error::Error + Send + Sync;

    /// Resolves once a peer has connected. The protocol upgrade has not
    /// run yet; finish it with [`Handshake::complete`], off the accept
    /// loop, so a silent peer can't hold up the next one.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;

    /// The address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// An accepted peer whose upgrade is still to run.
pub trait Handshake: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Runs the upgrade, failing if the peer doesn't finish it in time.
    async fn complete(self) -> Result<Self::Connection, Self::Error>;
}

/// A single duplex connection carrying text frames out and bytes in.
///
/// `send` and `recv` may be awaited concurrently from different branches
/// of a `select!`; implementations must not serialize one behind the other.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one text frame.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// The payload of the next text or binary frame. Control frames are
    /// skipped. `Ok(None)` once the peer has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a close frame.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// The path and query the client requested when connecting,
    /// e.g. `/?lobby=3`.
    fn path(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
        assert_eq!(ConnectionId::new(2).into_inner(), 2);
    }
}
