//! Per-connection handler: session lifecycle, commands, and snapshots.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Open a session; if the request path carries `?lobby=<id>`,
//!      subscribe to that lobby right away (spectating)
//!   2. Loop over three sources at once:
//!      - inbound frames → `login` / `logout` / `ping`
//!      - the heartbeat deadline → mark stale, close
//!      - the lobby's snapshot slot → send `state`
//!   3. On exit, close the session and tell the lobby the user went away

use std::sync::Arc;

use dustlobby_lobby::LobbyError;
use dustlobby_protocol::{ClientMessage, Codec, LobbyId, ServerMessage, Snapshot, UserId};
use dustlobby_session::NameResolver;
use dustlobby_transport::{Connection, ConnectionId};
use tokio::time::{Instant, sleep_until};
use url::Url;

use crate::DustlobbyError;
use crate::error::{lobby_status, session_status};
use crate::fanout::SnapshotFeed;
use crate::server::ServerState;

/// Drop guard that tears a session down when the handler exits.
///
/// Runs even if the handler errors out early. Since `Drop` is
/// synchronous, the async cleanup is spawned.
struct SessionGuard<N: NameResolver> {
    conn_id: ConnectionId,
    state: Arc<ServerState<N>>,
}

impl<N: NameResolver> Drop for SessionGuard<N> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let session = state.sessions.lock().await.close(conn_id);
            let Some(session) = session else { return };
            if let Some(lobby) = session.lobby {
                state.router.unsubscribe(lobby, conn_id);
                if let Some(user) = session.user {
                    state.router.disconnect(lobby, user, conn_id).await;
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, N>(
    conn: C,
    state: Arc<ServerState<N>>,
) -> Result<(), DustlobbyError>
where
    C: Connection,
    DustlobbyError: From<C::Error>,
    N: NameResolver,
{
    let conn_id = conn.id();
    let timeout = {
        let mut sessions = state.sessions.lock().await;
        sessions.open(conn_id, Instant::now());
        sessions.config().heartbeat_timeout
    };
    let _guard = SessionGuard {
        conn_id,
        state: Arc::clone(&state),
    };
    tracing::debug!(%conn_id, path = conn.path(), "handling new connection");

    let mut subscription = None;
    match requested_lobby(conn.path()) {
        Ok(None) => {}
        Ok(Some(lobby)) => match subscribe(&state, conn_id, lobby).await {
            Ok(sub) => subscription = Some(sub),
            Err(e) => {
                send_error(&conn, &state, lobby_status(&e), &e.to_string()).await?;
                conn.close().await?;
                return Ok(());
            }
        },
        Err(message) => {
            send_error(&conn, &state, 400, &message).await?;
            conn.close().await?;
            return Ok(());
        }
    }

    let mut deadline = Instant::now() + timeout;
    loop {
        tokio::select! {
            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                deadline = state.sessions.lock().await.touch(conn_id, Instant::now())?;
                handle_frame(&conn, &state, &mut subscription, &data).await?;
            }
            () = sleep_until(deadline) => {
                state.sessions.lock().await.mark_stale(conn_id)?;
                let _ = conn.close().await;
                break;
            }
            snapshot = next_snapshot(&mut subscription) => {
                match snapshot {
                    Some(snapshot) => send_state(&conn, &state, &snapshot).await?,
                    None => {
                        tracing::info!(%conn_id, "lobby closed, closing connection");
                        let _ = conn.close().await;
                        break;
                    }
                }
            }
        }
    }

    // _guard drops here → session cleanup fires.
    Ok(())
}

/// Parses `?lobby=<id>` from the request path.
fn requested_lobby(path: &str) -> Result<Option<LobbyId>, String> {
    let url = Url::parse(&format!("ws://localhost{path}"))
        .map_err(|e| format!("invalid request path: {e}"))?;
    let Some((_, value)) = url.query_pairs().find(|(key, _)| key == "lobby") else {
        return Ok(None);
    };
    value
        .parse()
        .map(|id| Some(LobbyId(id)))
        .map_err(|_| format!("invalid lobby id `{value}`"))
}

/// Binds the session to `lobby` and subscribes to its snapshots.
async fn subscribe<N: NameResolver>(
    state: &ServerState<N>,
    conn_id: ConnectionId,
    lobby: LobbyId,
) -> Result<SnapshotFeed, LobbyError> {
    let mut feed = state.router.subscribe(lobby, conn_id)?;
    if let Err(e) = state.sessions.lock().await.bind_lobby(conn_id, lobby) {
        tracing::warn!(%conn_id, lobby_id = %lobby, error = %e, "session already bound");
    }
    // The slot starts at the latest snapshot; mark it so the loop sends it.
    feed.mark_changed();
    Ok(feed)
}

/// Waits for the next snapshot. `None` once the lobby has closed.
/// Never resolves without a subscription.
async fn next_snapshot(subscription: &mut Option<SnapshotFeed>) -> Option<Arc<Snapshot>> {
    let Some(feed) = subscription else {
        return std::future::pending().await;
    };
    loop {
        feed.changed().await.ok()?;
        if let Some(snapshot) = feed.borrow_and_update().clone() {
            return Some(snapshot);
        }
    }
}

async fn handle_frame<C, N>(
    conn: &C,
    state: &Arc<ServerState<N>>,
    subscription: &mut Option<SnapshotFeed>,
    data: &[u8],
) -> Result<(), DustlobbyError>
where
    C: Connection,
    DustlobbyError: From<C::Error>,
    N: NameResolver,
{
    let conn_id = conn.id();
    let message = match state
        .codec
        .decode::<ClientMessage>(data)
        .and_then(|m| m.validate().map(|()| m))
    {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "rejected client message");
            send_error(conn, state, 400, &e.to_string()).await?;
            return Ok(());
        }
    };

    match message {
        ClientMessage::Ping => {
            let pong = state.codec.encode(&ServerMessage::Pong)?;
            conn.send(&pong).await?;
        }
        ClientMessage::Login { user_id } => {
            login(conn, state, subscription, user_id).await?;
        }
        ClientMessage::Logout => {
            let (user, lobby) = {
                let mut sessions = state.sessions.lock().await;
                let user = sessions.logout(conn_id)?;
                (user, sessions.get(conn_id).and_then(|s| s.lobby))
            };
            if let (Some(user), Some(lobby)) = (user, lobby) {
                tracing::info!(%conn_id, %user, lobby_id = %lobby, "logout");
                if let Err(e) = state.router.leave(lobby, user, conn_id).await {
                    send_error(conn, state, lobby_status(&e), &e.to_string()).await?;
                }
            }
        }
    }
    Ok(())
}

async fn login<C, N>(
    conn: &C,
    state: &Arc<ServerState<N>>,
    subscription: &mut Option<SnapshotFeed>,
    user: UserId,
) -> Result<(), DustlobbyError>
where
    C: Connection,
    DustlobbyError: From<C::Error>,
    N: NameResolver,
{
    let conn_id = conn.id();
    let name = match state.names.resolve(user).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(%conn_id, %user, error = %e, "login rejected");
            send_error(conn, state, session_status(&e), &e.to_string()).await?;
            return Ok(());
        }
    };

    let (previous, lobby) = {
        let mut sessions = state.sessions.lock().await;
        let previous = sessions.login(conn_id, user)?;
        (previous, sessions.get(conn_id).and_then(|s| s.lobby))
    };

    match lobby {
        Some(lobby) => {
            if let Some(previous) = previous {
                let _ = state.router.leave(lobby, previous, conn_id).await;
            }
            if let Err(e) = state.router.join(lobby, user, name, conn_id).await {
                send_error(conn, state, lobby_status(&e), &e.to_string()).await?;
            }
        }
        None => match state.router.create(Some((user, name, conn_id))).await {
            Ok(handle) => match subscribe(state, conn_id, handle.id()).await {
                Ok(sub) => *subscription = Some(sub),
                Err(e) => send_error(conn, state, lobby_status(&e), &e.to_string()).await?,
            },
            Err(e) => {
                send_error(conn, state, lobby_status(&e), &e.to_string()).await?;
            }
        },
    }
    tracing::info!(%conn_id, %user, "login");
    Ok(())
}

async fn send_state<C, N>(
    conn: &C,
    state: &ServerState<N>,
    snapshot: &Snapshot,
) -> Result<(), DustlobbyError>
where
    C: Connection,
    DustlobbyError: From<C::Error>,
    N: NameResolver,
{
    let text = state.codec.encode(&ServerMessage::State(snapshot.clone()))?;
    conn.send(&text).await?;
    Ok(())
}

/// Sends an `error` frame to the client. The connection stays open.
async fn send_error<C, N>(
    conn: &C,
    state: &ServerState<N>,
    code: u16,
    message: &str,
) -> Result<(), DustlobbyError>
where
    C: Connection,
    DustlobbyError: From<C::Error>,
    N: NameResolver,
{
    let text = state.codec.encode(&ServerMessage::Error {
        code,
        message: message.to_string(),
    })?;
    conn.send(&text).await?;
    Ok(())
}
