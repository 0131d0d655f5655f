//! Reconnecting WebSocket client.
//!
//! Keeps one user's lobby view alive: pings on an interval, treats a
//! missing pong as a dead link, reconnects with backoff and logs in again.
//! Once the user shows up in a lobby, reconnects ask for that lobby with
//! `?lobby=<id>` so the login rejoins it instead of opening a new one.
//! The decisions come from [`ReconnectMachine`]; this module only does
//! the I/O it asks for.

use std::time::Duration;

use dustlobby_protocol::{
    ClientMessage, Codec, JsonCodec, LobbyId, ServerMessage, Snapshot, UserId,
};
use dustlobby_session::{LinkAction, LinkEvent, LinkState, ReconnectMachine};
use dustlobby_timer::Backoff;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://host:port/`, optionally with `?lobby=<id>`.
    pub url: String,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub backoff: Backoff,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(10),
            backoff: Backoff::default().with_jitter(Duration::from_millis(500)),
        }
    }
}

/// What the client reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    State(Snapshot),
    Error { code: u16, message: String },
}

enum Command {
    Login(UserId),
    Logout,
    Close,
}

/// Handle to a running client task.
pub struct LobbyClient {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<ClientEvent>,
    task: JoinHandle<()>,
}

impl LobbyClient {
    /// Starts connecting in the background.
    pub fn connect(config: ClientConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(16);
        let (event_tx, events) = mpsc::channel(64);
        let task = ClientTask {
            machine: ReconnectMachine::new(config.backoff, config.pong_timeout),
            config,
            commands: command_rx,
            events: event_tx,
            user: None,
            lobby: None,
            codec: JsonCodec,
        };
        Self {
            commands,
            events,
            task: tokio::spawn(task.run()),
        }
    }

    /// Logs in as `user`, now if connected and again after every reconnect.
    pub async fn login(&self, user: UserId) {
        let _ = self.commands.send(Command::Login(user)).await;
    }

    pub async fn logout(&self) {
        let _ = self.commands.send(Command::Logout).await;
    }

    /// The next event. `None` once the client has shut down.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Closes the link cleanly and waits for the task to stop.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close).await;
        let _ = self.task.await;
    }
}

struct ClientTask {
    machine: ReconnectMachine,
    config: ClientConfig,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ClientEvent>,
    user: Option<UserId>,
    /// The lobby the user was last seen in.
    lobby: Option<LobbyId>,
    codec: JsonCodec,
}

impl ClientTask {
    async fn run(mut self) {
        let mut action = self.machine.step(LinkEvent::RetryDue);
        let mut ws: Option<WsStream> = None;

        loop {
            action = match action {
                LinkAction::Connect => {
                    let url = self.target_url();
                    match connect_async(url.as_str()).await {
                        Ok((stream, _)) => {
                            ws = Some(stream);
                            self.emit(ClientEvent::Connected).await;
                            self.machine.step(LinkEvent::Connected)
                        }
                        Err(e) => {
                            tracing::debug!(%url, error = %e, "connect failed");
                            self.machine.step(LinkEvent::ConnectFailed)
                        }
                    }
                }
                LinkAction::Login => match ws.as_mut() {
                    Some(stream) => self.connected(stream).await,
                    None => self.machine.step(LinkEvent::Lost),
                },
                LinkAction::Drop(delay) => {
                    if let Some(mut stream) = ws.take() {
                        let _ = stream.close(None).await;
                    }
                    self.emit(ClientEvent::Disconnected).await;
                    LinkAction::Wait(delay)
                }
                LinkAction::Wait(delay) => self.wait(delay).await,
                LinkAction::Shutdown => {
                    if let Some(mut stream) = ws.take() {
                        let _ = stream.close(None).await;
                    }
                    return;
                }
                LinkAction::Nothing => return,
            };
        }
    }

    /// Sleeps out a backoff delay, still taking commands.
    async fn wait(&mut self, delay: Duration) -> LinkAction {
        let sleep = sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return self.machine.step(LinkEvent::RetryDue),
                command = self.commands.recv() => match command {
                    Some(Command::Login(user)) => self.user = Some(user),
                    Some(Command::Logout) => self.user = None,
                    Some(Command::Close) | None => {
                        return self.machine.step(LinkEvent::CloseRequested);
                    }
                },
            }
        }
    }

    /// Runs one live connection until it drops or a close is requested.
    async fn connected(&mut self, ws: &mut WsStream) -> LinkAction {
        if let Some(user) = self.user {
            if self.send(ws, &ClientMessage::Login { user_id: user }).await.is_err() {
                return self.machine.step(LinkEvent::Lost);
            }
        }

        let period = self.config.ping_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            let event = tokio::select! {
                now = ticker.tick() => {
                    match self.machine.step(LinkEvent::Tick(now)) {
                        LinkAction::Nothing => {}
                        action => return action,
                    }
                    // One ping in flight at a time.
                    if let LinkState::ConnectedAwaitingPong { ping_sent: Some(_) } = self.machine.state() {
                        continue;
                    }
                    if self.send(ws, &ClientMessage::Ping).await.is_err() {
                        LinkEvent::Lost
                    } else {
                        LinkEvent::PingSent(now)
                    }
                }
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.inbound(text.as_bytes()).await;
                        LinkEvent::Inbound
                    }
                    Some(Ok(Message::Close(_))) | None => LinkEvent::Lost,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "link error");
                        LinkEvent::Lost
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Login(user)) => {
                        self.user = Some(user);
                        match self.send(ws, &ClientMessage::Login { user_id: user }).await {
                            Ok(()) => continue,
                            Err(()) => LinkEvent::Lost,
                        }
                    }
                    Some(Command::Logout) => {
                        self.user = None;
                        match self.send(ws, &ClientMessage::Logout).await {
                            Ok(()) => continue,
                            Err(()) => LinkEvent::Lost,
                        }
                    }
                    Some(Command::Close) | None => LinkEvent::CloseRequested,
                },
            };
            match self.machine.step(event) {
                LinkAction::Nothing => {}
                action => return action,
            }
        }
    }

    /// Where the next connect goes: the configured URL, pointed at the
    /// remembered lobby if there is one.
    fn target_url(&self) -> String {
        let Some(lobby) = self.lobby else {
            return self.config.url.clone();
        };
        match lobby_url(&self.config.url, lobby) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %self.config.url, error = %e, "cannot add lobby to url");
                self.config.url.clone()
            }
        }
    }

    async fn inbound(&mut self, data: &[u8]) {
        match self.codec.decode::<ServerMessage>(data) {
            Ok(ServerMessage::Pong) => {}
            Ok(ServerMessage::State(snapshot)) => {
                if self.user.is_some_and(|user| snapshot.has_user(user)) {
                    self.lobby = Some(snapshot.lobby_id);
                }
                self.emit(ClientEvent::State(snapshot)).await;
            }
            Ok(ServerMessage::Error { code, message }) => {
                // The remembered lobby is gone; the next login opens a new one.
                if code == 404 {
                    self.lobby = None;
                }
                tracing::warn!(code, %message, "server rejected a command");
                self.emit(ClientEvent::Error { code, message }).await;
            }
            Err(e) => tracing::warn!(error = %e, "undecodable server frame"),
        }
    }

    async fn send(&self, ws: &mut WsStream, message: &ClientMessage) -> Result<(), ()> {
        let text = self.codec.encode(message).map_err(|e| {
            tracing::warn!(error = %e, "cannot encode client message");
        })?;
        ws.send(Message::text(text)).await.map_err(|e| {
            tracing::debug!(error = %e, "send failed");
        })
    }

    async fn emit(&self, event: ClientEvent) {
        // The owner may have stopped listening; the link keeps going.
        let _ = self.events.send(event).await;
    }
}

/// `base` with its `lobby` query parameter set to `lobby`.
fn lobby_url(base: &str, lobby: LobbyId) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    let others: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "lobby")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(others)
        .append_pair("lobby", &lobby.0.to_string());
    Ok(url.to_string())
}
