//! Lobby actor: an isolated Tokio task that owns one [`Lobby`].
//!
//! Each lobby runs in its own task and is reached only through its
//! bounded command queue. Phase, grace, and empty-lobby timers post
//! synthetic commands into that same queue, so every mutation happens
//! on one task in arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dustlobby_protocol::{LobbyId, Snapshot, UserId};
use dustlobby_timer::{PhaseClock, TimerGuard, schedule};
use dustlobby_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot, watch};

use crate::lobby::{LeaveOutcome, Lobby, LobbyStatus, ScoreOutcome, Transition};
use crate::{GameConfig, GameOverrides, Level, LobbyConfig, LobbyError, ScoreEvent};

/// Receives every snapshot a lobby emits, and its closure.
///
/// The server's fan-out implements this. Both calls come from the
/// lobby's own task and must not block.
pub trait SnapshotSink: Send + Sync + 'static {
    /// A lobby's state changed.
    fn publish(&self, snapshot: Snapshot);

    /// The lobby stopped; no further snapshots follow.
    fn closed(&self, lobby: LobbyId);
}

/// An operator command, already authenticated and validated for shape.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    StartGame { level: Level, config: GameConfig },
    StartRound(GameOverrides),
}

/// Commands sent to a lobby actor through its channel.
pub(crate) enum LobbyCommand {
    Join {
        user: UserId,
        name: String,
        conn: ConnectionId,
        reply: oneshot::Sender<()>,
    },
    Leave {
        user: UserId,
        conn: ConnectionId,
        reply: oneshot::Sender<LeaveOutcome>,
    },
    Disconnect {
        user: UserId,
        conn: ConnectionId,
    },
    Evict {
        user: UserId,
    },
    Admin {
        command: AdminCommand,
        reply: oneshot::Sender<Result<Transition, LobbyError>>,
    },
    Score(ScoreEvent),
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Close,

    // Posted by the actor's own timers.
    PhaseElapsed {
        epoch: u64,
    },
    GraceElapsed {
        user: UserId,
        token: u64,
    },
    EmptyElapsed {
        seq: u64,
    },
}

/// Handle to a running lobby actor.
///
/// Cheap to clone. Every method fails with [`LobbyError::Unavailable`]
/// once the actor has stopped.
#[derive(Clone)]
pub struct LobbyHandle {
    id: LobbyId,
    sender: mpsc::Sender<LobbyCommand>,
    status: watch::Receiver<LobbyStatus>,
}

impl std::fmt::Debug for LobbyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyHandle")
            .field("id", &self.id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl LobbyHandle {
    pub fn id(&self) -> LobbyId {
        self.id
    }

    /// The lobby's phase, level, and roster size as of its last change.
    /// Never waits on the actor.
    pub fn status(&self) -> LobbyStatus {
        *self.status.borrow()
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Adds `user` to the roster, or refreshes their entry. Resolves once
    /// the resulting snapshot has been published.
    pub async fn join(
        &self,
        user: UserId,
        name: String,
        conn: ConnectionId,
    ) -> Result<(), LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::Join {
            user,
            name,
            conn,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Logs `user` out on `conn`.
    pub async fn leave(&self, user: UserId, conn: ConnectionId) -> Result<LeaveOutcome, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::Leave { user, conn, reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Reports that `conn`, logged in as `user`, went away.
    pub async fn disconnect(&self, user: UserId, conn: ConnectionId) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Disconnect { user, conn }).await
    }

    /// Removes `user` regardless of grace.
    pub async fn evict(&self, user: UserId) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Evict { user }).await
    }

    pub async fn admin(&self, command: AdminCommand) -> Result<Transition, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::Admin { command, reply }).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn snapshot(&self) -> Result<Snapshot, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Asks the actor to stop.
    pub async fn close(&self) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Close).await
    }

    /// Queues a score, waiting at most `wait` for room in a full queue so
    /// a stuck lobby can't stall the feed for long.
    pub async fn submit(&self, event: ScoreEvent, wait: Duration) -> Result<(), LobbyError> {
        self.sender
            .send_timeout(LobbyCommand::Score(event), wait)
            .await
            .map_err(|_| self.unavailable())
    }

    async fn send(&self, command: LobbyCommand) -> Result<(), LobbyError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> LobbyError {
        LobbyError::Unavailable(self.id)
    }
}

/// Whether a command changed what clients see.
enum Flow {
    Changed,
    Unchanged,
    Stop,
}

/// The internal actor state. Runs inside a Tokio task.
struct LobbyActor {
    lobby: Lobby,
    config: LobbyConfig,
    clock: PhaseClock,
    sink: Arc<dyn SnapshotSink>,
    status: watch::Sender<LobbyStatus>,
    receiver: mpsc::Receiver<LobbyCommand>,
    /// Handed to timers so they never keep the queue open.
    timers: mpsc::WeakSender<LobbyCommand>,

    phase_timer: Option<TimerGuard>,
    armed_epoch: u64,
    grace_timers: HashMap<UserId, TimerGuard>,
    empty_timer: Option<TimerGuard>,
    empty_seq: u64,
    /// Whether the roster has held anyone since the last empty timer.
    occupied: bool,
}

impl LobbyActor {
    /// Runs the actor loop until it is closed, empties out, or every
    /// handle is dropped.
    async fn run(mut self) {
        tracing::info!(lobby_id = %self.lobby.id(), "lobby actor started");
        self.after_change();

        while let Some(command) = self.receiver.recv().await {
            match self.handle(command) {
                Flow::Changed => self.after_change(),
                Flow::Unchanged => {}
                Flow::Stop => break,
            }
        }

        tracing::info!(lobby_id = %self.lobby.id(), "lobby actor stopped");
    }

    fn handle(&mut self, command: LobbyCommand) -> Flow {
        match command {
            LobbyCommand::Join {
                user,
                name,
                conn,
                reply,
            } => {
                self.grace_timers.remove(&user);
                self.lobby.join(user, name, conn);
                // Publish before acknowledging so the joiner's first
                // snapshot already lists them.
                self.after_change();
                let _ = reply.send(());
                Flow::Unchanged
            }
            LobbyCommand::Leave { user, conn, reply } => {
                let outcome = self.lobby.leave(user, conn);
                let _ = reply.send(outcome);
                match outcome {
                    LeaveOutcome::Removed => Flow::Changed,
                    LeaveOutcome::NotMember
                    | LeaveOutcome::GracePending
                    | LeaveOutcome::StillConnected => {
                        tracing::debug!(lobby_id = %self.lobby.id(), %user, ?outcome, "leave ignored");
                        Flow::Unchanged
                    }
                }
            }
            LobbyCommand::Disconnect { user, conn } => {
                if let Some(token) = self.lobby.disconnect(user, conn) {
                    let deadline = self.clock.now() + self.config.roster_grace;
                    let guard = schedule(
                        deadline,
                        self.timers.clone(),
                        LobbyCommand::GraceElapsed { user, token },
                    );
                    self.grace_timers.insert(user, guard);
                }
                Flow::Unchanged
            }
            LobbyCommand::Evict { user } => {
                self.grace_timers.remove(&user);
                if self.lobby.evict(user) {
                    Flow::Changed
                } else {
                    Flow::Unchanged
                }
            }
            LobbyCommand::Admin { command, reply } => {
                let result = self.admin(command);
                let changed = matches!(&result, Ok(t) if !t.is_noop());
                if let Err(e) = &result {
                    tracing::warn!(lobby_id = %self.lobby.id(), error = %e, "admin command rejected");
                }
                let _ = reply.send(result);
                if changed { Flow::Changed } else { Flow::Unchanged }
            }
            LobbyCommand::Score(event) => match self.lobby.apply_score(&event) {
                ScoreOutcome::Accepted => Flow::Changed,
                outcome => {
                    tracing::debug!(
                        lobby_id = %self.lobby.id(),
                        user = %event.user_id,
                        map_id = event.map_id,
                        ?outcome,
                        "score dropped"
                    );
                    Flow::Unchanged
                }
            },
            LobbyCommand::Snapshot { reply } => {
                let _ = reply.send(self.lobby.snapshot());
                Flow::Unchanged
            }
            LobbyCommand::Close => {
                tracing::info!(lobby_id = %self.lobby.id(), "lobby closing");
                Flow::Stop
            }
            LobbyCommand::PhaseElapsed { epoch } => match self.lobby.phase_elapsed(epoch) {
                Some(_) => Flow::Changed,
                None => Flow::Unchanged,
            },
            LobbyCommand::GraceElapsed { user, token } => {
                if self.lobby.grace_elapsed(user, token) {
                    self.grace_timers.remove(&user);
                    Flow::Changed
                } else {
                    Flow::Unchanged
                }
            }
            LobbyCommand::EmptyElapsed { seq } => {
                if seq == self.empty_seq && self.lobby.is_empty() {
                    tracing::info!(lobby_id = %self.lobby.id(), "lobby empty, closing");
                    Flow::Stop
                } else {
                    Flow::Unchanged
                }
            }
        }
    }

    fn admin(&mut self, command: AdminCommand) -> Result<Transition, LobbyError> {
        let now = self.clock.now();
        match command {
            AdminCommand::StartGame { level, config } => self.lobby.start_game(level, config, now),
            AdminCommand::StartRound(overrides) => {
                self.lobby
                    .start_round(overrides, self.config.default_game, now)
            }
        }
    }

    /// Publishes the new state and re-arms whatever timers it implies.
    fn after_change(&mut self) {
        self.sink.publish(self.lobby.snapshot());
        self.status.send_replace(self.lobby.status());

        if self.lobby.epoch() != self.armed_epoch {
            self.armed_epoch = self.lobby.epoch();
            self.phase_timer = self.lobby.deadline().map(|deadline| {
                schedule(
                    deadline,
                    self.timers.clone(),
                    LobbyCommand::PhaseElapsed {
                        epoch: self.armed_epoch,
                    },
                )
            });
        }

        if !self.lobby.is_empty() {
            self.occupied = true;
            self.empty_timer = None;
        } else if self.occupied {
            self.occupied = false;
            self.empty_seq += 1;
            let deadline = self.clock.now() + self.config.empty_grace;
            self.empty_timer = Some(schedule(
                deadline,
                self.timers.clone(),
                LobbyCommand::EmptyElapsed {
                    seq: self.empty_seq,
                },
            ));
        }
    }
}

/// Spawns a lobby actor, optionally with `owner` already on the roster.
///
/// Returns the handle and the actor's join handle, which resolves when
/// the actor stops for any reason.
pub(crate) fn spawn_lobby(
    id: LobbyId,
    config: LobbyConfig,
    clock: PhaseClock,
    sink: Arc<dyn SnapshotSink>,
    owner: Option<(UserId, String, ConnectionId)>,
) -> (LobbyHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_size);
    let mut lobby = Lobby::new(id, clock);
    if let Some((user, name, conn)) = owner {
        lobby.join(user, name, conn);
    }
    let (status_tx, status_rx) = watch::channel(lobby.status());

    let actor = LobbyActor {
        armed_epoch: lobby.epoch(),
        lobby,
        config,
        clock,
        sink,
        status: status_tx,
        receiver: rx,
        timers: tx.downgrade(),
        phase_timer: None,
        grace_timers: HashMap::new(),
        empty_timer: None,
        empty_seq: 0,
        occupied: false,
    };

    let task = tokio::spawn(actor.run());

    let handle = LobbyHandle {
        id,
        sender: tx,
        status: status_rx,
    };
    (handle, task)
}
