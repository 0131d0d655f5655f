//! The lobby state machine.
//!
//! `Lobby` is plain data with synchronous methods: it never sleeps,
//! spawns, or locks. The actor in `actor.rs` owns one, feeds it commands
//! and timer expiries one at a time, and arms whatever deadline the
//! lobby reports afterwards. Keeping the rules here makes every
//! interleaving of admin commands and expiries testable without a
//! runtime.
//!
//! ```text
//!   Idle ──start_game / start_round──▶ Warmup
//!   Warmup ──deadline──▶ Round            (scores cleared)
//!   Round  ──deadline──▶ Break            (scores frozen, winner picked)
//!   Break  ──deadline──▶ Round | Idle     (Idle once `rounds` are played)
//!   Break  ──start_round──▶ Round         (early)
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use dustlobby_protocol::{LobbyId, Phase, RosterEntry, Snapshot, TimerWindow, UserId};
use dustlobby_timer::PhaseClock;
use dustlobby_transport::ConnectionId;
use tokio::time::Instant;

use crate::score::{ScoreRecord, rank};
use crate::{GameConfig, GameOverrides, Level, LobbyError, ScoreEvent};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A phase change (or a no-op when `from == to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// What happened to a [`ScoreEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    Accepted,
    /// The lobby isn't in `Round`.
    NotInRound,
    /// The run was on a different level.
    WrongLevel,
    /// The runner isn't on the roster.
    NotInRoster,
    /// A grade outside `0..=5`.
    Malformed,
    /// The run doesn't count under the lobby's mode.
    NotCounted,
    /// The run finished outside the round window.
    OutsideRound,
    /// A run that finished later is already recorded.
    Superseded,
}

/// Result of a `leave` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Removed,
    /// The user wasn't on the roster.
    NotMember,
    /// The user is in their reconnect grace window; the grace timer
    /// decides.
    GracePending,
    /// The user is still logged in on another connection.
    StillConnected,
}

/// Lock-free summary other tasks may read to decide routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyStatus {
    pub phase: Phase,
    pub level_id: Option<u64>,
    pub members: usize,
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Member {
    name: String,
    connections: BTreeSet<ConnectionId>,
    /// Token of the pending grace timer, if the user is away.
    grace: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    end: Instant,
}

/// One lobby's authoritative state.
#[derive(Debug)]
pub struct Lobby {
    id: LobbyId,
    clock: PhaseClock,
    phase: Phase,
    /// Bumped on every phase change; stale timer expiries carry an old one.
    epoch: u64,
    window: Option<Window>,
    level: Option<Level>,
    game: Option<GameConfig>,
    roster: BTreeMap<UserId, Member>,
    /// `None` until the first round of a game starts.
    scores: Option<HashMap<UserId, ScoreRecord>>,
    rounds_played: u32,
    winner: Option<String>,
    next_grace: u64,
}

impl Lobby {
    pub fn new(id: LobbyId, clock: PhaseClock) -> Self {
        Self {
            id,
            clock,
            phase: Phase::Idle,
            epoch: 0,
            window: None,
            level: None,
            game: None,
            roster: BTreeMap::new(),
            scores: None,
            rounds_played: 0,
            winner: None,
            next_grace: 0,
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// When the current phase ends. `None` while idle.
    pub fn deadline(&self) -> Option<Instant> {
        self.window.map(|w| w.end)
    }

    pub fn level(&self) -> Option<&Level> {
        self.level.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.roster.contains_key(&user)
    }

    pub fn status(&self) -> LobbyStatus {
        LobbyStatus {
            phase: self.phase,
            level_id: self.level.as_ref().and_then(Level::id),
            members: self.roster.len(),
        }
    }

    // -- Roster ----------------------------------------------------------

    /// Adds or refreshes `user` on `conn`. Cancels any pending grace.
    pub fn join(&mut self, user: UserId, name: String, conn: ConnectionId) {
        let member = self.roster.entry(user).or_insert_with(|| Member {
            name: name.clone(),
            connections: BTreeSet::new(),
            grace: None,
        });
        member.name = name;
        member.connections.insert(conn);
        member.grace = None;
        tracing::info!(lobby_id = %self.id, %user, %conn, members = self.roster.len(), "user joined");
    }

    /// Logs `user` out on `conn`. The roster entry goes once none of the
    /// user's connections are left.
    pub fn leave(&mut self, user: UserId, conn: ConnectionId) -> LeaveOutcome {
        let Some(member) = self.roster.get_mut(&user) else {
            return LeaveOutcome::NotMember;
        };
        if member.grace.is_some() {
            return LeaveOutcome::GracePending;
        }
        member.connections.remove(&conn);
        if !member.connections.is_empty() {
            tracing::debug!(lobby_id = %self.id, %user, %conn, "logged out on one of several connections");
            return LeaveOutcome::StillConnected;
        }
        self.roster.remove(&user);
        tracing::info!(lobby_id = %self.id, %user, members = self.roster.len(), "user left");
        LeaveOutcome::Removed
    }

    /// Records that `conn` dropped. When it was the user's last
    /// connection, starts a grace window and returns its token; the
    /// caller arms a timer that reports back via [`Lobby::grace_elapsed`].
    pub fn disconnect(&mut self, user: UserId, conn: ConnectionId) -> Option<u64> {
        let member = self.roster.get_mut(&user)?;
        member.connections.remove(&conn);
        if !member.connections.is_empty() || member.grace.is_some() {
            return None;
        }
        self.next_grace += 1;
        member.grace = Some(self.next_grace);
        tracing::info!(lobby_id = %self.id, %user, "user disconnected, holding roster slot");
        Some(self.next_grace)
    }

    /// Removes `user` if the grace window `token` is still pending.
    pub fn grace_elapsed(&mut self, user: UserId, token: u64) -> bool {
        let expired = self
            .roster
            .get(&user)
            .is_some_and(|m| m.grace == Some(token));
        if expired {
            self.roster.remove(&user);
            tracing::info!(lobby_id = %self.id, %user, "grace period over, user dropped");
        }
        expired
    }

    /// Removes `user` unconditionally (they moved to another lobby).
    pub fn evict(&mut self, user: UserId) -> bool {
        let removed = self.roster.remove(&user).is_some();
        if removed {
            tracing::info!(lobby_id = %self.id, %user, "user moved to another lobby");
        }
        removed
    }

    // -- Admin commands --------------------------------------------------

    /// Starts a game: `Idle → Warmup` with `level` and `config`.
    pub fn start_game(
        &mut self,
        level: Level,
        config: GameConfig,
        now: Instant,
    ) -> Result<Transition, LobbyError> {
        if self.phase != Phase::Idle {
            return Err(self.invalid_phase("start a game"));
        }
        config.validate()?;
        Ok(self.begin_warmup(level, config, now))
    }

    /// Starts the next round early.
    ///
    /// - `Idle → Warmup` using `overrides` on top of the previous game's
    ///   settings (or `defaults`); a level must be known.
    /// - `Break → Round` immediately, applying `overrides`.
    /// - A no-op in `Warmup` and `Round`.
    pub fn start_round(
        &mut self,
        overrides: GameOverrides,
        defaults: GameConfig,
        now: Instant,
    ) -> Result<Transition, LobbyError> {
        match self.phase {
            Phase::Warmup | Phase::Round => Ok(Transition {
                from: self.phase,
                to: self.phase,
            }),
            Phase::Idle => {
                let config = overrides.apply(self.game.unwrap_or(defaults));
                config.validate()?;
                let level = overrides
                    .level
                    .or_else(|| self.level.clone())
                    .ok_or(LobbyError::NoLevel(self.id))?;
                Ok(self.begin_warmup(level, config, now))
            }
            Phase::Break => {
                let config = overrides.apply(self.game.unwrap_or(defaults));
                config.validate()?;
                if let Some(level) = overrides.level {
                    self.level = Some(level);
                }
                self.game = Some(config);
                Ok(self.begin_round(now))
            }
        }
    }

    // -- Timers ----------------------------------------------------------

    /// Applies the expiry of phase `epoch`. Stale epochs are ignored.
    ///
    /// The next window starts where the previous one ended, so a late
    /// expiry doesn't stretch the schedule.
    pub fn phase_elapsed(&mut self, epoch: u64) -> Option<Transition> {
        if epoch != self.epoch {
            return None;
        }
        let (window, game) = (self.window?, self.game?);
        let from = self.phase;
        match from {
            Phase::Idle => return None,
            Phase::Warmup => {
                self.begin_round(window.end);
            }
            Phase::Round => {
                self.rounds_played += 1;
                self.winner = self.ranked_scores().first().map(|s| s.user_name.clone());
                self.enter(Phase::Break, Some(window.end), game.break_time);
            }
            Phase::Break => {
                if game.rounds.is_some_and(|limit| self.rounds_played >= limit) {
                    self.phase = Phase::Idle;
                    self.epoch += 1;
                    self.window = None;
                } else {
                    self.begin_round(window.end);
                }
            }
        }
        let transition = Transition { from, to: self.phase };
        tracing::info!(
            lobby_id = %self.id,
            from = %transition.from,
            to = %transition.to,
            rounds_played = self.rounds_played,
            "phase elapsed"
        );
        Some(transition)
    }

    // -- Scores ----------------------------------------------------------

    /// Records a run. The latest run per user wins.
    pub fn apply_score(&mut self, event: &ScoreEvent) -> ScoreOutcome {
        if !event.is_well_formed() {
            return ScoreOutcome::Malformed;
        }
        if self.phase != Phase::Round {
            return ScoreOutcome::NotInRound;
        }
        if self.level.as_ref().and_then(Level::id) != Some(event.map_id) {
            return ScoreOutcome::WrongLevel;
        }
        let Some(member) = self.roster.get(&event.user_id) else {
            return ScoreOutcome::NotInRoster;
        };
        if !event.counts_in(self.game.map(|g| g.mode).unwrap_or_default()) {
            return ScoreOutcome::NotCounted;
        }
        if let (Some(at), Some(window)) = (event.timestamp, self.wall_window()) {
            if !window.contains(at) {
                return ScoreOutcome::OutsideRound;
            }
        }

        let record = ScoreRecord::new(event, member.name.clone());
        let scores = self.scores.get_or_insert_with(HashMap::new);
        if let Some(existing) = scores.get(&event.user_id) {
            if let (Some(new_at), Some(old_at)) = (event.timestamp, existing.timestamp) {
                if new_at < old_at {
                    return ScoreOutcome::Superseded;
                }
            }
        }
        scores.insert(event.user_id, record);
        tracing::info!(
            lobby_id = %self.id,
            user = %event.user_id,
            completion = event.completion,
            finesse = event.finesse,
            time_ms = event.time_ms,
            "score recorded"
        );
        ScoreOutcome::Accepted
    }

    // -- Projection ------------------------------------------------------

    /// The full externally visible state.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new(self.id);
        snapshot.set_timer(self.phase, self.wall_window());
        snapshot.mode = self.game.map(|g| g.mode);
        snapshot.level = self.level.as_ref().map(Level::info);
        snapshot.users = self
            .roster
            .iter()
            .map(|(user_id, member)| RosterEntry {
                user_id: *user_id,
                user_name: member.name.clone(),
            })
            .collect();
        snapshot.scores = self.scores.as_ref().map(|_| self.ranked_scores());
        snapshot.winner = self.winner.clone();
        snapshot
    }

    // -- Internals -------------------------------------------------------

    fn begin_warmup(&mut self, level: Level, config: GameConfig, now: Instant) -> Transition {
        let from = self.phase;
        self.level = Some(level);
        self.game = Some(config);
        self.scores = None;
        self.winner = None;
        self.rounds_played = 0;
        self.enter(Phase::Warmup, Some(now), config.warmup_time);
        tracing::info!(
            lobby_id = %self.id,
            level = self.level.as_ref().map(Level::filename).unwrap_or_default(),
            mode = %config.mode,
            "game started"
        );
        Transition { from, to: Phase::Warmup }
    }

    fn begin_round(&mut self, start: Instant) -> Transition {
        let from = self.phase;
        let round_time = self.game.unwrap_or_default().round_time;
        self.scores = Some(HashMap::new());
        self.enter(Phase::Round, Some(start), round_time);
        Transition { from, to: Phase::Round }
    }

    fn enter(&mut self, phase: Phase, start: Option<Instant>, length: std::time::Duration) {
        debug_assert!(self.phase.can_transition_to(phase));
        self.phase = phase;
        self.epoch += 1;
        self.window = start.map(|start| Window {
            start,
            end: start + length,
        });
    }

    fn wall_window(&self) -> Option<TimerWindow> {
        self.window.map(|w| TimerWindow {
            start: self.clock.wall_at(w.start),
            end: self.clock.wall_at(w.end),
        })
    }

    fn ranked_scores(&self) -> Vec<dustlobby_protocol::ScoreEntry> {
        let Some(scores) = &self.scores else {
            return Vec::new();
        };
        let mut rows: Vec<_> = scores
            .iter()
            .map(|(user, record)| (record.entry(*user), record.timestamp))
            .collect();
        rows.sort_by(|(a, a_at), (b, b_at)| rank(a, *a_at, b, *b_at));
        rows.into_iter().map(|(entry, _)| entry).collect()
    }

    fn invalid_phase(&self, action: &'static str) -> LobbyError {
        LobbyError::InvalidPhase {
            lobby: self.id,
            phase: self.phase,
            action,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
