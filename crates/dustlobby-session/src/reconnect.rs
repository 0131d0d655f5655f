//! Client-side link state machine.
//!
//! The client keeps its lobby view alive across network drops by
//! reconnecting and logging in again. All decisions live here as a pure
//! state machine; the I/O loop feeds it [`LinkEvent`]s and performs the
//! [`LinkAction`] it returns. Time only enters through the `Instant`s
//! carried by events, so every path is testable without sockets.
//!
//! ```text
//!                 ┌──────── connect failed (attempt+1) ───────┐
//!                 ▼                                           │
//!   Disconnected{n} ──(retry due)──▶ Connecting{n} ───────────┘
//!        ▲                                 │ connected (attempt reset)
//!        │ lost / silence                  ▼
//!        └──────────────── ConnectedAwaitingPong{ping_sent}
//!
//!   any state ──(close requested)──▶ Closed
//! ```

use std::time::Duration;

use dustlobby_timer::Backoff;
use tokio::time::Instant;

/// Where the link is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not connected; `attempt` failed tries since the last good link.
    Disconnected { attempt: u32 },
    /// A connection attempt is in flight.
    Connecting { attempt: u32 },
    /// Connected. `ping_sent` is set while a ping is unanswered.
    ConnectedAwaitingPong { ping_sent: Option<Instant> },
    /// Closed on request; no further reconnects.
    Closed,
}

/// Something the I/O loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The backoff delay elapsed.
    RetryDue,
    Connected,
    ConnectFailed,
    PingSent(Instant),
    /// Any inbound frame. A pong is the usual one.
    Inbound,
    /// The ping deadline check ran at this instant.
    Tick(Instant),
    /// The connection dropped.
    Lost,
    CloseRequested,
}

/// What the I/O loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Sleep this long, then report [`LinkEvent::RetryDue`].
    Wait(Duration),
    /// Open a connection, then report `Connected` or `ConnectFailed`.
    Connect,
    /// Connected: send the login (and resume pinging).
    Login,
    /// Tear down the current connection; a `Wait` follows.
    Drop(Duration),
    /// Stop the loop.
    Shutdown,
    Nothing,
}

/// The link state machine.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: LinkState,
    backoff: Backoff,
    pong_timeout: Duration,
}

impl ReconnectMachine {
    /// Starts disconnected with zero failed attempts.
    pub fn new(backoff: Backoff, pong_timeout: Duration) -> Self {
        Self {
            state: LinkState::Disconnected { attempt: 0 },
            backoff,
            pong_timeout,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == LinkState::Closed
    }

    /// Applies one event and returns the action to take.
    pub fn step(&mut self, event: LinkEvent) -> LinkAction {
        use LinkEvent as E;
        use LinkState as S;

        let (next, action) = match (self.state, event) {
            (S::Closed, _) => (S::Closed, LinkAction::Nothing),
            (_, E::CloseRequested) => (S::Closed, LinkAction::Shutdown),

            (S::Disconnected { attempt }, E::RetryDue) => {
                (S::Connecting { attempt }, LinkAction::Connect)
            }
            (S::Connecting { .. }, E::Connected) => (
                S::ConnectedAwaitingPong { ping_sent: None },
                LinkAction::Login,
            ),
            (S::Connecting { attempt }, E::ConnectFailed) => {
                let attempt = attempt.saturating_add(1);
                (
                    S::Disconnected { attempt },
                    LinkAction::Wait(self.backoff.delay_with_jitter(attempt)),
                )
            }

            (S::ConnectedAwaitingPong { ping_sent: None }, E::PingSent(at)) => (
                S::ConnectedAwaitingPong { ping_sent: Some(at) },
                LinkAction::Nothing,
            ),
            (S::ConnectedAwaitingPong { .. }, E::Inbound) => (
                S::ConnectedAwaitingPong { ping_sent: None },
                LinkAction::Nothing,
            ),
            (S::ConnectedAwaitingPong { ping_sent: Some(sent) }, E::Tick(now))
                if now.saturating_duration_since(sent) >= self.pong_timeout =>
            {
                tracing::info!("no pong within timeout, reconnecting");
                self.lost()
            }
            (S::ConnectedAwaitingPong { .. }, E::Lost) => self.lost(),

            (state, _) => (state, LinkAction::Nothing),
        };

        self.state = next;
        action
    }

    fn lost(&self) -> (LinkState, LinkAction) {
        (
            LinkState::Disconnected { attempt: 0 },
            LinkAction::Drop(self.backoff.delay_with_jitter(0)),
        )
    }
}

// =========================================================================
// Tests
// =========================================================================
