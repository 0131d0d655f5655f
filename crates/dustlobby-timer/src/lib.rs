//! Time keeping for Dustlobby.
//!
//! Lobbies don't tick; they sleep until the next phase deadline. This
//! crate provides the three pieces that makes that work:
//!
//! - [`PhaseClock`] maps monotonic instants (what timers sleep on) to the
//!   wall-clock timestamps clients see in snapshots.
//! - [`schedule`] arms a one-shot timer that, on expiry, posts a message
//!   into an actor's own command queue. Dropping the returned
//!   [`TimerGuard`] disarms it.
//! - [`Backoff`] computes exponential reconnect delays as a pure function
//!   of the attempt number.
//!
//! # Integration
//!
//! A lobby actor never sleeps itself. It arms a timer whose expiry shows
//! up as one more command, so client requests and deadlines are applied
//! in arrival order through the same queue:
//!
//! ```ignore
//! let guard = schedule(deadline, tx.downgrade(), Command::PhaseElapsed { epoch });
//! while let Some(cmd) = rx.recv().await {
//!     // handles client commands and PhaseElapsed alike
//! }
//! ```

mod backoff;
mod clock;
mod oneshot;

pub use backoff::Backoff;
pub use clock::PhaseClock;
pub use oneshot::{TimerGuard, schedule};
