use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Maps Tokio instants onto wall-clock time.
///
/// Deadlines are armed on the monotonic clock so they are immune to wall
/// clock jumps and follow `tokio::time::pause()` in tests. Snapshots need
/// absolute timestamps, so the clock records one `(Instant, DateTime)`
/// pair at creation and projects every later instant from it.
#[derive(Debug, Clone, Copy)]
pub struct PhaseClock {
    origin: Instant,
    origin_wall: DateTime<Utc>,
}

impl PhaseClock {
    /// Anchors the clock at the current instant and wall time.
    pub fn new() -> Self {
        Self::anchored(Utc::now())
    }

    /// Anchors the current instant at a fixed wall time.
    ///
    /// Tests use this with paused time to get exact timestamps.
    pub fn anchored(origin_wall: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            origin_wall,
        }
    }

    /// The current monotonic instant.
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// The wall time corresponding to `at`.
    pub fn wall_at(&self, at: Instant) -> DateTime<Utc> {
        if at >= self.origin {
            self.origin_wall + to_delta(at - self.origin)
        } else {
            self.origin_wall - to_delta(self.origin - at)
        }
    }
}

impl Default for PhaseClock {
    fn default() -> Self {
        Self::new()
    }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or_default()
}
