use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `min(base · 2^attempt, cap)`.
///
/// [`delay`](Backoff::delay) is a pure function of the attempt number so
/// reconnect loops stay testable without a clock. Optional jitter is
/// applied separately by [`delay_with_jitter`](Backoff::delay_with_jitter)
/// to keep a crowd of clients from reconnecting in lockstep after a
/// server restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound of the random delay added on top. Zero disables it.
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            jitter: Duration::ZERO,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// [`delay`](Self::delay) plus up to `jitter` of random slack.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        let extra = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(extra)
    }
}
