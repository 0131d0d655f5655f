use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

/// A timer firing this much after its deadline is logged as late.
const LATE_WARN: Duration = Duration::from_millis(250);

/// Arms a one-shot timer that posts `msg` into `tx` at `deadline`.
///
/// The timer holds only a weak sender: if every strong sender is gone
/// (the actor stopped), the expiry is silently discarded and the timer
/// never keeps a dead actor's queue alive.
///
/// The returned guard disarms the timer when dropped. Replace a guard to
/// re-arm; an expiry that was already enqueued before the drop still
/// arrives, so receivers should tag messages (e.g. with an epoch) and
/// ignore stale ones.
pub fn schedule<M>(deadline: Instant, tx: mpsc::WeakSender<M>, msg: M) -> TimerGuard
where
    M: Send + 'static,
{
    let task = tokio::spawn(async move {
        time::sleep_until(deadline).await;

        let late_by = Instant::now().saturating_duration_since(deadline);
        if late_by > LATE_WARN {
            warn!(
                late_ms = late_by.as_secs_f64() * 1000.0,
                "timer fired late"
            );
        }

        let Some(tx) = tx.upgrade() else {
            trace!("timer target gone, dropping expiry");
            return;
        };
        if tx.send(msg).await.is_err() {
            trace!("timer target closed, dropping expiry");
        }
    });

    TimerGuard { task }
}

/// Owns an armed timer. Dropping it aborts the timer task.
#[derive(Debug)]
pub struct TimerGuard {
    task: JoinHandle<()>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
