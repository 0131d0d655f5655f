//! Integration tests for deadline timers and backoff.
//!
//! Timer tests run with paused time: `sleep` auto-advances the clock, so
//! a 60 second deadline resolves instantly and deterministically.

use std::time::Duration;

use dustlobby_timer::{Backoff, schedule};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

// =========================================================================
// schedule / TimerGuard
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_delivers_at_deadline() {
    let (tx, mut rx) = mpsc::channel::<u32>(4);
    let start = Instant::now();
    let _guard = schedule(start + Duration::from_secs(60), tx.downgrade(), 7);

    let msg = rx.recv().await.unwrap();

    assert_eq!(msg, 7);
    assert_eq!(Instant::now() - start, Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_guard_disarms_timer() {
    let (tx, mut rx) = mpsc::channel::<u32>(4);
    let guard = schedule(Instant::now() + Duration::from_secs(5), tx.downgrade(), 1);
    drop(guard);

    time::sleep(Duration::from_secs(10)).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_timer_does_not_keep_queue_alive() {
    let (tx, mut rx) = mpsc::channel::<u32>(4);
    let _guard = schedule(Instant::now() + Duration::from_secs(5), tx.downgrade(), 1);
    drop(tx);

    // With the only strong sender gone the channel reports closed
    // right away instead of waiting for the timer.
    assert_eq!(rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_rearming_replaces_previous_deadline() {
    let (tx, mut rx) = mpsc::channel::<&'static str>(4);
    let start = Instant::now();
    let first = schedule(start + Duration::from_secs(30), tx.downgrade(), "first");
    let _guard = schedule(start + Duration::from_secs(10), tx.downgrade(), "second");
    drop(first);

    assert_eq!(rx.recv().await, Some("second"));
    assert_eq!(Instant::now(), start + Duration::from_secs(10));

    time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());
}

// =========================================================================
// Backoff
// =========================================================================

#[test]
fn test_backoff_doubles_from_base() {
    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
    assert_eq!(backoff.delay(0), Duration::from_secs(1));
    assert_eq!(backoff.delay(1), Duration::from_secs(2));
    assert_eq!(backoff.delay(2), Duration::from_secs(4));
    assert_eq!(backoff.delay(5), Duration::from_secs(32));
}

#[test]
fn test_backoff_caps_delay() {
    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
    assert_eq!(backoff.delay(6), Duration::from_secs(60));
    assert_eq!(backoff.delay(40), Duration::from_secs(60));
    assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
}

#[test]
fn test_backoff_default_is_one_second_to_one_minute() {
    let backoff = Backoff::default();
    assert_eq!(backoff.delay(0), Duration::from_secs(1));
    assert_eq!(backoff.delay(100), Duration::from_secs(60));
}

#[test]
fn test_backoff_jitter_stays_within_bound() {
    let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1))
        .with_jitter(Duration::from_millis(50));
    for _ in 0..100 {
        let d = backoff.delay_with_jitter(1);
        assert!(d >= Duration::from_millis(200));
        assert!(d <= Duration::from_millis(250));
    }
}
