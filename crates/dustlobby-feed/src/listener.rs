//! The long-lived feed connection and score routing.

use std::time::Duration;

use dustlobby_lobby::{LobbyManager, ScoreEvent};
use dustlobby_protocol::Phase;
use dustlobby_timer::Backoff;
use futures_util::StreamExt;

use crate::{FeedError, FeedEvent, RecordSplitter};

/// How long routing waits on one lobby's full queue before that lobby
/// misses the event.
pub const SUBMIT_WAIT: Duration = Duration::from_millis(250);

/// Forwards `event` to every lobby that is in `Round` on the event's
/// level, one lobby after another. Returns how many lobbies took it.
///
/// Reads each lobby's status without waiting on it. A lobby whose queue
/// stays full for [`SUBMIT_WAIT`] misses the event.
pub async fn route(lobbies: &LobbyManager, event: &ScoreEvent) -> usize {
    let mut delivered = 0;
    for handle in lobbies.handles() {
        let status = handle.status();
        if status.phase != Phase::Round || status.level_id != Some(event.map_id) {
            continue;
        }
        match handle.submit(event.clone(), SUBMIT_WAIT).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(lobby_id = %handle.id(), user = %event.user_id, error = %e, "score not delivered");
            }
        }
    }
    delivered
}

/// Follows the run-completion feed forever, reconnecting with
/// exponential backoff whenever the stream ends or fails.
pub struct FeedListener {
    client: reqwest::Client,
    url: String,
    backoff: Backoff,
    lobbies: LobbyManager,
}

impl FeedListener {
    pub fn new(url: impl Into<String>, lobbies: LobbyManager) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            backoff: Backoff::default(),
            lobbies,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until the task is aborted.
    pub async fn run(self) {
        let mut attempt = 0;
        loop {
            match self.follow(&mut attempt).await {
                Ok(()) => tracing::warn!(url = %self.url, "feed stream closed"),
                Err(e) => tracing::warn!(url = %self.url, error = %e, "feed stream failed"),
            }
            let delay = self.backoff.delay_with_jitter(attempt);
            attempt = attempt.saturating_add(1);
            tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting to feed");
            tokio::time::sleep(delay).await;
        }
    }

    /// Streams one connection to its end. Resets `attempt` as soon as a
    /// record arrives.
    async fn follow(&self, attempt: &mut u32) -> Result<(), FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        tracing::info!(url = %self.url, "feed connected");

        let mut body = response.bytes_stream();
        let mut splitter = RecordSplitter::new();
        while let Some(chunk) = body.next().await {
            for record in splitter.push(&chunk?) {
                *attempt = 0;
                self.handle_record(&record).await;
            }
        }
        if splitter.pending() > 0 {
            tracing::debug!(bytes = splitter.pending(), "feed ended mid-record");
        }
        Ok(())
    }

    async fn handle_record(&self, record: &[u8]) {
        if record.is_empty() {
            tracing::debug!("feed heartbeat");
            return;
        }
        let event = match FeedEvent::parse(record) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, record = %String::from_utf8_lossy(record), "skipping feed record");
                return;
            }
        };
        let Some(score) = event.to_score() else {
            tracing::debug!(level = %event.level, "run on a level without an id");
            return;
        };
        let delivered = route(&self.lobbies, &score).await;
        tracing::debug!(
            user = %score.user_id,
            map_id = score.map_id,
            delivered,
            "feed event routed"
        );
    }
}
