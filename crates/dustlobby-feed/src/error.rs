//! Error types for the feed listener.

/// Errors that end one connection to the feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The request couldn't be sent or the body stream broke.
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The feed answered with a non-success status.
    #[error("feed returned status {0}")]
    Status(u16),

    /// A record wasn't a valid event.
    #[error("malformed feed record: {0}")]
    Decode(#[from] serde_json::Error),
}
