//! Run-completion feed for Dustlobby.
//!
//! The feed is a single long-lived HTTP response whose body is a stream
//! of JSON records separated by `0x1E`. Each finished run is turned into
//! a [`ScoreEvent`](dustlobby_lobby::ScoreEvent) and handed to every
//! lobby currently playing that level.

mod error;
mod event;
mod listener;
mod records;

pub use error::FeedError;
pub use event::FeedEvent;
pub use listener::{FeedListener, SUBMIT_WAIT, route};
pub use records::{MAX_RECORD_LEN, RECORD_SEPARATOR, RecordSplitter};
