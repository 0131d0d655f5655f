//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating messages.
///
/// Every variant maps to a "validation error" from the client's point of
/// view: the offending frame is dropped, a diagnostic is sent back, and
/// the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into a frame payload).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown `type` tag,
    /// a missing field, or a field of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, such as a
    /// `user_id` outside the accepted range.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
