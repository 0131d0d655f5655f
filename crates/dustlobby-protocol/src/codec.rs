//! Codec trait and implementations for the client channel.
//!
//! The server speaks text frames, so a codec encodes to a `String` and
//! decodes from raw frame bytes (text or binary frames are both accepted
//! on the inbound side).

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts wire messages to frame payloads and back.
///
/// `Send + Sync + 'static` so one codec can be shared by every
/// connection task through an `Arc`.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame payload.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a frame payload back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use dustlobby_protocol::{ClientMessage, Codec, JsonCodec, UserId};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec.decode(br#"{"type":"login","user_id":42}"#).unwrap();
/// assert_eq!(msg, ClientMessage::Login { user_id: UserId(42) });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
