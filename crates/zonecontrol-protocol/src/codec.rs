//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust values and the raw bytes
//! a transport connection carries. Sessions and the orchestrator only depend
//! on the [`Codec`] trait, so the wire format can change without touching
//! them.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// - `Send + Sync + 'static` → one codec value is shared by every
///   connection task for the lifetime of the server.
/// - `decode` uses `DeserializeOwned` so the result never borrows the
///   input frame, which is dropped right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// The browser client speaks JSON, so this is the codec the server uses.
///
/// ```rust
/// use zonecontrol_protocol::{Codec, JsonCodec, ServerMessage};
///
/// let bytes = JsonCodec.encode(&ServerMessage::Pinged).unwrap();
/// assert_eq!(bytes, br#"{"type":"pinged"}"#);
///
/// let back: ServerMessage = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(back, ServerMessage::Pinged);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
