//! Byte-level serialization of wire messages.
//!
//! The in-memory [`LocalChannel`](crate::LocalChannel) moves
//! [`WireMessage`] values directly and never needs a codec. Transports that
//! move bytes (pipes, sockets, whatever a host embeds the engine into)
//! implement or reuse a [`MessageCodec`]; [`JsonCodec`] is the default and
//! produces exactly the protocol's JSON schema.
//!
//! # Example
//!
//! ```
//! use marionette_core::{JsonCodec, MessageCodec, Operation, WireMessage};
//!
//! let codec = JsonCodec;
//! let msg = WireMessage::request(None, Operation::Release);
//!
//! let bytes = codec.encode(&msg).expect("encode");
//! let decoded = codec.decode(&bytes).expect("decode");
//! assert_eq!(msg, decoded);
//! ```

use crate::WireMessage;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    #[error("encode error: {0}")]
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes to a message.
    #[error("decode error: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

/// Pluggable wire-message serialization format.
///
/// The trait is object-safe so transports can hold a `Box<dyn MessageCodec>`
/// without generics. Implementations must be able to decode anything they
/// encode.
pub trait MessageCodec {
    /// Encode a wire message to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode(&self, msg: &WireMessage) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a wire message.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if the bytes are not a valid message.
    /// Callers should log and drop such input rather than crash a listener.
    fn decode(&self, buf: &[u8]) -> Result<WireMessage, CodecError>;
}

/// JSON codec using serde_json.
///
/// Human-readable and schema-faithful; the sensible default for debugging
/// and for transports without strict bandwidth constraints.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, msg: &WireMessage) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode(&self, buf: &[u8]) -> Result<WireMessage, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
