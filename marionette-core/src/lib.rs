//! # marionette-core
//!
//! Protocol-level building blocks for the marionette proxying engine.
//!
//! This crate defines everything that crosses (or carries) the wire:
//!
//! - [`Value`]: the closed universe of directly-sendable values
//! - [`WireValue`], [`WireRequest`], [`WireResponse`], [`WireMessage`]:
//!   the message envelopes of the proxy protocol
//! - [`Uid`]: collision-resistant request correlation ids
//! - [`MessageCodec`] / [`JsonCodec`]: pluggable byte-level serialization
//!   for transports that move messages as bytes
//! - [`Channel`]: the endpoint contract a transport must satisfy, plus the
//!   in-memory [`LocalChannel`] pair used for sub-channels and tests
//!
//! The engine crate (`marionette`) builds the exposer, remote handles, and
//! transfer handlers on top of these types.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod channel;
mod codec;
mod uid;
mod value;
mod wire;

// Channel exports
pub use channel::{Channel, ChannelError, ChannelRef, ListenerId, LocalChannel, MessageListener};

// Codec exports
pub use codec::{CodecError, JsonCodec, MessageCodec};

// Correlation id exports
pub use uid::Uid;

// Value exports
pub use value::Value;

// Wire envelope exports
pub use wire::{Operation, WireArgument, WireMessage, WireRequest, WireResponse, WireValue};
