//! Error types for the proxying engine.
//!
//! Two families live here:
//!
//! - [`ThrownError`]: a value thrown during remote execution. It travels
//!   over the wire via the built-in `"throw"` transfer handler and is
//!   reconstructed on the calling side with name/message/stack preserved
//!   when it was error-like.
//! - [`ProxyError`]: everything a caller of a [`RemoteHandle`] can see —
//!   reconstructed remote throws, client-side failures (released handle,
//!   unknown handler, protocol violations), and opaque channel failures.
//!
//! [`RemoteHandle`]: crate::RemoteHandle

use marionette_core::{ChannelError, Value};

/// A value thrown during remote execution.
///
/// Error-like throws keep their `name`, `message`, and (optionally) `stack`
/// across the wire; anything else is carried as the raw sendable value.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrownError {
    /// An error-like throw.
    Error {
        /// Error class name (e.g. `"NotCallable"`).
        name: String,
        /// Human-readable message.
        message: String,
        /// Stack trace, when the throwing side captured one.
        stack: Option<String>,
    },
    /// A non-error thrown value.
    Value(Value),
}

impl ThrownError {
    /// An error-like throw with an explicit name.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        ThrownError::Error {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// A plain error with the default `"Error"` name.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// The `MalformedRequest` throw: the request itself was unusable
    /// (empty SET path, assignment target not an object, bad argument
    /// framing).
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new("MalformedRequest", message)
    }

    /// The `NotCallable` throw: APPLY or CONSTRUCT addressed something
    /// that is not a function or constructor.
    pub fn not_callable(message: impl Into<String>) -> Self {
        Self::new("NotCallable", message)
    }

    /// The error name, or `"Error"` for non-error throws.
    pub fn name(&self) -> &str {
        match self {
            ThrownError::Error { name, .. } => name,
            ThrownError::Value(_) => "Error",
        }
    }
}

impl std::fmt::Display for ThrownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrownError::Error { name, message, .. } => write!(f, "{}: {}", name, message),
            ThrownError::Value(value) => write!(f, "thrown value: {:?}", value),
        }
    }
}

impl std::error::Error for ThrownError {}

/// Errors surfaced to callers of remote-handle operations.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The handle (or a sibling over the same endpoint) has been released.
    /// Raised synchronously on the client, never sent over the wire.
    #[error("proxy has been released")]
    Released,

    /// The remote side threw an error-like value.
    #[error("remote threw {name}: {message}")]
    Remote {
        /// Error class name from the remote side.
        name: String,
        /// Message from the remote side.
        message: String,
        /// Stack trace, when the remote side captured one.
        stack: Option<String>,
    },

    /// The remote side threw a non-error value.
    #[error("remote threw a value: {0:?}")]
    RemoteValue(Value),

    /// A wire value referenced a transfer handler that is not registered.
    /// Fatal for the decode; surfaced to the awaiting caller.
    #[error("unknown transfer handler: {name}")]
    UnknownHandler {
        /// The unregistered handler name.
        name: String,
    },

    /// The underlying channel failed. Not owned by the engine; propagated
    /// opaquely.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The channel closed before a response arrived.
    #[error("channel closed before a response arrived")]
    NoResponse,

    /// A value outside the sendable universe was encoded without a
    /// transfer handler claiming it.
    #[error("value cannot be sent: {reason}")]
    NotSendable {
        /// What made the value unsendable.
        reason: String,
    },

    /// The peer answered with a payload the protocol does not allow here.
    #[error("protocol violation: {reason}")]
    Protocol {
        /// What was violated.
        reason: String,
    },
}

impl From<ThrownError> for ProxyError {
    fn from(thrown: ThrownError) -> Self {
        match thrown {
            ThrownError::Error {
                name,
                message,
                stack,
            } => ProxyError::Remote {
                name,
                message,
                stack,
            },
            ThrownError::Value(value) => ProxyError::RemoteValue(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_error_display() {
        let thrown = ThrownError::not_callable("APPLY target is not a function");
        assert_eq!(
            thrown.to_string(),
            "NotCallable: APPLY target is not a function"
        );
        assert_eq!(thrown.name(), "NotCallable");

        let value = ThrownError::Value(Value::Int(7));
        assert!(value.to_string().contains("thrown value"));
    }

    #[test]
    fn test_thrown_to_proxy_error() {
        let err: ProxyError = ThrownError::msg("boom").into();
        match err {
            ProxyError::Remote { name, message, .. } => {
                assert_eq!(name, "Error");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err: ProxyError = ThrownError::Value(Value::Bool(false)).into();
        assert!(matches!(err, ProxyError::RemoteValue(Value::Bool(false))));
    }

    #[test]
    fn test_proxy_error_display() {
        let err = ProxyError::UnknownHandler {
            name: "mystery".to_string(),
        };
        assert_eq!(err.to_string(), "unknown transfer handler: mystery");
        assert_eq!(
            ProxyError::Released.to_string(),
            "proxy has been released"
        );
    }
}
