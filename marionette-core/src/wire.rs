//! Wire envelopes of the proxy protocol.
//!
//! Every payload that crosses a channel is a [`WireMessage`]: either a
//! [`WireRequest`] (an [`Operation`] plus an optional correlation id) or a
//! [`WireResponse`] (a [`WireValue`] echoing the originating id).
//!
//! The JSON shape matches the protocol schema:
//!
//! ```text
//! request:  { id?, type: GET|SET|APPLY|CONSTRUCT|RELEASE,
//!             path?, value?, argumentList? }
//! response: { id, type: RAW|HANDLER, name?, value }
//! ```

use serde::{Deserialize, Serialize};

use crate::{Uid, Value};

/// The envelope for any value on the wire.
///
/// `Raw` carries a directly-sendable [`Value`] unchanged; `Handler` carries
/// a payload produced by the named transfer handler, to be decoded by the
/// same handler on the receiving side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WireValue {
    /// A directly-sendable value. Invariant: only ever carries a `Value`.
    Raw {
        /// The sendable payload.
        value: Value,
    },
    /// A handler-encoded value.
    Handler {
        /// Name of the transfer handler that produced (and must decode) it.
        name: String,
        /// The handler's serialized payload.
        value: Value,
    },
}

impl WireValue {
    /// Wrap a sendable value.
    pub fn raw(value: Value) -> Self {
        WireValue::Raw { value }
    }
}

/// One encoded call/construct argument.
///
/// Sub-channels for multiple arguments are concatenated on the carrying
/// message; `port_count` says how many of them this argument consumes, so
/// the receiver can slice them back apart positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireArgument {
    /// The encoded argument value.
    pub value: WireValue,
    /// Number of attached sub-channels this argument consumes.
    #[serde(rename = "portCount")]
    pub port_count: usize,
}

/// A requested operation, addressed by an access path from the exposed root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Operation {
    /// Read the value at `path`.
    Get {
        /// Property names from the root.
        path: Vec<String>,
    },
    /// Write `value` at `path`. The path must be non-empty.
    Set {
        /// Property names from the root.
        path: Vec<String>,
        /// The encoded value to assign.
        value: WireValue,
    },
    /// Invoke the function at `path`.
    Apply {
        /// Property names from the root.
        path: Vec<String>,
        /// Encoded arguments.
        #[serde(rename = "argumentList")]
        args: Vec<WireArgument>,
    },
    /// Construct a new instance from the constructor at `path`.
    Construct {
        /// Property names from the root.
        path: Vec<String>,
        /// Encoded arguments.
        #[serde(rename = "argumentList")]
        args: Vec<WireArgument>,
    },
    /// Release the exposed root and tear the channel down.
    Release,
}

impl Operation {
    /// The access path this operation targets (empty for `Release`).
    pub fn path(&self) -> &[String] {
        match self {
            Operation::Get { path }
            | Operation::Set { path, .. }
            | Operation::Apply { path, .. }
            | Operation::Construct { path, .. } => path,
            Operation::Release => &[],
        }
    }
}

/// A request message: operation plus optional correlation id.
///
/// Requests without an id are fire-and-forget; no response will be
/// correlated back to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Correlation id, echoed verbatim by the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uid>,
    /// The requested operation.
    #[serde(flatten)]
    pub op: Operation,
}

/// A response message: result envelope echoing the originating id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    /// The id of the request this answers.
    pub id: Uid,
    /// The encoded result.
    #[serde(flatten)]
    pub value: WireValue,
}

/// Any message a channel can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    /// An operation request.
    Request(WireRequest),
    /// An operation response.
    Response(WireResponse),
}

impl WireMessage {
    /// Build a request message.
    pub fn request(id: Option<Uid>, op: Operation) -> Self {
        WireMessage::Request(WireRequest { id, op })
    }

    /// Build a response message.
    pub fn response(id: Uid, value: WireValue) -> Self {
        WireMessage::Response(WireResponse { id, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_request_schema() {
        let msg = WireMessage::request(
            Some(Uid::new(1, 2)),
            Operation::Get {
                path: vec!["a".to_string(), "b".to_string()],
            },
        );
        let encoded = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "id": { "first": 1, "second": 2 },
                "type": "GET",
                "path": ["a", "b"],
            })
        );
    }

    #[test]
    fn test_set_request_schema() {
        let msg = WireMessage::request(
            Some(Uid::new(3, 4)),
            Operation::Set {
                path: vec!["x".to_string()],
                value: WireValue::raw(Value::Int(9)),
            },
        );
        let encoded = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "id": { "first": 3, "second": 4 },
                "type": "SET",
                "path": ["x"],
                "value": { "type": "RAW", "value": { "Int": 9 } },
            })
        );
    }

    #[test]
    fn test_apply_request_schema() {
        let msg = WireMessage::request(
            None,
            Operation::Apply {
                path: vec!["f".to_string()],
                args: vec![WireArgument {
                    value: WireValue::raw(Value::Bool(true)),
                    port_count: 0,
                }],
            },
        );
        let encoded = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "type": "APPLY",
                "path": ["f"],
                "argumentList": [
                    { "value": { "type": "RAW", "value": { "Bool": true } }, "portCount": 0 }
                ],
            })
        );
    }

    #[test]
    fn test_release_request_schema() {
        let msg = WireMessage::request(Some(Uid::new(0, 7)), Operation::Release);
        let encoded = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "id": { "first": 0, "second": 7 },
                "type": "RELEASE",
            })
        );
    }

    #[test]
    fn test_response_schema() {
        let msg = WireMessage::response(
            Uid::new(5, 6),
            WireValue::Handler {
                name: "proxy".to_string(),
                value: Value::Null,
            },
        );
        let encoded = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "id": { "first": 5, "second": 6 },
                "type": "HANDLER",
                "name": "proxy",
                "value": "Null",
            })
        );
    }

    #[test]
    fn test_untagged_distinguishes_request_from_response() {
        let request = WireMessage::request(
            Some(Uid::fresh()),
            Operation::Get {
                path: vec!["p".to_string()],
            },
        );
        let response = WireMessage::response(Uid::fresh(), WireValue::raw(Value::Int(1)));

        for msg in [request, response] {
            let json = serde_json::to_string(&msg).expect("serialize");
            let decoded: WireMessage = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn test_roundtrip_all_operations() {
        let operations = vec![
            Operation::Get {
                path: vec!["a".to_string()],
            },
            Operation::Set {
                path: vec!["a".to_string(), "b".to_string()],
                value: WireValue::raw(Value::Text("v".to_string())),
            },
            Operation::Apply {
                path: vec![],
                args: vec![
                    WireArgument {
                        value: WireValue::raw(Value::Int(1)),
                        port_count: 0,
                    },
                    WireArgument {
                        value: WireValue::Handler {
                            name: "proxy".to_string(),
                            value: Value::Null,
                        },
                        port_count: 1,
                    },
                ],
            },
            Operation::Construct {
                path: vec!["Pair".to_string()],
                args: vec![],
            },
            Operation::Release,
        ];
        for op in operations {
            let msg = WireMessage::request(Some(Uid::fresh()), op);
            let json = serde_json::to_string(&msg).expect("serialize");
            let decoded: WireMessage = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn test_operation_path_accessor() {
        let op = Operation::Get {
            path: vec!["a".to_string()],
        };
        assert_eq!(op.path(), &["a".to_string()]);
        assert!(Operation::Release.path().is_empty());
    }
}
