//! Transfer handlers and their registry.
//!
//! A [`TransferHandler`] teaches the engine how to move one family of
//! non-sendable nodes across a channel: it claims nodes via `can_handle`,
//! turns a claimed node into a sendable payload plus attached sub-channels,
//! and rebuilds the node on the receiving side. The wire envelope records
//! which handler produced a payload, so both sides must agree on the
//! registered names.
//!
//! Two handlers are built in:
//!
//! - `"proxy"`: moves proxy-marked objects, functions, and constructors by
//!   reference. Encoding exposes the node on a fresh sub-channel pair and
//!   attaches the far end; decoding wraps the arriving end into a
//!   [`RemoteHandle`](crate::RemoteHandle).
//! - `"throw"`: moves thrown errors, preserving name/message/stack for
//!   error-like throws and the raw value otherwise.
//!
//! Hosts register their own handlers with [`HandlerRegistry::register`];
//! a handler with an already-registered name replaces the old one in place,
//! keeping its priority position.

use std::cell::RefCell;
use std::rc::Rc;

use marionette_core::{Channel, ChannelRef, LocalChannel, Value, WireArgument, WireValue};

use crate::error::{ProxyError, ThrownError};
use crate::expose::expose;
use crate::node::Node;
use crate::proxy::wrap;

/// Factory for the sub-channel pairs the `"proxy"` handler consumes.
///
/// The default [`LocalChannelProvider`] creates in-memory pairs; an
/// embedding that tunnels sub-channels over a real transport supplies its
/// own provider.
pub trait ChannelProvider {
    /// Create a fresh entangled channel pair.
    fn create_pair(&self) -> (ChannelRef, ChannelRef);
}

/// The in-memory [`ChannelProvider`].
#[derive(Debug, Default)]
pub struct LocalChannelProvider;

impl ChannelProvider for LocalChannelProvider {
    fn create_pair(&self) -> (ChannelRef, ChannelRef) {
        LocalChannel::pair()
    }
}

/// One pluggable encode/decode strategy for a family of nodes.
pub trait TransferHandler {
    /// The wire name both sides register this handler under.
    fn name(&self) -> &str;

    /// Whether this handler claims the node. The first registered handler
    /// that claims a node wins.
    fn can_handle(&self, node: &Node) -> bool;

    /// Encode a claimed node into a sendable payload plus the sub-channels
    /// to attach to the carrying message.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be encoded (for instance a
    /// nested value outside the sendable universe).
    fn serialize(
        &self,
        node: Node,
        registry: &HandlerRegistry,
    ) -> Result<(Value, Vec<ChannelRef>), ProxyError>;

    /// Rebuild a node from the payload and the sub-channels that travelled
    /// with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or attached sub-channels do not
    /// match what `serialize` produces.
    fn deserialize(
        &self,
        value: Value,
        ports: Vec<ChannelRef>,
        registry: &HandlerRegistry,
    ) -> Result<Node, ProxyError>;
}

struct RegistryInner {
    handlers: RefCell<Vec<Rc<dyn TransferHandler>>>,
    provider: Rc<dyn ChannelProvider>,
}

/// The ordered collection of transfer handlers one endpoint uses.
///
/// Cheap to clone; clones share the same handler list and provider.
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Rc<RegistryInner>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// A registry with the built-in `"proxy"` and `"throw"` handlers and
    /// in-memory sub-channel pairs.
    pub fn new() -> Self {
        Self::with_provider(Rc::new(LocalChannelProvider))
    }

    /// A registry with the built-in handlers and a custom sub-channel
    /// provider.
    pub fn with_provider(provider: Rc<dyn ChannelProvider>) -> Self {
        let registry = Self {
            inner: Rc::new(RegistryInner {
                handlers: RefCell::new(Vec::new()),
                provider,
            }),
        };
        registry.register(Rc::new(ProxyTransferHandler));
        registry.register(Rc::new(ThrowTransferHandler));
        registry
    }

    /// Register a handler. Re-registering a name replaces the previous
    /// handler in place, keeping its priority position.
    pub fn register(&self, handler: Rc<dyn TransferHandler>) {
        let mut handlers = self.inner.handlers.borrow_mut();
        match handlers.iter_mut().find(|h| h.name() == handler.name()) {
            Some(slot) => *slot = handler,
            None => handlers.push(handler),
        }
    }

    /// Create a fresh sub-channel pair from the configured provider.
    pub fn create_pair(&self) -> (ChannelRef, ChannelRef) {
        self.inner.provider.create_pair()
    }

    fn lookup(&self, name: &str) -> Option<Rc<dyn TransferHandler>> {
        self.inner
            .handlers
            .borrow()
            .iter()
            .find(|h| h.name() == name)
            .cloned()
    }

    fn claimant(&self, node: &Node) -> Option<Rc<dyn TransferHandler>> {
        // Snapshot so a handler may consult the registry while encoding.
        let snapshot: Vec<Rc<dyn TransferHandler>> = self.inner.handlers.borrow().clone();
        snapshot.into_iter().find(|h| h.can_handle(node))
    }

    /// Encode a node into a wire value plus the sub-channels to attach.
    ///
    /// Handlers are consulted in registration order; an unclaimed node must
    /// be directly sendable (a plain value, or an unmarked object that
    /// snapshots cleanly).
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::NotSendable`] when no handler claims the node
    /// and it is outside the sendable universe.
    pub fn to_wire_value(&self, node: Node) -> Result<(WireValue, Vec<ChannelRef>), ProxyError> {
        if let Some(handler) = self.claimant(&node) {
            let name = handler.name().to_string();
            let (value, ports) = handler.serialize(node, self)?;
            return Ok((WireValue::Handler { name, value }, ports));
        }
        match node {
            Node::Value(value) => Ok((WireValue::raw(value), vec![])),
            Node::Object(obj) => {
                let snapshot = obj.borrow().to_value().map_err(|thrown| {
                    ProxyError::NotSendable {
                        reason: thrown.to_string(),
                    }
                })?;
                Ok((WireValue::raw(snapshot), vec![]))
            }
            other => Err(ProxyError::NotSendable {
                reason: format!("no transfer handler claims {:?}", other),
            }),
        }
    }

    /// Encode one call/construct argument, recording how many sub-channels
    /// it consumes.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`to_wire_value`](Self::to_wire_value).
    pub fn to_wire_argument(
        &self,
        node: Node,
    ) -> Result<(WireArgument, Vec<ChannelRef>), ProxyError> {
        let (value, ports) = self.to_wire_value(node)?;
        Ok((
            WireArgument {
                value,
                port_count: ports.len(),
            },
            ports,
        ))
    }

    /// Decode a wire value back into a node.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UnknownHandler`] when the envelope names a
    /// handler this registry does not have. That failure is fatal for the
    /// decode; it is never papered over with a raw value.
    pub fn from_wire_value(
        &self,
        wire: WireValue,
        ports: Vec<ChannelRef>,
    ) -> Result<Node, ProxyError> {
        match wire {
            WireValue::Raw { value } => Ok(Node::Value(value)),
            WireValue::Handler { name, value } => match self.lookup(&name) {
                Some(handler) => handler.deserialize(value, ports, self),
                None => {
                    crate::lifecycle::discard_ports(ports);
                    Err(ProxyError::UnknownHandler { name })
                }
            },
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

/// The built-in `"proxy"` handler: by-reference transfer.
///
/// Claims proxy-marked objects, functions, and constructors. Encoding
/// exposes the node on the near end of a fresh pair and ships the far end
/// as the message's sole attached sub-channel; the payload itself is
/// `Null`.
struct ProxyTransferHandler;

impl TransferHandler for ProxyTransferHandler {
    fn name(&self) -> &str {
        "proxy"
    }

    fn can_handle(&self, node: &Node) -> bool {
        match node {
            Node::Object(obj) => obj.borrow().is_proxied(),
            Node::Function(_) | Node::Constructor(_) => true,
            _ => false,
        }
    }

    fn serialize(
        &self,
        node: Node,
        registry: &HandlerRegistry,
    ) -> Result<(Value, Vec<ChannelRef>), ProxyError> {
        let (near, far) = registry.create_pair();
        expose(node, near.clone(), registry.clone());
        near.start();
        Ok((Value::Null, vec![far]))
    }

    fn deserialize(
        &self,
        _value: Value,
        ports: Vec<ChannelRef>,
        registry: &HandlerRegistry,
    ) -> Result<Node, ProxyError> {
        let mut ports = ports.into_iter();
        let port = ports.next().ok_or_else(|| ProxyError::Protocol {
            reason: "proxy payload arrived without its sub-channel".to_string(),
        })?;
        Ok(Node::Handle(wrap(port, registry.clone())))
    }
}

/// The built-in `"throw"` handler: thrown-error transfer.
struct ThrowTransferHandler;

impl TransferHandler for ThrowTransferHandler {
    fn name(&self) -> &str {
        "throw"
    }

    fn can_handle(&self, node: &Node) -> bool {
        matches!(node, Node::Thrown(_))
    }

    fn serialize(
        &self,
        node: Node,
        _registry: &HandlerRegistry,
    ) -> Result<(Value, Vec<ChannelRef>), ProxyError> {
        let Node::Thrown(thrown) = node else {
            return Err(ProxyError::Protocol {
                reason: "throw handler fed a non-thrown node".to_string(),
            });
        };
        let payload = match thrown {
            ThrownError::Error {
                name,
                message,
                stack,
            } => Value::record([
                ("isError", Value::Bool(true)),
                ("name", Value::Text(name)),
                ("message", Value::Text(message)),
                ("stack", stack.map(Value::Text).unwrap_or(Value::Null)),
            ]),
            ThrownError::Value(value) => {
                Value::record([("isError", Value::Bool(false)), ("value", value)])
            }
        };
        Ok((payload, vec![]))
    }

    fn deserialize(
        &self,
        value: Value,
        _ports: Vec<ChannelRef>,
        _registry: &HandlerRegistry,
    ) -> Result<Node, ProxyError> {
        let is_error = value
            .get("isError")
            .and_then(Value::as_bool)
            .ok_or_else(|| ProxyError::Protocol {
                reason: "throw payload is missing `isError`".to_string(),
            })?;
        let thrown = if is_error {
            let field = |key: &str| {
                value
                    .get(key)
                    .and_then(Value::as_text)
                    .map(str::to_string)
            };
            ThrownError::Error {
                name: field("name").unwrap_or_else(|| "Error".to_string()),
                message: field("message").unwrap_or_default(),
                stack: field("stack"),
            }
        } else {
            ThrownError::Value(value.get("value").cloned().unwrap_or(Value::Null))
        };
        Ok(Node::Thrown(thrown))
    }
}
