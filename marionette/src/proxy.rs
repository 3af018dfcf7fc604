//! The client side: handles over a remote object graph.
//!
//! The original intercepted arbitrary property access through reflection;
//! here the surface is explicit. A [`RemoteHandle`] names a location in the
//! peer's exposed graph by access path; [`get`](RemoteHandle::get) extends
//! the path without any traffic, and [`resolve`](RemoteHandle::resolve),
//! [`set`](RemoteHandle::set), [`call`](RemoteHandle::call), and
//! [`construct`](RemoteHandle::construct) each perform one awaited
//! round-trip.
//!
//! Handles are `Clone` and reference-counted per endpoint. The last handle
//! to drop posts a best-effort `RELEASE` and closes the channel; an
//! explicit [`release`](RemoteHandle::release) does the same but awaits the
//! peer's acknowledgement first. Either way every surviving sibling fails
//! fast with [`ProxyError::Released`] afterwards.

use std::rc::Rc;

use marionette_core::{Channel, ChannelRef, Operation, Value, WireMessage, WireValue};

use crate::correlate::request_response;
use crate::error::ProxyError;
use crate::lifecycle::{discard_ports, EndpointState};
use crate::node::Node;
use crate::registry::HandlerRegistry;

/// What a remote operation came back with.
#[derive(Debug, Clone)]
pub enum Remote {
    /// A sendable value (raw, or a by-value object snapshot).
    Value(Value),
    /// A by-reference result: a handle over its own sub-channel.
    Handle(RemoteHandle),
}

impl Remote {
    /// Borrow the value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Remote::Value(value) => Some(value),
            Remote::Handle(_) => None,
        }
    }

    /// Take the handle, if this is one.
    pub fn into_handle(self) -> Option<RemoteHandle> {
        match self {
            Remote::Handle(handle) => Some(handle),
            Remote::Value(_) => None,
        }
    }
}

/// A reference to one location in a peer's exposed object graph.
pub struct RemoteHandle {
    channel: ChannelRef,
    registry: HandlerRegistry,
    path: Vec<String>,
    state: Rc<EndpointState>,
}

/// Attach a handle to the root of whatever the peer exposes on `channel`.
///
/// Starts the channel; responses buffered before attachment begin flowing.
pub fn wrap(channel: ChannelRef, registry: HandlerRegistry) -> RemoteHandle {
    channel.start();
    let state = EndpointState::new();
    state.retain();
    RemoteHandle {
        channel,
        registry,
        path: Vec::new(),
        state,
    }
}

impl RemoteHandle {
    fn ensure_live(&self) -> Result<(), ProxyError> {
        if self.state.is_released() {
            Err(ProxyError::Released)
        } else {
            Ok(())
        }
    }

    fn child(&self, path: Vec<String>) -> RemoteHandle {
        self.state.retain();
        RemoteHandle {
            channel: self.channel.clone(),
            registry: self.registry.clone(),
            path,
            state: self.state.clone(),
        }
    }

    async fn round_trip(
        &self,
        op: Operation,
        ports: Vec<ChannelRef>,
    ) -> Result<(WireValue, Vec<ChannelRef>), ProxyError> {
        self.ensure_live()?;
        request_response(&self.channel, op, ports).await
    }

    fn decode(&self, wire: WireValue, ports: Vec<ChannelRef>) -> Result<Remote, ProxyError> {
        match self.registry.from_wire_value(wire, ports)? {
            Node::Value(value) => Ok(Remote::Value(value)),
            Node::Handle(handle) => Ok(Remote::Handle(handle)),
            Node::Thrown(thrown) => Err(thrown.into()),
            other => Err(ProxyError::Protocol {
                reason: format!("response decoded to a non-result node: {:?}", other),
            }),
        }
    }

    /// A handle one property deeper. Pure path extension; no traffic.
    ///
    /// # Errors
    ///
    /// Fails with [`ProxyError::Released`] after the endpoint is released.
    pub fn get(&self, name: impl Into<String>) -> Result<RemoteHandle, ProxyError> {
        self.ensure_live()?;
        let mut path = self.path.clone();
        path.push(name.into());
        Ok(self.child(path))
    }

    /// Fetch the value (or by-reference handle) at this handle's path.
    ///
    /// Resolving a root handle is a local no-op: it answers with a sibling
    /// of itself rather than opening a redundant sub-channel.
    ///
    /// # Errors
    ///
    /// Remote throws come back as [`ProxyError::Remote`] or
    /// [`ProxyError::RemoteValue`].
    pub async fn resolve(&self) -> Result<Remote, ProxyError> {
        self.ensure_live()?;
        if self.path.is_empty() {
            return Ok(Remote::Handle(self.clone()));
        }
        let op = Operation::Get {
            path: self.path.clone(),
        };
        let (wire, ports) = self.round_trip(op, vec![]).await?;
        self.decode(wire, ports)
    }

    /// Assign a node at `name` under this handle's path and await the
    /// peer's acknowledgement.
    ///
    /// # Errors
    ///
    /// The peer answers a `MalformedRequest` throw if the target path does
    /// not land in an object.
    pub async fn set(
        &self,
        name: impl Into<String>,
        node: impl Into<Node>,
    ) -> Result<(), ProxyError> {
        self.ensure_live()?;
        let (value, ports) = self.registry.to_wire_value(node.into())?;
        let mut path = self.path.clone();
        path.push(name.into());
        let (wire, arriving) = self.round_trip(Operation::Set { path, value }, ports).await?;
        match self.decode(wire, arriving)? {
            Remote::Value(Value::Bool(true)) => Ok(()),
            other => Err(ProxyError::Protocol {
                reason: format!("SET acknowledged with {:?}", other),
            }),
        }
    }

    /// Call the function at this handle's path.
    pub async fn call(&self, args: Vec<Node>) -> Result<Remote, ProxyError> {
        self.ensure_live()?;
        let (args, ports) = self.encode_args(args)?;
        let op = Operation::Apply {
            path: self.path.clone(),
            args,
        };
        let (wire, arriving) = self.round_trip(op, ports).await?;
        self.decode(wire, arriving)
    }

    /// Call the method `name` under this handle's path. Shorthand for
    /// `get(name)?.call(args)`.
    pub async fn invoke(
        &self,
        name: impl Into<String>,
        args: Vec<Node>,
    ) -> Result<Remote, ProxyError> {
        self.get(name)?.call(args).await
    }

    /// Construct a new instance from the constructor at this handle's path.
    ///
    /// Instances always come back by reference.
    pub async fn construct(&self, args: Vec<Node>) -> Result<RemoteHandle, ProxyError> {
        self.ensure_live()?;
        let (args, ports) = self.encode_args(args)?;
        let op = Operation::Construct {
            path: self.path.clone(),
            args,
        };
        let (wire, arriving) = self.round_trip(op, ports).await?;
        match self.decode(wire, arriving)? {
            Remote::Handle(handle) => Ok(handle),
            Remote::Value(value) => Err(ProxyError::Protocol {
                reason: format!("CONSTRUCT answered by value: {:?}", value),
            }),
        }
    }

    /// Release the endpoint: await the peer's acknowledgement, then close
    /// the channel. Every handle sharing this endpoint fails fast with
    /// [`ProxyError::Released`] from here on.
    pub async fn release(&self) -> Result<(), ProxyError> {
        self.ensure_live()?;
        let result = request_response(&self.channel, Operation::Release, vec![]).await;
        self.state.mark_released();
        self.channel.close();
        result.map(|_| ())
    }

    fn encode_args(
        &self,
        args: Vec<Node>,
    ) -> Result<(Vec<marionette_core::WireArgument>, Vec<ChannelRef>), ProxyError> {
        let mut encoded = Vec::with_capacity(args.len());
        let mut all_ports = Vec::new();
        for arg in args {
            match self.registry.to_wire_argument(arg) {
                Ok((wire, ports)) => {
                    encoded.push(wire);
                    all_ports.extend(ports);
                }
                Err(err) => {
                    // Earlier arguments may already have spawned exposures
                    // on fresh sub-channels; release them or they outlive
                    // the failed call.
                    discard_ports(all_ports);
                    return Err(err);
                }
            }
        }
        Ok((encoded, all_ports))
    }
}

impl Clone for RemoteHandle {
    fn clone(&self) -> Self {
        self.child(self.path.clone())
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        if self.state.release_one() {
            // Nothing is left alive to await an acknowledgement; post the
            // release best-effort and close.
            tracing::debug!("last handle dropped, releasing endpoint");
            let _ = self
                .channel
                .post(WireMessage::request(None, Operation::Release), vec![]);
            self.channel.close();
        }
    }
}

impl std::fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("path", &self.path)
            .field("released", &self.state.is_released())
            .finish()
    }
}
