//! The server side: serving an object graph over a channel.
//!
//! [`expose`] registers a request listener on a channel and starts it. Each
//! arriving request is handled on its own local task, so a slow function
//! call never blocks other requests on the same channel; responses are
//! correlated by id, not by order.
//!
//! Dispatch semantics:
//!
//! - `GET` navigates the path and returns whatever is there (`Null` past a
//!   missing entry or a non-object).
//! - `SET` requires a non-empty path whose parent navigates to an object;
//!   anything else is answered with a `MalformedRequest` throw. A
//!   successful write is acknowledged with `true`.
//! - `APPLY` requires a function at the path; the navigated parent (when it
//!   is an object) is passed as the receiver.
//! - `CONSTRUCT` requires a constructor; every new instance is marked
//!   proxied, so it crosses back by reference.
//! - `RELEASE` is acknowledged with `Null`, then the listener is removed
//!   and the channel closed.
//!
//! Thrown errors — including failures to encode a result — travel back
//! through the `"throw"` transfer handler and never tear the channel down.

use std::cell::Cell;
use std::rc::Rc;

use marionette_core::{
    Channel, ChannelRef, ListenerId, Operation, Value, WireArgument, WireMessage, WireRequest,
};

use crate::error::{ProxyError, ThrownError};
use crate::lifecycle::discard_ports;
use crate::node::{navigate, Node};
use crate::registry::HandlerRegistry;

/// Serve `root` to the peer of `channel`.
///
/// Registers the request listener and starts the channel; requests buffered
/// before this call begin flowing immediately. The exposure stays alive
/// until the peer sends `RELEASE` or the channel is closed.
///
/// Handling runs on local tasks, so the caller must be inside a
/// [`tokio::task::LocalSet`].
pub fn expose(root: impl Into<Node>, channel: ChannelRef, registry: HandlerRegistry) {
    let root = root.into();
    let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
    let listener_slot = slot.clone();
    let listening = channel.clone();
    let id = channel.add_listener(Rc::new(move |message, ports| {
        let WireMessage::Request(request) = message else {
            return;
        };
        tokio::task::spawn_local(handle_request(
            root.clone(),
            listening.clone(),
            registry.clone(),
            request.clone(),
            ports.to_vec(),
            listener_slot.clone(),
        ));
    }));
    slot.set(Some(id));
    channel.start();
}

/// Handle one request end-to-end: dispatch, encode, reply, and (for
/// `RELEASE`) tear the exposure down after the acknowledgement.
async fn handle_request(
    root: Node,
    channel: ChannelRef,
    registry: HandlerRegistry,
    request: WireRequest,
    ports: Vec<ChannelRef>,
    listener_slot: Rc<Cell<Option<ListenerId>>>,
) {
    let is_release = matches!(request.op, Operation::Release);
    let node = match dispatch(&root, &registry, request.op, ports).await {
        Ok(node) => node,
        Err(thrown) => Node::Thrown(thrown),
    };

    let encoded = registry.to_wire_value(node).or_else(|err| {
        // The result itself could not be encoded; answer with a throw.
        let thrown = ThrownError::new("DataCloneError", err.to_string());
        registry.to_wire_value(Node::Thrown(thrown))
    });
    match (request.id, encoded) {
        (Some(id), Ok((wire, out_ports))) => {
            let attached = out_ports.clone();
            if let Err(err) = channel.post(WireMessage::response(id, wire), out_ports) {
                tracing::warn!(%err, "failed to post response");
                // The reply never left; any exposures it carried must not
                // outlive it.
                discard_ports(attached);
            }
        }
        (None, Ok((_, out_ports))) => {
            tracing::debug!("request without id processed, dropping reply");
            discard_ports(out_ports);
        }
        (_, Err(err)) => {
            tracing::warn!(%err, "could not encode any response");
        }
    }

    if is_release {
        if let Some(id) = listener_slot.take() {
            channel.remove_listener(id);
        }
        channel.close();
    }
}

async fn dispatch(
    root: &Node,
    registry: &HandlerRegistry,
    op: Operation,
    ports: Vec<ChannelRef>,
) -> Result<Node, ThrownError> {
    match op {
        Operation::Get { path } => Ok(navigate(root, &path)),
        Operation::Set { path, value } => {
            let Some((name, parents)) = path.split_last() else {
                return Err(ThrownError::malformed("SET requires a non-empty path"));
            };
            let parent = navigate(root, parents);
            let Some(obj) = parent.as_object() else {
                return Err(ThrownError::malformed("SET target is not an object"));
            };
            let node = registry.from_wire_value(value, ports).map_err(decode_throw)?;
            obj.borrow_mut().set(name.clone(), node);
            Ok(Node::Value(Value::Bool(true)))
        }
        Operation::Apply { path, args } => {
            let Node::Function(function) = navigate(root, &path) else {
                return Err(ThrownError::not_callable("APPLY target is not a function"));
            };
            let this = receiver(root, &path);
            let args = decode_args(registry, args, ports)?;
            function.call(this, args).resolve().await
        }
        Operation::Construct { path, args } => {
            let Node::Constructor(ctor) = navigate(root, &path) else {
                return Err(ThrownError::not_callable(
                    "CONSTRUCT target is not a constructor",
                ));
            };
            let args = decode_args(registry, args, ports)?;
            let instance = ctor.construct(args)?;
            instance.borrow_mut().mark_proxied();
            Ok(Node::Object(instance))
        }
        Operation::Release => Ok(Node::null()),
    }
}

/// The call receiver: the navigated parent of the call path, when it is an
/// object.
fn receiver(root: &Node, path: &[String]) -> Option<crate::node::ObjectRef> {
    let (_, parents) = path.split_last()?;
    navigate(root, parents).as_object().cloned()
}

/// Decode call arguments, slicing the carried sub-channels apart by each
/// argument's declared `port_count`.
fn decode_args(
    registry: &HandlerRegistry,
    args: Vec<WireArgument>,
    ports: Vec<ChannelRef>,
) -> Result<Vec<Node>, ThrownError> {
    let mut remaining = ports.into_iter();
    let mut nodes = Vec::with_capacity(args.len());
    for arg in args {
        let taken: Vec<ChannelRef> = remaining.by_ref().take(arg.port_count).collect();
        let decoded = if taken.len() != arg.port_count {
            discard_ports(taken);
            Err(ThrownError::malformed(
                "argument declares more sub-channels than the message carries",
            ))
        } else {
            registry.from_wire_value(arg.value, taken).map_err(decode_throw)
        };
        match decoded {
            Ok(node) => nodes.push(node),
            Err(thrown) => {
                // Abandon the arguments not yet decoded; already-decoded
                // handles release themselves on drop.
                discard_ports(remaining.collect());
                return Err(thrown);
            }
        }
    }
    Ok(nodes)
}

fn decode_throw(err: ProxyError) -> ThrownError {
    ThrownError::malformed(err.to_string())
}
