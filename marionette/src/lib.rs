//! Transparent object proxying over message channels.
//!
//! One side [`expose`]s an object graph — values, mutable objects,
//! functions, constructors — on a channel endpoint; the other side
//! [`wrap`]s the peer endpoint into a [`RemoteHandle`] and operates on the
//! graph through awaited calls. Non-sendable nodes cross the wire by
//! reference through pluggable transfer handlers: each by-reference
//! transfer rides its own sub-channel attached to the carrying message, so
//! callbacks and live objects compose to any depth.
//!
//! The engine is single-threaded by design, mirroring the message-passing
//! model it came from: state is `Rc`/`RefCell`-owned and request handling
//! runs on [`tokio::task::LocalSet`] tasks.
//!
//! # Examples
//!
//! ```
//! use marionette::{expose, wrap, CallOutcome, ExposedObject, HandlerRegistry, Node};
//! use marionette_core::{LocalChannel, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?;
//! let local = tokio::task::LocalSet::new();
//! runtime.block_on(local.run_until(async {
//!     let (client, server) = LocalChannel::pair();
//!     let registry = HandlerRegistry::new();
//!
//!     expose(
//!         ExposedObject::new().with(
//!             "double",
//!             Node::function(|_this, args| {
//!                 let n = args
//!                     .first()
//!                     .and_then(Node::as_value)
//!                     .and_then(Value::as_int)
//!                     .unwrap_or(0);
//!                 CallOutcome::ok(Node::from(n * 2))
//!             }),
//!         ),
//!         server,
//!         registry.clone(),
//!     );
//!
//!     let root = wrap(client, registry);
//!     let result = root.invoke("double", vec![Node::from(21_i64)]).await?;
//!     assert_eq!(result.as_value(), Some(&Value::Int(42)));
//!     Ok::<_, Box<dyn std::error::Error>>(())
//! }))?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod correlate;
mod error;
mod expose;
mod lifecycle;
mod node;
mod proxy;
mod registry;

pub use error::{ProxyError, ThrownError};
pub use expose::expose;
pub use node::{
    CallOutcome, ConstructorNode, ExposedObject, FunctionNode, LocalNodeFuture, Node, ObjectRef,
};
pub use proxy::{wrap, Remote, RemoteHandle};
pub use registry::{ChannelProvider, HandlerRegistry, LocalChannelProvider, TransferHandler};

pub use marionette_core::{
    Channel, ChannelError, ChannelRef, ListenerId, LocalChannel, MessageListener, Operation, Uid,
    Value, WireArgument, WireMessage, WireRequest, WireResponse, WireValue,
};
