//! The exposable object graph.
//!
//! A [`Node`] is one location in the graph an exposer serves: a plain
//! sendable value, a mutable string-keyed object, a callable function, a
//! constructor, a handle that arrived from the wire as a reference, or the
//! internal thrown wrapper.
//!
//! The original design intercepted arbitrary property access through
//! host-language reflection; here the graph is explicit. Capability marking
//! is explicit too: [`ExposedObject::proxied`] replaces the hidden
//! proxy-mark property, and [`Node::Thrown`] replaces the hidden throw
//! marker.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use marionette_core::Value;

use crate::error::ThrownError;
use crate::proxy::RemoteHandle;

/// Shared, mutable reference to an exposed object.
pub type ObjectRef = Rc<RefCell<ExposedObject>>;

/// A boxed, non-`Send` future producing a call result.
pub type LocalNodeFuture = Pin<Box<dyn Future<Output = Result<Node, ThrownError>>>>;

/// Result of invoking a [`FunctionNode`].
///
/// A function may answer immediately or hand back a future; the exposer
/// awaits `Pending` outcomes before replying, so a single slow call never
/// blocks other requests on the same channel.
pub enum CallOutcome {
    /// The call completed synchronously.
    Ready(Result<Node, ThrownError>),
    /// The call is still running.
    Pending(LocalNodeFuture),
}

impl CallOutcome {
    /// A successful synchronous result.
    pub fn ok(node: impl Into<Node>) -> Self {
        CallOutcome::Ready(Ok(node.into()))
    }

    /// A synchronous throw.
    pub fn err(thrown: ThrownError) -> Self {
        CallOutcome::Ready(Err(thrown))
    }

    /// Await the outcome, whichever shape it has.
    pub async fn resolve(self) -> Result<Node, ThrownError> {
        match self {
            CallOutcome::Ready(result) => result,
            CallOutcome::Pending(future) => future.await,
        }
    }
}

/// A callable node.
///
/// The first argument is the navigated parent of the call path (the
/// receiver), when that parent is an object — this is how methods mutate
/// their sibling fields.
#[derive(Clone)]
pub struct FunctionNode {
    f: Rc<dyn Fn(Option<ObjectRef>, Vec<Node>) -> CallOutcome>,
}

impl FunctionNode {
    /// Wrap a native function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<ObjectRef>, Vec<Node>) -> CallOutcome + 'static,
    {
        Self { f: Rc::new(f) }
    }

    /// Invoke with the given receiver and arguments.
    pub fn call(&self, this: Option<ObjectRef>, args: Vec<Node>) -> CallOutcome {
        (self.f)(this, args)
    }
}

impl std::fmt::Debug for FunctionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FunctionNode")
    }
}

/// A constructible node.
///
/// Construction results always cross the wire by reference; the exposer
/// tags every new instance as proxied.
#[derive(Clone)]
pub struct ConstructorNode {
    f: Rc<dyn Fn(Vec<Node>) -> Result<ObjectRef, ThrownError>>,
}

impl ConstructorNode {
    /// Wrap a native constructor.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Node>) -> Result<ObjectRef, ThrownError> + 'static,
    {
        Self { f: Rc::new(f) }
    }

    /// Construct a new instance.
    pub fn construct(&self, args: Vec<Node>) -> Result<ObjectRef, ThrownError> {
        (self.f)(args)
    }
}

impl std::fmt::Debug for ConstructorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConstructorNode")
    }
}

/// One location in an exposable object graph.
#[derive(Debug, Clone)]
pub enum Node {
    /// A plain sendable value. Crosses the wire raw.
    Value(Value),
    /// A mutable object. Crosses by value (snapshot) unless marked proxied.
    Object(ObjectRef),
    /// A callable. Always crosses by reference.
    Function(FunctionNode),
    /// A constructor. Always crosses by reference.
    Constructor(ConstructorNode),
    /// A remote reference that arrived from the wire.
    Handle(RemoteHandle),
    /// The internal thrown wrapper; transported by the `"throw"` handler.
    Thrown(ThrownError),
}

impl Node {
    /// The `Null` value node.
    pub fn null() -> Self {
        Node::Value(Value::Null)
    }

    /// Wrap a native function.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(Option<ObjectRef>, Vec<Node>) -> CallOutcome + 'static,
    {
        Node::Function(FunctionNode::new(f))
    }

    /// Wrap a native constructor.
    pub fn constructor<F>(f: F) -> Self
    where
        F: Fn(Vec<Node>) -> Result<ObjectRef, ThrownError> + 'static,
    {
        Node::Constructor(ConstructorNode::new(f))
    }

    /// Borrow the sendable value, if this node is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the object reference, if this node is one.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Node::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

impl From<ExposedObject> for Node {
    fn from(obj: ExposedObject) -> Self {
        Node::Object(obj.into_ref())
    }
}

impl From<ObjectRef> for Node {
    fn from(obj: ObjectRef) -> Self {
        Node::Object(obj)
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Value(Value::Int(n))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Value(Value::Bool(b))
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Value(Value::from(s))
    }
}

/// A mutable, string-keyed exposed object.
///
/// # Examples
///
/// ```
/// use marionette::{ExposedObject, Node};
/// use marionette_core::Value;
///
/// let obj = ExposedObject::new()
///     .with("counter", Node::from(0_i64))
///     .with("label", Node::from("demo"));
/// assert!(obj.get("counter").is_some());
/// ```
#[derive(Debug, Default)]
pub struct ExposedObject {
    entries: BTreeMap<String, Node>,
    proxied: bool,
}

impl ExposedObject {
    /// An empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style entry insertion.
    pub fn with(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        self.entries.insert(name.into(), node.into());
        self
    }

    /// Mark this object to cross the wire by reference instead of by value.
    pub fn proxied(mut self) -> Self {
        self.proxied = true;
        self
    }

    /// Wrap into a shared reference.
    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    /// Look up an entry.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.entries.get(name)
    }

    /// Insert or overwrite an entry.
    pub fn set(&mut self, name: impl Into<String>, node: impl Into<Node>) {
        self.entries.insert(name.into(), node.into());
    }

    /// Whether this object crosses the wire by reference.
    pub fn is_proxied(&self) -> bool {
        self.proxied
    }

    pub(crate) fn mark_proxied(&mut self) {
        self.proxied = true;
    }

    /// Snapshot this object into a sendable record.
    ///
    /// Only plain values and unmarked sub-objects can be snapshotted; the
    /// graph must be acyclic.
    ///
    /// # Errors
    ///
    /// Returns a `DataCloneError` throw if any entry cannot cross by value
    /// (functions, constructors, handles, proxy-marked objects).
    pub fn to_value(&self) -> Result<Value, ThrownError> {
        let mut record = BTreeMap::new();
        for (name, node) in &self.entries {
            let value = match node {
                Node::Value(value) => value.clone(),
                Node::Object(obj) if !obj.borrow().is_proxied() => obj.borrow().to_value()?,
                _ => {
                    return Err(ThrownError::new(
                        "DataCloneError",
                        format!("property `{}` cannot be cloned by value", name),
                    ));
                }
            };
            record.insert(name.clone(), value);
        }
        Ok(Value::Record(record))
    }
}

/// Walk `root` through a property path.
///
/// Navigation past a non-object (or a missing entry) yields `Null` for the
/// remainder and never raises.
pub(crate) fn navigate(root: &Node, path: &[String]) -> Node {
    let mut current = root.clone();
    for segment in path {
        current = match current {
            Node::Object(obj) => {
                let entry = obj.borrow().get(segment).cloned();
                entry.unwrap_or_else(Node::null)
            }
            _ => Node::null(),
        };
    }
    current
}
