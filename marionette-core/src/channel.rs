//! The endpoint contract and the in-memory channel pair.
//!
//! A [`Channel`] is the seam between the proxying engine and whatever
//! transport a host embeds it into: something that can register message
//! listeners, post a message with optional attached sub-channels, `start`
//! (begin flowing buffered messages), and `close`.
//!
//! [`LocalChannel`] is the in-process implementation: an entangled pair
//! where posting on one side delivers on the other. It backs the built-in
//! proxy transfer handler (which needs fresh sub-channel pairs) and the
//! test suite. Real transports implement [`Channel`] themselves and move
//! messages as bytes via a [`MessageCodec`](crate::MessageCodec).
//!
//! Channels are single-threaded: listeners run inside the delivering call
//! stack, and all state is `Rc`/`RefCell`-owned.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::WireMessage;

/// Shared reference to a channel endpoint.
pub type ChannelRef = Rc<dyn Channel>;

/// A registered message listener.
///
/// Receives every message delivered to the channel together with the
/// sub-channels attached to it. Listeners must ignore messages that do not
/// concern them; several listeners routinely coexist on one channel.
pub type MessageListener = Rc<dyn Fn(&WireMessage, &[ChannelRef])>;

/// Opaque id of a registered listener, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Errors surfaced by channel operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// The channel has been closed; no further messages can be posted.
    #[error("channel is closed")]
    Closed,
}

/// A bidirectional message endpoint.
///
/// The contract the proxying engine relies on:
///
/// - `post` atomically delivers a payload plus zero or more freshly opened
///   sub-channels to the peer.
/// - `start` is idempotent and begins delivering messages buffered before
///   any listener was ready.
/// - `close` is idempotent and terminates the endpoint.
pub trait Channel {
    /// Register a message listener. Listeners added after `start` observe
    /// only messages delivered from then on.
    fn add_listener(&self, listener: MessageListener) -> ListenerId;

    /// Remove a previously registered listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);

    /// Deliver a message plus attached sub-channels to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if this endpoint is closed.
    /// Delivery toward a closed or dropped peer is silently discarded.
    fn post(&self, message: WireMessage, ports: Vec<ChannelRef>) -> Result<(), ChannelError>;

    /// Begin flowing buffered messages. Idempotent.
    fn start(&self);

    /// Terminate this endpoint. Idempotent; detaches all listeners and
    /// drops any undelivered backlog.
    fn close(&self);

    /// Whether this endpoint has been closed.
    fn is_closed(&self) -> bool;
}

/// In-memory channel endpoint, created in entangled pairs.
///
/// Messages posted before the receiving side calls `start` are buffered in
/// arrival order and flushed by `start`. Delivery is synchronous: listeners
/// run inside the posting call stack.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use marionette_core::{LocalChannel, Operation, WireMessage};
///
/// let (a, b) = LocalChannel::pair();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// b.add_listener(Rc::new(move |msg, _ports| {
///     sink.borrow_mut().push(msg.clone());
/// }));
/// b.start();
///
/// a.post(WireMessage::request(None, Operation::Release), vec![]).expect("post");
/// assert_eq!(seen.borrow().len(), 1);
/// ```
pub struct LocalChannel {
    peer: RefCell<Weak<LocalChannel>>,
    listeners: RefCell<Vec<(u64, MessageListener)>>,
    next_listener_id: Cell<u64>,
    started: Cell<bool>,
    closed: Cell<bool>,
    backlog: RefCell<VecDeque<(WireMessage, Vec<ChannelRef>)>>,
}

impl LocalChannel {
    fn new() -> Self {
        Self {
            peer: RefCell::new(Weak::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(1),
            started: Cell::new(false),
            closed: Cell::new(false),
            backlog: RefCell::new(VecDeque::new()),
        }
    }

    /// Create an entangled pair of endpoints.
    pub fn pair() -> (ChannelRef, ChannelRef) {
        let a = Rc::new(LocalChannel::new());
        let b = Rc::new(LocalChannel::new());
        *a.peer.borrow_mut() = Rc::downgrade(&b);
        *b.peer.borrow_mut() = Rc::downgrade(&a);
        (a, b)
    }

    /// Accept a message arriving from the peer.
    fn receive(&self, message: WireMessage, ports: Vec<ChannelRef>) {
        if self.closed.get() {
            tracing::debug!("message arrived on closed channel, dropping");
            return;
        }
        if self.started.get() {
            self.dispatch(message, ports);
        } else {
            self.backlog.borrow_mut().push_back((message, ports));
        }
    }

    /// Run all listeners against one message.
    ///
    /// Listeners are snapshotted first so they may add or remove listeners
    /// (including themselves) while running.
    fn dispatch(&self, message: WireMessage, ports: Vec<ChannelRef>) {
        let snapshot: Vec<(u64, MessageListener)> = self.listeners.borrow().clone();
        for (_, listener) in snapshot {
            listener(&message, &ports);
        }
    }
}

impl Channel for LocalChannel {
    fn add_listener(&self, listener: MessageListener) -> ListenerId {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id.0);
    }

    fn post(&self, message: WireMessage, ports: Vec<ChannelRef>) -> Result<(), ChannelError> {
        if self.closed.get() {
            return Err(ChannelError::Closed);
        }
        match self.peer.borrow().upgrade() {
            Some(peer) => {
                peer.receive(message, ports);
                Ok(())
            }
            None => {
                // Peer side was dropped; the message has nowhere to go.
                tracing::debug!("peer endpoint dropped, discarding message");
                Ok(())
            }
        }
    }

    fn start(&self) {
        if self.started.get() || self.closed.get() {
            return;
        }
        self.started.set(true);
        // Drain without holding the borrow across listener calls: a
        // listener may post back to us and extend the backlog.
        loop {
            let next = self.backlog.borrow_mut().pop_front();
            match next {
                Some((message, ports)) => self.dispatch(message, ports),
                None => break,
            }
        }
    }

    fn close(&self) {
        if self.closed.get() {
            return;
        }
        self.closed.set(true);
        self.listeners.borrow_mut().clear();
        self.backlog.borrow_mut().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
