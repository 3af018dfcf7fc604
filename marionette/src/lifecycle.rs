//! Handle lifecycle tracking.
//!
//! Every [`RemoteHandle`](crate::RemoteHandle) over one endpoint shares a
//! single [`EndpointState`]: a live-handle count plus a released flag. The
//! original relied on garbage-collection finalizers with unguaranteed
//! timing; here the primary mechanism is scoped ownership — handles are
//! `Clone + Drop`, so the last drop runs teardown deterministically.
//!
//! Two paths lead to teardown:
//!
//! - explicit [`release()`](crate::RemoteHandle::release): sends RELEASE
//!   with an id, awaits the acknowledgement, then closes;
//! - the last handle dropping: best-effort RELEASE without an id (nothing
//!   is left alive to await it), then close.
//!
//! Whichever runs first marks the state released; the loser does nothing,
//! so the channel closes exactly once and every later operation fails fast
//! with `ProxyError::Released`.

use std::cell::Cell;
use std::rc::Rc;

use marionette_core::{Channel, ChannelRef, Operation, WireMessage};

/// Shared per-endpoint lifecycle state.
#[derive(Debug)]
pub(crate) struct EndpointState {
    live: Cell<usize>,
    released: Cell<bool>,
}

impl EndpointState {
    /// Fresh state with no live handles yet.
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            live: Cell::new(0),
            released: Cell::new(false),
        })
    }

    /// Record one more live handle.
    pub(crate) fn retain(&self) {
        self.live.set(self.live.get() + 1);
    }

    /// Whether the endpoint has been released.
    pub(crate) fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Mark released. Returns `false` if it already was.
    pub(crate) fn mark_released(&self) -> bool {
        !self.released.replace(true)
    }

    /// Record one handle gone. Returns `true` exactly when this was the
    /// last live handle and the endpoint was not yet released — the caller
    /// must then run teardown.
    pub(crate) fn release_one(&self) -> bool {
        let remaining = self.live.get().saturating_sub(1);
        self.live.set(remaining);
        remaining == 0 && self.mark_released()
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.live.get()
    }
}

/// Tear down sub-channels that will never reach their destination.
///
/// Each port is the far end of an exposure living on its peer; dropping it
/// silently would leave that exposure's listener (and its self-referential
/// `Rc`) alive forever. A best-effort RELEASE lets the peer detach and
/// close; closing our end follows either way.
pub(crate) fn discard_ports(ports: Vec<ChannelRef>) {
    for port in ports {
        let _ = port.post(WireMessage::request(None, Operation::Release), vec![]);
        port.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_fires_only_at_zero() {
        let state = EndpointState::new();
        state.retain();
        state.retain();
        state.retain();
        assert_eq!(state.live_count(), 3);

        assert!(!state.release_one());
        assert!(!state.release_one());
        assert!(state.release_one());
        assert!(state.is_released());
    }

    #[test]
    fn test_explicit_release_preempts_drop_teardown() {
        let state = EndpointState::new();
        state.retain();
        state.retain();

        assert!(state.mark_released());
        assert!(!state.mark_released());

        // Later drops must not trigger a second teardown.
        assert!(!state.release_one());
        assert!(!state.release_one());
    }

    #[test]
    fn test_new_state_is_live() {
        let state = EndpointState::new();
        assert!(!state.is_released());
        assert_eq!(state.live_count(), 0);
    }

    #[test]
    fn test_discard_releases_peer_then_closes() {
        use std::cell::RefCell;
        use marionette_core::LocalChannel;

        let (near, far) = LocalChannel::pair();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        near.add_listener(Rc::new(move |message, _ports| {
            sink.borrow_mut().push(message.clone());
        }));
        near.start();

        discard_ports(vec![far.clone()]);
        assert!(far.is_closed());

        let messages = seen.borrow();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            WireMessage::Request(request) => {
                assert_eq!(request.id, None);
                assert!(matches!(request.op, Operation::Release));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
