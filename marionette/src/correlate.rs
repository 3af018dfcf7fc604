//! Request/response correlation.
//!
//! Every awaited operation gets a fresh [`Uid`], a one-shot listener on the
//! requesting channel, and a [`tokio::sync::oneshot`] pair bridging the
//! listener callback into async/await. The listener ignores everything but
//! the response echoing its id, so any number of requests can be in flight
//! on one channel and responses may arrive in any order.
//!
//! If the channel closes while a request is outstanding, its listener is
//! torn down with the channel, the oneshot sender drops, and the awaiting
//! caller gets [`ProxyError::NoResponse`] instead of hanging.

use std::cell::RefCell;
use std::rc::Rc;

use marionette_core::{Channel, ChannelRef, Operation, Uid, WireMessage, WireValue};
use tokio::sync::oneshot;

use crate::error::ProxyError;

/// Post `op` on `channel` and await the correlated response.
///
/// Attaches `ports` to the request message and hands back the response
/// envelope together with the sub-channels that travelled with it.
pub(crate) async fn request_response(
    channel: &ChannelRef,
    op: Operation,
    ports: Vec<ChannelRef>,
) -> Result<(WireValue, Vec<ChannelRef>), ProxyError> {
    let id = Uid::fresh();
    let (tx, rx) = oneshot::channel();

    // The sender lives inside the listener closure. If the channel closes
    // first, clearing the listeners drops the sender and `rx` resolves to
    // an error instead of pending forever.
    let sender = RefCell::new(Some(tx));
    let listener_id = channel.add_listener(Rc::new(move |message, arriving| {
        if let WireMessage::Response(response) = message {
            if response.id == id {
                if let Some(tx) = sender.borrow_mut().take() {
                    let _ = tx.send((response.value.clone(), arriving.to_vec()));
                }
            }
        }
    }));

    channel.start();
    tracing::debug!(%id, "posting request");
    if let Err(err) = channel.post(WireMessage::request(Some(id), op), ports) {
        channel.remove_listener(listener_id);
        return Err(err.into());
    }

    let outcome = rx.await;
    channel.remove_listener(listener_id);
    outcome.map_err(|_| ProxyError::NoResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::{Channel, LocalChannel, Value, WireRequest};

    fn get(path: &str) -> Operation {
        Operation::Get {
            path: vec![path.to_string()],
        }
    }

    fn recorded_requests(channel: &ChannelRef) -> Rc<RefCell<Vec<WireRequest>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        channel.add_listener(Rc::new(move |message, _ports| {
            if let WireMessage::Request(request) = message {
                sink.borrow_mut().push(request.clone());
            }
        }));
        channel.start();
        seen
    }

    #[tokio::test]
    async fn test_response_resolves_request() {
        let (a, b) = LocalChannel::pair();
        // Echo responder: replies synchronously inside delivery.
        let replier = b.clone();
        b.add_listener(Rc::new(move |message, _ports| {
            if let WireMessage::Request(request) = message {
                let id = request.id.expect("request should carry an id");
                replier
                    .post(
                        WireMessage::response(id, WireValue::raw(Value::Int(99))),
                        vec![],
                    )
                    .expect("post response");
            }
        }));
        b.start();

        let (value, ports) = request_response(&a, get("x"), vec![])
            .await
            .expect("request should resolve");
        assert_eq!(value, WireValue::raw(Value::Int(99)));
        assert!(ports.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_responses_correlate() {
        let (a, b) = LocalChannel::pair();
        let seen = recorded_requests(&b);

        let first = request_response(&a, get("one"), vec![]);
        let second = request_response(&a, get("two"), vec![]);
        let replier = async {
            while seen.borrow().len() < 2 {
                tokio::task::yield_now().await;
            }
            // Answer in reverse arrival order.
            let requests = seen.borrow().clone();
            for request in requests.iter().rev() {
                let id = request.id.expect("request should carry an id");
                let answer = match request.op.path().first().map(String::as_str) {
                    Some("one") => Value::Int(1),
                    _ => Value::Int(2),
                };
                b.post(WireMessage::response(id, WireValue::raw(answer)), vec![])
                    .expect("post response");
            }
        };

        let (first, second, ()) = tokio::join!(first, second, replier);
        let (value, _) = first.expect("first request should resolve");
        assert_eq!(value, WireValue::raw(Value::Int(1)));
        let (value, _) = second.expect("second request should resolve");
        assert_eq!(value, WireValue::raw(Value::Int(2)));
    }

    #[tokio::test]
    async fn test_close_fails_pending_request() {
        let (a, b) = LocalChannel::pair();
        let _seen = recorded_requests(&b);

        let request = request_response(&a, get("x"), vec![]);
        let closer = async {
            tokio::task::yield_now().await;
            a.close();
        };

        let (result, ()) = tokio::join!(request, closer);
        assert!(matches!(result, Err(ProxyError::NoResponse)));
    }

    #[tokio::test]
    async fn test_post_on_closed_channel_fails_fast() {
        let (a, _b) = LocalChannel::pair();
        a.close();
        let result = request_response(&a, get("x"), vec![]).await;
        assert!(matches!(result, Err(ProxyError::Channel(_))));
    }

    #[tokio::test]
    async fn test_unrelated_response_is_ignored() {
        let (a, b) = LocalChannel::pair();
        let seen = recorded_requests(&b);

        let request = request_response(&a, get("x"), vec![]);
        let replier = async {
            while seen.borrow().is_empty() {
                tokio::task::yield_now().await;
            }
            let id = seen.borrow()[0].id.expect("request should carry an id");
            // A stray response for some other id must not resolve ours.
            b.post(
                WireMessage::response(Uid::fresh(), WireValue::raw(Value::Int(0))),
                vec![],
            )
            .expect("post stray");
            b.post(WireMessage::response(id, WireValue::raw(Value::Int(5))), vec![])
                .expect("post answer");
        };

        let (result, ()) = tokio::join!(request, replier);
        let (value, _) = result.expect("request should resolve");
        assert_eq!(value, WireValue::raw(Value::Int(5)));
    }
}
