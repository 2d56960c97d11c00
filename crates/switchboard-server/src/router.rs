//! Fire-and-forget delivery of one inbound text frame.

use axum::extract::ws::Utf8Bytes;
use metrics::counter;
use switchboard_core::{extract_receiver, ClientId, RelayError};
use switchboard_telemetry::metrics::{RELAY_FRAMES_DROPPED_TOTAL, RELAY_FRAMES_FORWARDED_TOTAL};
use tracing::{debug, warn};

use crate::registry::Registry;

/// Deliver `frame` to the client named by its `receiverId`.
///
/// The frame is forwarded exactly as received. On success the recipient's
/// identifier is returned. The registry lock is released before the frame
/// is queued.
pub fn route_frame(registry: &Registry, frame: &Utf8Bytes) -> Result<ClientId, RelayError> {
    let receiver = extract_receiver(frame.as_str())?;
    let target = registry
        .lookup(receiver.as_str())
        .ok_or_else(|| RelayError::RecipientOffline(receiver.to_string()))?;
    target.send(frame.clone())?;
    Ok(receiver)
}

/// [`route_frame`] plus logging and metrics. Failures never propagate: the
/// sender gets no acknowledgement either way.
pub fn dispatch(registry: &Registry, sender: &ClientId, frame: &Utf8Bytes) {
    match route_frame(registry, frame) {
        Ok(receiver) => {
            counter!(RELAY_FRAMES_FORWARDED_TOTAL).increment(1);
            debug!(
                sender_id = %sender,
                receiver_id = %receiver,
                bytes = frame.as_str().len(),
                "frame forwarded"
            );
        }
        Err(err) => {
            counter!(RELAY_FRAMES_DROPPED_TOTAL, "reason" => err.error_kind()).increment(1);
            match &err {
                RelayError::RecipientOffline(receiver) => {
                    debug!(sender_id = %sender, receiver_id = %receiver, "recipient not connected, frame dropped");
                }
                _ if err.is_sender_fault() => {
                    warn!(sender_id = %sender, error = %err, "unroutable frame dropped");
                }
                _ => {
                    warn!(sender_id = %sender, error = %err, "delivery failed, frame dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::{ClientHandle, CloseReason};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn connect(
        registry: &Registry,
        id: &str,
        capacity: usize,
    ) -> (Arc<ClientHandle>, mpsc::Receiver<Utf8Bytes>) {
        let (handle, rx) =
            ClientHandle::channel(ClientId::parse(id).unwrap(), capacity, &CancellationToken::new());
        let _ = registry.register(handle.clone());
        (handle, rx)
    }

    #[test]
    fn forwards_verbatim() {
        let registry = Registry::new();
        let (_bob, mut bob_rx) = connect(&registry, "bob", 4);

        let raw = r#"{"type":"offer","senderId":"alice","receiverId":"bob","offer":{"sdp":"v=0\r\n"},"x":[1, 2]}"#;
        let frame = Utf8Bytes::from(raw);
        let receiver = route_frame(&registry, &frame).unwrap();

        assert_eq!(receiver.as_str(), "bob");
        assert_eq!(bob_rx.try_recv().unwrap().as_str(), raw);
    }

    #[test]
    fn unknown_recipient() {
        let registry = Registry::new();
        let frame = Utf8Bytes::from(r#"{"receiverId":"carol"}"#);
        let err = route_frame(&registry, &frame).unwrap_err();
        assert_eq!(err, RelayError::RecipientOffline("carol".into()));
    }

    #[test]
    fn malformed_frame_not_delivered() {
        let registry = Registry::new();
        let (_bob, mut bob_rx) = connect(&registry, "bob", 4);

        let err = route_frame(&registry, &Utf8Bytes::from("{bob")).unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn missing_receiver() {
        let registry = Registry::new();
        let err = route_frame(&registry, &Utf8Bytes::from(r#"{"type":"offer"}"#)).unwrap_err();
        assert_eq!(err, RelayError::MissingReceiver);
    }

    #[test]
    fn full_queue_drops() {
        let registry = Registry::new();
        let (_bob, mut bob_rx) = connect(&registry, "bob", 1);
        let first = Utf8Bytes::from(r#"{"receiverId":"bob","n":1}"#);
        let second = Utf8Bytes::from(r#"{"receiverId":"bob","n":2}"#);

        let _ = route_frame(&registry, &first).unwrap();
        let err = route_frame(&registry, &second).unwrap_err();
        assert!(matches!(err, RelayError::QueueFull(_)));
        assert_eq!(bob_rx.try_recv().unwrap(), first);
    }

    #[test]
    fn closed_recipient() {
        let registry = Registry::new();
        let (bob, _bob_rx) = connect(&registry, "bob", 4);
        bob.close(CloseReason::PeerClosed);

        let err = route_frame(&registry, &Utf8Bytes::from(r#"{"receiverId":"bob"}"#)).unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed(_)));
    }

    #[test]
    fn routes_to_newest_connection() {
        let registry = Registry::new();
        let (_old, mut old_rx) = connect(&registry, "bob", 4);
        let (_new, mut new_rx) = connect(&registry, "bob", 4);

        let _ = route_frame(&registry, &Utf8Bytes::from(r#"{"receiverId":"bob"}"#)).unwrap();
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());
    }

    #[test]
    fn dispatch_swallows_errors() {
        let registry = Registry::new();
        let alice = ClientId::parse("alice").unwrap();
        dispatch(&registry, &alice, &Utf8Bytes::from("garbage"));
        dispatch(&registry, &alice, &Utf8Bytes::from(r#"{"receiverId":"nobody"}"#));
    }

    #[test]
    fn self_addressed_frame_loops_back() {
        let registry = Registry::new();
        let (_alice, mut alice_rx) = connect(&registry, "alice", 4);
        let _ = route_frame(&registry, &Utf8Bytes::from(r#"{"receiverId":"alice"}"#)).unwrap();
        assert!(alice_rx.try_recv().is_ok());
    }
}
