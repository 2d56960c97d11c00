//! Signaling wire format.

use std::fmt;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::RelayError;
use crate::ids::ClientId;

/// Conventional `type` values exchanged by call peers. The relay never
/// inspects them; they exist for clients and tests.
pub mod kinds {
    /// SDP offer.
    pub const OFFER: &str = "offer";
    /// SDP answer.
    pub const ANSWER: &str = "answer";
    /// Trickled ICE candidate.
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    /// Call ended.
    pub const HANGUP: &str = "hangup";
}

/// Signaling envelope as peers write it.
///
/// The relay only ever reads `receiverId` (see [`extract_receiver`]) and
/// forwards the original text, so unknown top-level fields such as `offer`
/// or `candidate` survive in `extra` and on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingMessage {
    /// Message type, e.g. [`kinds::OFFER`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Informational; never checked against the sending connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Routing target.
    pub receiver_id: String,
    /// Opaque body (SDP, candidate, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignalingMessage {
    /// Envelope from `sender` to `receiver` with no payload.
    pub fn new(kind: impl Into<String>, sender: &ClientId, receiver: &ClientId) -> Self {
        Self {
            kind: kind.into(),
            sender_id: Some(sender.to_string()),
            receiver_id: receiver.to_string(),
            payload: None,
            extra: Map::new(),
        }
    }

    /// Set the `payload` field.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach an extra top-level field, e.g. `offer` or `candidate`.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.extra.insert(key.into(), value);
        self
    }

    /// Serialize to the text that goes on the wire.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Only the routing key is decoded; everything else in the frame is skipped.
struct RoutingHeader {
    receiver_id: Option<String>,
}

impl<'de> Deserialize<'de> for RoutingHeader {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = RoutingHeader;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            // A repeated `receiverId` key overrides earlier ones; a later
            // `null` leaves the earlier value in place.
            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RoutingHeader, A::Error> {
                let mut receiver_id = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "receiverId" {
                        if let Some(value) = map.next_value::<Option<String>>()? {
                            receiver_id = Some(value);
                        }
                    } else {
                        let _: IgnoredAny = map.next_value()?;
                    }
                }
                Ok(RoutingHeader { receiver_id })
            }
        }

        deserializer.deserialize_map(HeaderVisitor)
    }
}

/// Pull `receiverId` out of a text frame without touching the rest of it.
pub fn extract_receiver(frame: &str) -> Result<ClientId, RelayError> {
    let header: RoutingHeader =
        serde_json::from_str(frame).map_err(|e| RelayError::MalformedFrame(e.to_string()))?;
    header
        .receiver_id
        .and_then(ClientId::parse)
        .ok_or(RelayError::MissingReceiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> ClientId {
        ClientId::parse(s).unwrap()
    }

    #[test]
    fn extracts_receiver() {
        let frame = r#"{"type":"offer","senderId":"alice","receiverId":"bob","payload":{"sdp":"v=0"}}"#;
        assert_eq!(extract_receiver(frame).unwrap(), id("bob"));
    }

    #[test]
    fn ignores_unknown_fields() {
        let frame = r#"{"receiverId":"bob","candidate":{"sdpMid":"0"},"nested":[1,2,{"x":null}]}"#;
        assert_eq!(extract_receiver(frame).unwrap(), id("bob"));
    }

    #[test]
    fn leading_whitespace_is_fine() {
        assert_eq!(extract_receiver("  \n{\"receiverId\":\"bob\"}").unwrap(), id("bob"));
    }

    #[test]
    fn missing_receiver() {
        let err = extract_receiver(r#"{"type":"offer"}"#).unwrap_err();
        assert_eq!(err, RelayError::MissingReceiver);
    }

    #[test]
    fn empty_receiver() {
        let err = extract_receiver(r#"{"receiverId":""}"#).unwrap_err();
        assert_eq!(err, RelayError::MissingReceiver);
    }

    #[test]
    fn null_receiver() {
        let err = extract_receiver(r#"{"receiverId":null}"#).unwrap_err();
        assert_eq!(err, RelayError::MissingReceiver);
    }

    #[test]
    fn non_string_receiver_is_malformed() {
        let err = extract_receiver(r#"{"receiverId":42}"#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)), "got: {err:?}");
    }

    #[test]
    fn not_json_is_malformed() {
        let err = extract_receiver("hello bob").unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));
    }

    #[test]
    fn truncated_json_is_malformed() {
        let err = extract_receiver(r#"{"receiverId":"bob""#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));
    }

    #[test]
    fn duplicate_receiver_last_wins() {
        let frame = r#"{"receiverId":"bob","type":"offer","receiverId":"carol"}"#;
        assert_eq!(extract_receiver(frame).unwrap(), id("carol"));
    }

    #[test]
    fn duplicate_receiver_null_keeps_earlier() {
        let frame = r#"{"receiverId":"bob","receiverId":null}"#;
        assert_eq!(extract_receiver(frame).unwrap(), id("bob"));
    }

    #[test]
    fn array_is_malformed() {
        let err = extract_receiver(r#"["bob"]"#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));
    }

    #[test]
    fn null_document_is_malformed() {
        let err = extract_receiver("null").unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));
    }

    #[test]
    fn message_keeps_extra_fields() {
        let msg = SignalingMessage::new(kinds::OFFER, &id("alice"), &id("bob"))
            .with_field("offer", json!({"type": "offer", "sdp": "v=0"}));
        let value: Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(value["type"], "offer");
        assert_eq!(value["senderId"], "alice");
        assert_eq!(value["receiverId"], "bob");
        assert_eq!(value["offer"]["sdp"], "v=0");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn message_parses_frontend_shape() {
        let raw = r#"{"type":"ice-candidate","senderId":"bob","receiverId":"alice","candidate":{"candidate":"a=1"}}"#;
        let msg: SignalingMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind, kinds::ICE_CANDIDATE);
        assert_eq!(msg.sender_id.as_deref(), Some("bob"));
        assert!(msg.extra.contains_key("candidate"));
    }

    #[test]
    fn built_frame_routes_to_receiver() {
        let frame = SignalingMessage::new(kinds::HANGUP, &id("alice"), &id("bob"))
            .with_payload(json!({"reason": "busy"}))
            .to_frame()
            .unwrap();
        assert_eq!(extract_receiver(&frame).unwrap(), id("bob"));
    }
}
