//! Peer and connection identifiers.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Identifier a peer announces when it connects (`/ws?userId=...`).
///
/// Chosen by the peer, not the server; the only rule is that it is non-empty.
/// Also used verbatim as the routing target in `receiverId`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Returns `None` for an empty identifier.
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The identifier exactly as the peer sent it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ClientId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Server-assigned identity of one physical connection.
///
/// Two connections announcing the same [`ClientId`] always get distinct
/// connection ids, which is what lets logs tell an evicted socket apart
/// from its replacement.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Fresh `conn_`-prefixed id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The `conn_<uuid>` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn client_id_rejects_empty() {
        assert!(ClientId::parse("").is_none());
    }

    #[test]
    fn client_id_keeps_raw_value() {
        let id = ClientId::parse("alice").unwrap();
        assert_eq!(id.as_str(), "alice");
        assert_eq!(id.to_string(), "alice");
    }

    #[test]
    fn client_id_is_case_sensitive() {
        assert_ne!(ClientId::parse("Alice"), ClientId::parse("alice"));
    }

    #[test]
    fn client_id_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(ClientId::parse("bob").unwrap(), 1);
        assert_eq!(map.get("bob"), Some(&1));
        assert_eq!(map.get("carol"), None);
    }

    #[test]
    fn client_id_serde_transparent() {
        let id = ClientId::parse("alice").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice\"");
        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }
}
