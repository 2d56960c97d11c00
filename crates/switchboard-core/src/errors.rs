//! Routing error types.

/// Reasons a single inbound frame could not be delivered.
///
/// None of these end the sender's session; they are logged, counted and the
/// frame is discarded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    // Sender-side problems
    /// Not a JSON object, or `receiverId` is not a string.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// `receiverId` absent, `null` or empty.
    #[error("frame has no receiverId")]
    MissingReceiver,

    // Recipient-side problems
    /// Nobody is registered under the target identifier.
    #[error("recipient {0} is not connected")]
    RecipientOffline(String),
    /// Recipient's outbound queue is at capacity.
    #[error("send queue full for {0}")]
    QueueFull(String),
    /// Recipient is registered but its connection is shutting down.
    #[error("connection to {0} is closed")]
    ConnectionClosed(String),
}

impl RelayError {
    /// The sender produced something we cannot route.
    pub fn is_sender_fault(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::MissingReceiver)
    }

    /// Stable label used for the `reason` dimension of drop metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "malformed",
            Self::MissingReceiver => "missing_receiver",
            Self::RecipientOffline(_) => "recipient_offline",
            Self::QueueFull(_) => "queue_full",
            Self::ConnectionClosed(_) => "connection_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_faults() {
        assert!(RelayError::MalformedFrame("eof".into()).is_sender_fault());
        assert!(RelayError::MissingReceiver.is_sender_fault());
        assert!(!RelayError::RecipientOffline("bob".into()).is_sender_fault());
        assert!(!RelayError::QueueFull("bob".into()).is_sender_fault());
        assert!(!RelayError::ConnectionClosed("bob".into()).is_sender_fault());
    }

    #[test]
    fn error_kinds_are_distinct() {
        let kinds = [
            RelayError::MalformedFrame(String::new()).error_kind(),
            RelayError::MissingReceiver.error_kind(),
            RelayError::RecipientOffline(String::new()).error_kind(),
            RelayError::QueueFull(String::new()).error_kind(),
            RelayError::ConnectionClosed(String::new()).error_kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn display_names_recipient() {
        let err = RelayError::RecipientOffline("carol".into());
        assert_eq!(err.to_string(), "recipient carol is not connected");
    }
}
