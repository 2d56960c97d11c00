//! Handle to one live client connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Utf8Bytes};
use parking_lot::Mutex;
use switchboard_core::{ClientId, ConnectionId, RelayError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Close code sent to a connection replaced by a newer one.
pub const CLOSE_EVICTED: u16 = 4000;
/// Close code sent to a connection that stopped answering pings.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4001;
/// "Going away".
pub const CLOSE_SHUTDOWN: u16 = 1001;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the socket failed.
    ReadError,
    /// A newer connection registered under the same identifier.
    Evicted,
    /// No inbound traffic for longer than the heartbeat timeout.
    HeartbeatTimeout,
    /// Server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadError => "read_error",
            Self::Evicted => "evicted",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }

    /// Close frame the server sends for this reason, if any. Peer-initiated
    /// endings get none; the socket is already gone or closing.
    pub fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            Self::PeerClosed | Self::ReadError => return None,
            Self::Evicted => (CLOSE_EVICTED, "replaced by newer connection"),
            Self::HeartbeatTimeout => (CLOSE_HEARTBEAT_TIMEOUT, "heartbeat timeout"),
            Self::Shutdown => (CLOSE_SHUTDOWN, "server shutting down"),
        };
        Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })
    }
}

/// Everything other tasks need to reach one connected client.
///
/// Frames are queued on a bounded channel drained by the connection's
/// writer task, so any number of senders may forward concurrently while the
/// socket itself only ever has one writer.
pub struct ClientHandle {
    client_id: ClientId,
    conn_id: ConnectionId,
    tx: mpsc::Sender<Utf8Bytes>,
    cancel: CancellationToken,
    close_reason: Mutex<Option<CloseReason>>,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_frames: AtomicU64,
}

impl ClientHandle {
    /// Create a handle plus the receiving end its writer task drains.
    ///
    /// The handle's close signal is a child of `parent`, so cancelling
    /// `parent` (server shutdown) closes every handle derived from it.
    pub fn channel(
        client_id: ClientId,
        capacity: usize,
        parent: &CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let handle = Self {
            client_id,
            conn_id: ConnectionId::new(),
            tx,
            cancel: parent.child_token(),
            close_reason: Mutex::new(None),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        };
        (Arc::new(handle), rx)
    }

    /// Identifier the peer connected with.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Server-assigned id of this socket.
    pub fn conn_id(&self) -> &ConnectionId {
        &self.conn_id
    }

    /// Queue a frame for delivery. Never blocks.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed(self.client_id.to_string()));
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::QueueFull(self.client_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::ConnectionClosed(self.client_id.to_string()))
            }
        }
    }

    /// Close the connection. Idempotent; the first reason wins.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() && !self.cancel.is_cancelled() {
                *slot = Some(reason);
            }
        }
        self.cancel.cancel();
    }

    /// Whether the connection has been told to close.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called or the parent
    /// token was cancelled.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Reason recorded at close time. A handle closed through its parent
    /// token reports [`CloseReason::Shutdown`].
    pub fn close_reason(&self) -> Option<CloseReason> {
        let recorded = *self.close_reason.lock();
        recorded.or_else(|| self.is_closed().then_some(CloseReason::Shutdown))
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("client_id", &self.client_id)
            .field("conn_id", &self.conn_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
