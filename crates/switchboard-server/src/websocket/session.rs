//! WebSocket session lifecycle: registration, the read loop that feeds the
//! router, the writer task, and teardown.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use switchboard_telemetry::metrics::{
    RELAY_CONNECTIONS_ACTIVE, RELAY_CONNECTIONS_TOTAL, RELAY_DISCONNECTIONS_TOTAL,
    RELAY_EVICTIONS_TOTAL, RELAY_SESSION_DURATION_SECONDS,
};
use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use super::connection::{ClientHandle, CloseReason};
use crate::registry::Registry;
use crate::router;

/// Inbound traffic as the session loop sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// A frame to route.
    Text(Utf8Bytes),
    /// Binary payloads are not routed; only the size is kept for logging.
    Binary(usize),
    /// Control frame; counts as liveness only.
    Ping,
    /// Control frame; counts as liveness only.
    Pong,
    /// Peer started the closing handshake.
    Close,
}

impl From<Message> for InboundFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text),
            Message::Binary(data) => Self::Binary(data.len()),
            Message::Ping(_) => Self::Ping,
            Message::Pong(_) => Self::Pong,
            Message::Close(_) => Self::Close,
        }
    }
}

/// Run one client session to completion.
///
/// 1. Registers `handle`, closing any connection it replaces
/// 2. Routes each inbound text frame until the peer leaves, the stream
///    errors, or the handle is closed from elsewhere
/// 3. Closes the handle, then deregisters it (only if still current)
///
/// Returns why the session ended.
#[instrument(skip_all, fields(client_id = %handle.client_id(), conn_id = %handle.conn_id()))]
pub async fn run_session<S, E>(handle: Arc<ClientHandle>, registry: Arc<Registry>, mut inbound: S) -> CloseReason
where
    S: Stream<Item = Result<InboundFrame, E>> + Unpin,
    E: Display,
{
    if let Some(previous) = registry.register(handle.clone()) {
        info!(evicted_conn_id = %previous.conn_id(), "replacing existing connection");
        counter!(RELAY_EVICTIONS_TOTAL).increment(1);
        previous.close(CloseReason::Evicted);
    }
    info!("client connected");
    counter!(RELAY_CONNECTIONS_TOTAL).increment(1);
    gauge!(RELAY_CONNECTIONS_ACTIVE).increment(1.0);

    let reason = loop {
        tokio::select! {
            biased;
            () = handle.closed() => {
                break handle.close_reason().unwrap_or(CloseReason::Shutdown);
            }
            next = inbound.next() => match next {
                Some(Ok(frame)) => {
                    handle.mark_alive();
                    match frame {
                        InboundFrame::Text(text) => router::dispatch(&registry, handle.client_id(), &text),
                        InboundFrame::Binary(len) => {
                            debug!(bytes = len, "binary frame ignored");
                        }
                        InboundFrame::Ping | InboundFrame::Pong => trace!("keepalive received"),
                        InboundFrame::Close => break CloseReason::PeerClosed,
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break CloseReason::ReadError;
                }
                None => break CloseReason::PeerClosed,
            },
        }
    };

    // Teardown runs exactly once: close first so concurrent forwards fail
    // fast, then drop the registry entry if it is still ours.
    handle.close(reason);
    let reason = handle.close_reason().unwrap_or(reason);
    let removed = registry.unregister(&handle);

    info!(
        reason = reason.as_str(),
        deregistered = removed,
        age_secs = handle.age().as_secs(),
        dropped_frames = handle.drop_count(),
        "client disconnected"
    );
    counter!(RELAY_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(RELAY_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(RELAY_SESSION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    reason
}

/// Upper bound on the close handshake once a handle is closed. A peer that
/// stopped reading must not keep the socket open.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Result of one socket write raced against the handle's close signal.
enum WriteOutcome {
    Sent,
    Failed,
    Interrupted,
}

/// Drain a client's outbound queue into its socket.
///
/// The only task that writes to the socket. Sends a ping every
/// `ping_interval` when set. Every write is abandoned as soon as the handle
/// is closed; the close frame for the recorded reason (if any) is then sent
/// within [`CLOSE_GRACE`] and the sink is dropped.
pub async fn run_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Utf8Bytes>,
    handle: Arc<ClientHandle>,
    ping_interval: Option<Duration>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = ping_interval.map(|period| {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let outcome = tokio::select! {
            biased;
            () = handle.closed() => WriteOutcome::Interrupted,
            msg = rx.recv() => match msg {
                Some(text) => write_frame(&mut sink, Message::Text(text), &handle).await,
                None => WriteOutcome::Failed,
            },
            () = next_tick(&mut ping) => {
                let outcome = write_frame(&mut sink, Message::Ping(vec![].into()), &handle).await;
                if matches!(outcome, WriteOutcome::Sent) {
                    trace!(client_id = %handle.client_id(), "ping sent");
                }
                outcome
            }
        };
        match outcome {
            WriteOutcome::Sent => {}
            WriteOutcome::Failed | WriteOutcome::Interrupted => break,
        }
    }

    if let Some(frame) = handle.close_reason().and_then(CloseReason::close_frame) {
        match time::timeout(CLOSE_GRACE, sink.send(Message::Close(Some(frame)))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "failed to send close frame"),
            Err(_) => debug!(client_id = %handle.client_id(), "close frame not accepted in time"),
        }
    }
    if time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        debug!(client_id = %handle.client_id(), "sink did not close in time, dropping");
    }
}

async fn write_frame<S>(sink: &mut S, msg: Message, handle: &ClientHandle) -> WriteOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    tokio::select! {
        biased;
        () = handle.closed() => WriteOutcome::Interrupted,
        res = sink.send(msg) => match res {
            Ok(()) => WriteOutcome::Sent,
            Err(e) => {
                debug!(client_id = %handle.client_id(), error = %e, "websocket write failed");
                WriteOutcome::Failed
            }
        },
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
