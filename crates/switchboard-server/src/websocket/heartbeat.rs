//! Liveness monitoring for connected clients.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::connection::ClientHandle;

/// Ping cadence and how long a silent client is tolerated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between liveness checks (and pings).
    pub interval: Duration,
    /// Silence tolerated before the client is dropped.
    pub timeout: Duration,
}

/// Outcome of [`run_heartbeat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Client missed enough checks in a row to exceed the timeout.
    TimedOut,
    /// The handle was closed for some other reason.
    Cancelled,
}

/// Watch a client until it goes silent or its handle is closed.
///
/// Every `interval` the handle's alive flag is checked and reset; inbound
/// frames and pongs set it again. `timeout / interval` consecutive misses
/// (at least one) mean the client is gone.
pub async fn run_heartbeat(handle: Arc<ClientHandle>, config: HeartbeatConfig) -> HeartbeatResult {
    let mut check_interval = time::interval(config.interval);
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let interval_ms = config.interval.as_millis().max(1);
    let max_missed = (config.timeout.as_millis() / interval_ms).max(1);
    let mut missed: u128 = 0;

    loop {
        tokio::select! {
            biased;
            () = handle.closed() => return HeartbeatResult::Cancelled,
            _ = check_interval.tick() => {
                if handle.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
        }
    }
}
