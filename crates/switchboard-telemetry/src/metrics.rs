//! Prometheus recorder and the metric names the relay records.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Install the global Prometheus recorder.
///
/// Returns `None` (and logs) if another recorder is already installed.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("prometheus metrics recorder installed");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder");
            None
        }
    }
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections registered (counter).
pub const RELAY_CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Sessions ended (counter, labels: reason).
pub const RELAY_DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Connections replaced by a newer one with the same identifier (counter).
pub const RELAY_EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Currently registered sessions (gauge).
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Frames handed to a recipient's queue (counter).
pub const RELAY_FRAMES_FORWARDED_TOTAL: &str = "relay_frames_forwarded_total";
/// Frames discarded (counter, labels: reason).
pub const RELAY_FRAMES_DROPPED_TOTAL: &str = "relay_frames_dropped_total";
/// Connections rejected before upgrade (counter).
pub const RELAY_REJECTED_TOTAL: &str = "relay_rejected_total";
/// Session lifetime in seconds (histogram).
pub const RELAY_SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";
