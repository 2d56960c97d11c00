//! Logging and metrics setup for the switchboard relay.

mod logging;
pub mod metrics;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
    /// Install the global Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json: false,
            metrics_enabled: true,
        }
    }
}

/// Returned by [`init_telemetry`]; owns the handle `/metrics` renders from.
pub struct TelemetryGuard {
    metrics: Option<PrometheusHandle>,
}

impl TelemetryGuard {
    /// Prometheus handle, if the recorder was installed.
    pub fn metrics(&self) -> Option<&PrometheusHandle> {
        self.metrics.as_ref()
    }
}

/// Initialize logging and metrics. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter = logging::env_filter(config.log_level);

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
    {
        eprintln!("switchboard-telemetry: subscriber already installed: {e}");
    }

    let metrics = if config.metrics_enabled {
        metrics::install_recorder()
    } else {
        None
    };

    TelemetryGuard { metrics }
}
