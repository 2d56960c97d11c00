use tracing::Level;
use tracing_subscriber::EnvFilter;

/// `EnvFilter` directive for a bare level, e.g. `info`.
pub(crate) fn level_directive(level: Level) -> String {
    level.as_str().to_lowercase()
}

/// `RUST_LOG` if set and valid, otherwise `level`.
pub(crate) fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_directive(level)))
}
