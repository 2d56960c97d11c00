//! Configuration loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. If a config file is given and exists, deep-merge its values over defaults
//! 3. Apply `SWITCHBOARD_*` environment variable overrides
//!
//! CLI flags are applied by the binary on top of the result.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::errors::Result;

/// Load configuration from an optional file, then apply env overrides.
///
/// A missing file yields defaults. Unreadable or invalid JSON is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let mut config = load_config_file(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_config_file(path: Option<&Path>) -> Result<ServerConfig> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "config file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SWITCHBOARD_*` environment variables to `config`.
pub fn apply_env_overrides(config: &mut ServerConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Apply overrides from any variable source. Invalid values are logged and
/// ignored, leaving the file/default value in place.
pub fn apply_overrides_from(config: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let invalid = |name: &str, value: &str| {
        warn!(key = name, value = %value, "invalid env var, ignoring");
    };

    if let Some(v) = read("SWITCHBOARD_HOST") {
        config.host = v;
    }
    if let Some(v) = read("SWITCHBOARD_PORT") {
        match parse_u16_range(&v, 0, 65535) {
            Some(port) => config.port = port,
            None => invalid("SWITCHBOARD_PORT", &v),
        }
    }
    if let Some(v) = read("SWITCHBOARD_SEND_QUEUE") {
        match parse_u64_range(&v, 1, 1_000_000) {
            Some(n) => config.send_queue_capacity = usize::try_from(n).unwrap_or(usize::MAX),
            None => invalid("SWITCHBOARD_SEND_QUEUE", &v),
        }
    }
    if let Some(v) = read("SWITCHBOARD_HEARTBEAT_INTERVAL") {
        match parse_u64_range(&v, 0, 3600) {
            Some(n) => config.heartbeat_interval_secs = n,
            None => invalid("SWITCHBOARD_HEARTBEAT_INTERVAL", &v),
        }
    }
    if let Some(v) = read("SWITCHBOARD_HEARTBEAT_TIMEOUT") {
        match parse_u64_range(&v, 1, 86_400) {
            Some(n) => config.heartbeat_timeout_secs = n,
            None => invalid("SWITCHBOARD_HEARTBEAT_TIMEOUT", &v),
        }
    }
    if let Some(v) = read("SWITCHBOARD_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = read("SWITCHBOARD_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => config.log_json = b,
            None => invalid("SWITCHBOARD_LOG_JSON", &v),
        }
    }
    if let Some(v) = read("SWITCHBOARD_METRICS") {
        match parse_bool(&v) {
            Some(b) => config.metrics_enabled = b,
            None => invalid("SWITCHBOARD_METRICS", &v),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within `min..=max`, ignoring surrounding whitespace.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `u64` within `min..=max`, ignoring surrounding whitespace.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
