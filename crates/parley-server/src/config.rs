//! Server configuration.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. If a config file exists, deep-merge its values over the defaults
//! 3. Apply `PARLEY_*` environment variable overrides
//!
//! Command-line flags are applied by the binary after this.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, ServerError};

/// Upper bound for `max_connections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 1_000_000;

/// Configuration for the chat server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `8081`, `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Whether chat broadcasts are delivered back to the sender.
    pub echo_to_sender: bool,
    /// Credential storage file.
    pub storage_path: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8081,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            echo_to_sender: true,
            storage_path: PathBuf::from(parley_auth::STORAGE_FILE_NAME),
            log_level: "info".into(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONNECTIONS_LIMIT).contains(&self.max_connections) {
            return Err(ServerError::InvalidConfig(format!(
                "max_connections must be 1..={MAX_CONNECTIONS_LIMIT}, got {}",
                self.max_connections
            )));
        }
        Ok(())
    }
}

/// Load configuration from `path` (optional) with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON or an
/// out-of-range value is an error.
pub fn load_config_from_path(path: Option<&Path>) -> Result<ServerConfig> {
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

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    config.validate()?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
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

/// Apply `PARLEY_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("PARLEY_HOST") {
        config.host = v;
    }
    if let Some(v) = env.parsed("PARLEY_PORT", |s| s.parse::<u16>().ok()) {
        config.port = v;
    }
    if let Some(v) = env.parsed("PARLEY_MAX_CONNECTIONS", |s| {
        parse_usize_range(s, 1, MAX_CONNECTIONS_LIMIT)
    }) {
        config.max_connections = v;
    }
    if let Some(v) = env.string("PARLEY_STORAGE_PATH") {
        config.storage_path = PathBuf::from(v);
    }
    if let Some(v) = env.parsed("PARLEY_ECHO_TO_SENDER", parse_bool) {
        config.echo_to_sender = v;
    }
    if let Some(v) = env.string("PARLEY_LOG_LEVEL") {
        config.log_level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
