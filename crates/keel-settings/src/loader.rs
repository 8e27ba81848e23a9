//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`KeelSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `KEEL_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::KeelSettings;

/// Resolve the path to the settings file (`~/.keel/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".keel").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<KeelSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<KeelSettings> {
    load_settings_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings, reading overrides through `env` instead of the process
/// environment.
pub fn load_settings_with_env<F>(path: &Path, env: F) -> Result<KeelSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(KeelSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: KeelSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `env`.
///
/// Integers must parse and fall within range, booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut KeelSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup: env };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("KEEL_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("KEEL_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("KEEL_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("KEEL_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("KEEL_HEARTBEAT_TIMEOUT_MS", 100, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }

    // ── Provisioner ─────────────────────────────────────────────────
    if let Some(v) = env.string("KEEL_PROVISIONER_ENDPOINT") {
        settings.provisioner.endpoint = v;
    }
    if let Some(v) = env.u64("KEEL_PROVISIONER_CONNECT_TIMEOUT_MS", 1, 600_000) {
        settings.provisioner.connect_timeout_ms = v;
    }

    // ── Bridge ──────────────────────────────────────────────────────
    if let Some(v) = env.u64("KEEL_DRAIN_TIMEOUT_MS", 1, 600_000) {
        settings.bridge.drain_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("KEEL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("KEEL_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject settings that cannot run.
pub fn validate(settings: &KeelSettings) -> Result<()> {
    if settings.server.max_connections == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxConnections must be > 0".to_string(),
        ));
    }
    if settings.server.heartbeat_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalMs must be > 0".to_string(),
        ));
    }
    if settings.server.heartbeat_timeout_ms < settings.server.heartbeat_interval_ms {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatTimeoutMs must be >= server.heartbeatIntervalMs".to_string(),
        ));
    }
    if settings.bridge.drain_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "bridge.drainTimeoutMs must be > 0".to_string(),
        ));
    }
    if settings.provisioner.endpoint.is_empty() {
        return Err(SettingsError::InvalidValue(
            "provisioner.endpoint must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

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

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
