//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CodotSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `CODOT_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use codot_core::logging::LogLevel;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::CodotSettings;

/// Resolve the default settings file (`~/.codot/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".codot").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CodotSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an out-of-range value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<CodotSettings> {
    let defaults = serde_json::to_value(CodotSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CodotSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
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

/// Apply `CODOT_*` environment variable overrides.
///
/// Integers must parse and fall inside the accepted range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Anything else is logged
/// and ignored.
pub fn apply_env_overrides(settings: &mut CodotSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

fn apply_overrides_from(settings: &mut CodotSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CODOT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("CODOT_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("CODOT_MAX_CONNECTIONS", 1, 10_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("CODOT_HANDLER_TIMEOUT_MS", 100, 3_600_000) {
        settings.server.handler_timeout_ms = v;
    }

    // ── Events ──────────────────────────────────────────────────────
    if let Some(v) = env.usize("CODOT_EVENT_QUEUE_CAPACITY", 1, 1_000_000) {
        settings.events.queue_capacity = v;
    }
    if let Some(v) = env.bool("CODOT_CLEAR_ON_DISCONNECT") {
        settings.events.clear_on_disconnect = v;
    }

    // ── Debugger ────────────────────────────────────────────────────
    if let Some(v) = env.usize("CODOT_LOG_CAPACITY", 1, 1_000_000) {
        settings.debugger.log_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CODOT_LOG_LEVEL") {
        match v.parse::<LogLevel>() {
            Ok(level) => settings.logging.level = level,
            Err(_) => tracing::warn!(key = "CODOT_LOG_LEVEL", value = %v, "invalid log level env var, ignoring"),
        }
    }
    if let Some(v) = env.bool("CODOT_LOG_JSON") {
        settings.logging.json = v;
    }
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
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
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

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
