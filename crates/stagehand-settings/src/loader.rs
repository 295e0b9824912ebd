//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WorkerSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `STAGEHAND_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::WorkerSettings;

/// Resolve the path to the settings file (`~/.stagehand/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".stagehand").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WorkerSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`WorkerSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WorkerSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<WorkerSettings> {
    let defaults = serde_json::to_value(WorkerSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WorkerSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
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

/// Apply `STAGEHAND_*` environment overrides to loaded settings.
///
/// Values that fail to parse or fall outside their range are logged and
/// ignored, leaving the file or default value in place.
pub fn apply_env_overrides(settings: &mut WorkerSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

fn apply_overrides(settings: &mut WorkerSettings, env: impl Fn(&str) -> Option<String>) {
    let env = EnvReader(env);

    if let Some(v) = env.string("STAGEHAND_NAME") {
        settings.name = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("STAGEHAND_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("STAGEHAND_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("STAGEHAND_MAX_MESSAGE_SIZE", 1024, 1_073_741_824) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.u64("STAGEHAND_SHUTDOWN_TIMEOUT_MS", 0, 600_000) {
        settings.server.shutdown_timeout_ms = v;
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.usize("STAGEHAND_INBOUND_CAPACITY", 1, 65_536) {
        settings.connection.inbound_capacity = v;
    }
    if let Some(v) = env.usize("STAGEHAND_OUTBOUND_CAPACITY", 1, 65_536) {
        settings.connection.outbound_capacity = v;
    }
    if let Some(v) = env.u64("STAGEHAND_RECEIVER_DRAIN_TIMEOUT_MS", 0, 60_000) {
        settings.connection.receiver_drain_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("STAGEHAND_LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
    if let Some(v) = env.bool("STAGEHAND_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Rules ───────────────────────────────────────────────────────
    if let Some(v) = env.string("STAGEHAND_RULES_PATH") {
        settings.rules.path = Some(v);
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

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.0)(name)?;
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
