//! Settings loading with deep merge and environment variable overrides.
//!
//! 1. Start with compiled [`PlanwrightSettings::default()`]
//! 2. If the settings file exists, deep-merge it over the defaults
//! 3. Apply `PLANWRIGHT_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{PlanwrightSettings, SessionBackend};

/// `~/.planwright`, or `/tmp/.planwright` when `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".planwright")
}

/// Load `{default data dir}/settings.json` with env overrides.
pub fn load_settings() -> Result<PlanwrightSettings> {
    load_settings_from_path(&default_data_dir().join("settings.json"))
}

/// Load settings from a specific path with env overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PlanwrightSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<PlanwrightSettings> {
    let defaults = serde_json::to_value(PlanwrightSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

fn validate(settings: &PlanwrightSettings) -> Result<()> {
    if settings.generation.timeout_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "generation.timeoutSecs must be non-zero".into(),
        ));
    }
    if settings.packaging.sweep_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "packaging.sweepIntervalSecs must be non-zero".into(),
        ));
    }
    Ok(())
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key; arrays and primitives are replaced; nulls in
/// `source` are skipped.
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

/// Apply environment overrides. Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut PlanwrightSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Override logic over an arbitrary lookup, so it can be tested without
/// touching the process environment.
fn apply_overrides(settings: &mut PlanwrightSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("PLANWRIGHT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_typed(&string, "PLANWRIGHT_PORT", |v| parse_u16_range(v, 1, 65535)) {
        settings.server.port = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = string("PLANWRIGHT_DATA_DIR") {
        settings.storage.data_dir = v;
    }
    if let Some(v) = read_typed(&string, "PLANWRIGHT_SESSION_BACKEND", parse_backend) {
        settings.storage.session_backend = v;
    }
    if let Some(v) = string("PLANWRIGHT_ASSETS_DIR") {
        settings.assets.root = v;
    }

    // ── Generation ──────────────────────────────────────────────────
    if let Some(v) = string("PLANWRIGHT_MODEL") {
        settings.generation.model = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("PLANWRIGHT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_typed(&string, "PLANWRIGHT_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

fn read_typed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_backend(val: &str) -> Option<SessionBackend> {
    match val.to_lowercase().as_str() {
        "sqlite" | "db" | "database" => Some(SessionBackend::Sqlite),
        "files" | "file" | "json" => Some(SessionBackend::Files),
        _ => None,
    }
}
