//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{actready_home, Settings};

/// Default settings file: `~/.actready/settings.json`.
pub fn settings_path() -> PathBuf {
    actready_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
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

/// Apply overrides read through `lookup` (the process environment in production).
///
/// Values that fail to parse or fall outside their range are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = string("OPENAI_BASE_URL") {
        let v = v.trim_end_matches('/').to_string();
        settings.llm.base_url.clone_from(&v);
        settings.embeddings.base_url = v;
    }
    if let Some(v) = string("ACTREADY_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = string("ACTREADY_EMBEDDING_MODEL") {
        settings.embeddings.model = v;
    }
    if let Some(v) = string("ACTREADY_INDEX_DB") {
        settings.index.db_path = PathBuf::from(v);
    }
    if let Some(v) = string("ACTREADY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = checked(&lookup, "ACTREADY_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
    if let Some(v) = checked(&lookup, "ACTREADY_MAX_FILES", |s| parse_usize_range(s, 1, 100_000)) {
        settings.scan.max_files = v;
    }
    if let Some(v) = checked(&lookup, "ACTREADY_MAX_LINES", |s| parse_usize_range(s, 1, 100_000)) {
        settings.scan.max_lines = v;
    }
    if let Some(v) = checked(&lookup, "ACTREADY_MAX_RETRIES", |s| {
        parse_usize_range(s, 0, 10).map(|n| n as u32)
    }) {
        settings.retry.max_retries = v;
    }
}

/// API key for the model and embedding endpoints, from `OPENAI_API_KEY`.
pub fn api_key_from_env() -> Option<SecretString> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn checked<F, T>(lookup: &F, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "invalid env override, ignoring");
    }
    parsed
}

// ── Pure parsing functions ──────────────────────────────────────────

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
