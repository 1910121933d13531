//! Loading [`Settings`] from files and the environment.
//!
//! ## Loading order
//!
//! 1. Pick the environment: the file's `environment` key, else `development`.
//! 2. Start from [`Settings::for_environment`].
//! 3. Merge the TOML or JSON document over it.
//! 4. Apply `ORMLABS_*` environment variables (highest priority).
//!
//! | Env Var | Setting |
//! |---|---|
//! | `ORMLABS_ENV` | `environment` (`development` or `production`) |
//! | `ORMLABS_DEBUG` | `debug` |
//! | `ORMLABS_LOG_LEVEL` | `log_level` |
//! | `ORMLABS_RECORD_QUERIES` | `record_queries` |
//! | `ORMLABS_DB_NAME` | `databases.default.name` |

use std::path::Path;

use crate::error::{LabsError, LabsResult};
use crate::settings::{Environment, Settings};

/// Parses settings from a TOML document.
pub fn from_toml_str(toml_str: &str) -> LabsResult<Settings> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| LabsError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    from_json_value(toml_to_json(toml_value))
}

/// Parses settings from a JSON document.
pub fn from_json_str(json_str: &str) -> LabsResult<Settings> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| LabsError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    from_json_value(json_value)
}

/// Reads a settings file, choosing the format from its extension
/// (`.json` is JSON, anything else is TOML).
pub fn from_file(path: impl AsRef<Path>) -> LabsResult<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        LabsError::ConfigurationError(format!(
            "Failed to read settings file '{}': {e}",
            path.display()
        ))
    })?;
    if path.extension().is_some_and(|ext| ext == "json") {
        from_json_str(&content)
    } else {
        from_toml_str(&content)
    }
}

/// Loads settings from an optional file and then applies environment overrides.
///
/// Without a file, the environment variables alone decide.
pub fn load(path: Option<&Path>) -> LabsResult<Settings> {
    let mut settings = match path {
        Some(path) => from_file(path)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings)?;
    tracing::debug!(
        environment = %settings.environment,
        debug = settings.debug,
        "settings loaded"
    );
    Ok(settings)
}

/// Applies `ORMLABS_*` variables from the process environment.
pub fn apply_env_overrides(settings: &mut Settings) -> LabsResult<()> {
    apply_overrides_from(settings, |key| std::env::var(key).ok())
}

/// Applies overrides read through `lookup`.
///
/// Switching the environment resets the environment-derived defaults
/// (`debug`, `log_level`, `record_queries`) before the remaining variables are
/// applied.
pub fn apply_overrides_from(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> LabsResult<()> {
    if let Some(val) = lookup("ORMLABS_ENV") {
        let environment: Environment = val.parse()?;
        if environment != settings.environment {
            let defaults = Settings::for_environment(environment);
            settings.environment = environment;
            settings.debug = defaults.debug;
            settings.log_level = defaults.log_level;
            settings.record_queries = defaults.record_queries;
        }
    }

    if let Some(val) = lookup("ORMLABS_DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Some(val) = lookup("ORMLABS_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("ORMLABS_RECORD_QUERIES") {
        settings.record_queries = parse_flag(&val);
    }

    if let Some(val) = lookup("ORMLABS_DB_NAME") {
        settings
            .databases
            .entry("default".to_string())
            .or_default()
            .name = val;
    }

    Ok(())
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Merges a parsed document over the defaults of the environment it names.
fn from_json_value(value: serde_json::Value) -> LabsResult<Settings> {
    let environment = match value.get("environment").and_then(serde_json::Value::as_str) {
        Some(name) => name.parse()?,
        None => Environment::default(),
    };
    let defaults = serde_json::to_value(Settings::for_environment(environment)).map_err(|e| {
        LabsError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;
    serde_json::from_value(merge_json(defaults, value))
        .map_err(|e| LabsError::ConfigurationError(format!("Invalid settings: {e}")))
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges objects; anything else in `overlay` replaces `base`.
fn merge_json(base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    match (base, overlay) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_v) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, overlay_v),
                    None => overlay_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
