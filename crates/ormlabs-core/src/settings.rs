//! Project settings.
//!
//! [`Settings`] holds everything the labs need to know at startup: which
//! environment they run in, how loud logging is, whether queries are recorded,
//! and where data lives. [`SETTINGS`] is a set-once global copy for code that
//! cannot thread a reference through.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::LabsError;

/// The deployment environment selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: debug on, every query recorded.
    #[default]
    Development,
    /// Production: debug off, query recording off.
    Production,
}

impl Environment {
    /// Returns the lowercase name used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = LabsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(LabsError::ConfigurationError(format!(
                "Expected environment value: [development, production], <{other}> found."
            ))),
        }
    }
}

/// Connection settings for one database alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The backend name (e.g. "memory", "postgresql").
    pub engine: String,
    /// The database name.
    pub name: String,
    /// Host for networked engines.
    pub host: String,
    /// Port for networked engines; 0 means the engine default.
    pub port: u16,
    /// The database user.
    pub user: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "memory".to_string(),
            name: "labs".to_string(),
            host: String::new(),
            port: 0,
            user: String::new(),
        }
    }
}

/// The complete set of project settings.
///
/// # Examples
///
/// ```
/// use ormlabs_core::settings::{Environment, Settings};
///
/// let settings = Settings::default();
/// assert_eq!(settings.environment, Environment::Development);
/// assert!(settings.record_queries);
///
/// let prod = Settings::for_environment(Environment::Production);
/// assert!(!prod.debug);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// The environment these settings were built for.
    pub environment: Environment,
    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The log filter directive (e.g. "debug", "info", "ormlabs=trace").
    pub log_level: String,
    /// Whether the data layer keeps a log of executed queries.
    pub record_queries: bool,
    /// Database configurations keyed by alias ("default").
    pub databases: HashMap<String, DatabaseSettings>,
    /// Installed application labels.
    pub installed_apps: Vec<String>,
    /// Settings that have no dedicated field.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl Settings {
    /// Builds the default settings for `environment`.
    pub fn for_environment(environment: Environment) -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        let production = environment == Environment::Production;
        Self {
            environment,
            debug: !production,
            log_level: if production { "warn" } else { "debug" }.to_string(),
            record_queries: !production,
            databases,
            installed_apps: vec!["labs".to_string()],
            extra: HashMap::new(),
        }
    }

    /// Returns the `default` database configuration.
    pub fn default_database(&self) -> Option<&DatabaseSettings> {
        self.databases.get("default")
    }
}

/// A set-once global settings cell.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates an unconfigured cell.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Stores `settings`. Fails if the cell was already configured.
    pub fn configure(&self, settings: Settings) -> Result<(), LabsError> {
        self.inner.set(settings).map_err(|_| {
            LabsError::ImproperlyConfigured("Settings have already been configured".to_string())
        })
    }

    /// Returns the configured settings, if any.
    pub fn get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns `true` once [`configure`](Self::configure) succeeded.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The process-wide settings.
pub static SETTINGS: LazySettings = LazySettings::new();
