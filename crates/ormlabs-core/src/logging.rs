//! Tracing setup.
//!
//! [`setup_logging`] installs the global `tracing` subscriber from
//! [`Settings`]. Debug mode gets the pretty human format, everything else gets
//! JSON lines.

use tracing_subscriber::EnvFilter;

use crate::error::{LabsError, LabsResult};
use crate::settings::Settings;

/// Level names accepted in `log_level`, including the spellings used by
/// other logging stacks.
const LEVEL_NAMES: &[(&str, &str)] = &[
    ("trace", "trace"),
    ("debug", "debug"),
    ("info", "info"),
    ("warn", "warn"),
    ("warning", "warn"),
    ("error", "error"),
    ("critical", "error"),
];

/// Normalises a log level setting into an [`EnvFilter`] directive.
///
/// Plain level names are matched case-insensitively. Anything containing a
/// target directive (`=` or `,`) is handed to [`EnvFilter`] as-is.
///
/// # Examples
///
/// ```
/// use ormlabs_core::logging::validate_log_level;
///
/// assert_eq!(validate_log_level("WARNING").unwrap(), "warn");
/// assert_eq!(validate_log_level("ormlabs=trace").unwrap(), "ormlabs=trace");
/// assert!(validate_log_level("loud").is_err());
/// ```
pub fn validate_log_level(level: &str) -> LabsResult<String> {
    let trimmed = level.trim();
    if trimmed.contains('=') || trimmed.contains(',') {
        EnvFilter::try_new(trimmed).map_err(|e| {
            LabsError::ConfigurationError(format!("Invalid logging directive '{trimmed}': {e}"))
        })?;
        return Ok(trimmed.to_string());
    }
    let lower = trimmed.to_ascii_lowercase();
    LEVEL_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, directive)| (*directive).to_string())
        .ok_or_else(|| LabsError::ConfigurationError(format!("Invalid logging level: {level}")))
}

/// Installs the global subscriber described by `settings`.
///
/// A subscriber that is already installed is left in place, so calling this
/// from several tests is harmless.
pub fn setup_logging(settings: &Settings) -> LabsResult<()> {
    use tracing_subscriber::fmt;

    let directive = validate_log_level(&settings.log_level)?;
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| LabsError::ConfigurationError(e.to_string()))?;

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
    Ok(())
}

/// Creates the span a lab operation runs inside.
///
/// ```
/// use ormlabs_core::logging::operation_span;
///
/// let span = operation_span("all_communities");
/// let _guard = span.enter();
/// tracing::info!("running");
/// ```
pub fn operation_span(operation: &str) -> tracing::Span {
    tracing::info_span!("operation", name = operation)
}
