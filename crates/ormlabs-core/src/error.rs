//! Error types shared across the ormlabs crates.
//!
//! [`LabsError`] covers the failures the data layer, the validators and the
//! configuration loader can produce. [`ValidationError`] carries either a
//! single message or per-field messages collected during model cleaning.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// A validation failure with an optional set of per-field errors.
///
/// # Examples
///
/// ```
/// use ormlabs_core::error::ValidationError;
///
/// let err = ValidationError::new("Ensure this value is less than or equal to 100.", "max_value");
/// assert_eq!(err.code, "max_value");
///
/// let mut fields = std::collections::BTreeMap::new();
/// fields.insert("discount".to_string(), vec![err]);
/// let err = ValidationError::with_field_errors(fields);
/// assert!(err.to_string().starts_with("discount:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short machine-readable code (e.g. "required", "max_value").
    pub code: String,
    /// Per-field errors, keyed by field name in sorted order.
    pub field_errors: BTreeMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a simple validation error.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Creates a validation error that only carries per-field errors.
    pub fn with_field_errors(field_errors: BTreeMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            field_errors,
        }
    }

    /// Returns the errors recorded for `field`, if any.
    pub fn errors_for(&self, field: &str) -> &[Self] {
        self.field_errors.get(field).map_or(&[], Vec::as_slice)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            return write!(f, "{}", self.message);
        }
        let mut first = true;
        for (field, errors) in &self.field_errors {
            for error in errors {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {error}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The error type used throughout ormlabs.
#[derive(Error, Debug)]
pub enum LabsError {
    // ── Data layer ───────────────────────────────────────────────────
    /// A lookup expected one record and found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A lookup expected one record and found several.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A field name does not exist on a model or cannot be used that way.
    #[error("Field error: {0}")]
    FieldError(String),

    /// A generic storage failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A uniqueness or referential constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    // ── Validation ───────────────────────────────────────────────────
    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────
    /// A settings value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Models or admin registrations are declared inconsistently.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Serialization ────────────────────────────────────────────────
    /// Encoding or decoding a snapshot failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LabsError {
    /// Returns `true` for errors that mean "the referenced record is absent".
    pub const fn is_does_not_exist(&self) -> bool {
        matches!(self, Self::DoesNotExist(_))
    }
}

impl From<ValidationError> for LabsError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

impl From<serde_json::Error> for LabsError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience alias for `Result<T, LabsError>`.
pub type LabsResult<T> = Result<T, LabsError>;
