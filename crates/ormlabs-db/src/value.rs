//! In-memory field values.
//!
//! [`Value`] is what accessor tables return and what rows store. It is richer
//! than JSON (timestamps, UUIDs, file references) and converts to JSON with
//! [`Value::to_json`] when a snapshot is encoded.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use ormlabs_core::{LabsError, LabsResult};

/// A reference to a stored file, as held by file and image fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFile {
    /// The storage path relative to the media root (e.g. "logos/pydevs.png").
    pub name: String,
    /// The size in bytes, when known.
    pub size: Option<u64>,
}

impl FieldFile {
    /// Creates a file reference with an unknown size.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }
}

/// A field value.
///
/// ```
/// use ormlabs_db::value::Value;
///
/// assert_eq!(Value::from(42_i64), Value::Int(42));
/// assert_eq!(Value::from(Some("Ada")), Value::String("Ada".into()));
/// assert_eq!(Value::from(None::<i64>), Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A UTC timestamp.
    DateTime(DateTime<Utc>),
    /// A UUID.
    Uuid(uuid::Uuid),
    /// Structured JSON (also used for key/value hstore columns).
    Json(serde_json::Value),
    /// A homogeneous array.
    List(Vec<Value>),
    /// A stored file reference.
    File(FieldFile),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::File(file) => write!(f, "{}", file.name),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer, if this is one.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number as `f64` for integers and floats.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts to a plain JSON value.
    ///
    /// Timestamps become RFC 3339 strings, files become their storage path and
    /// bytes become an array of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::json!(i),
            Self::Float(v) => serde_json::json!(v),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::json!(b),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Uuid(u) => serde_json::Value::String(u.to_string()),
            Self::Json(j) => j.clone(),
            Self::List(vals) => serde_json::Value::Array(vals.iter().map(Self::to_json).collect()),
            Self::File(file) => serde_json::Value::String(file.name.clone()),
        }
    }

    /// A string key that identifies this value inside a primary-key set.
    pub(crate) fn key(&self) -> String {
        match self {
            Self::String(s) => format!("s:{s}"),
            other => other.to_string(),
        }
    }
}

/// Orders values the way SQL ordering and comparisons do: NULL first, then
/// by natural order within a type. Integers and floats compare numerically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Uuid(x), Value::Uuid(y)) => x.cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<FieldFile> for Value {
    fn from(v: FieldFile) -> Self {
        Self::File(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ── FromValue ──────────────────────────────────────────────────────────

/// Conversion from a stored [`Value`] back into a Rust type.
pub trait FromValue: Sized {
    /// Converts `value`, failing on a type mismatch.
    fn from_value(value: &Value) -> LabsResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> LabsError {
    LabsError::DatabaseError(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> LabsResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> LabsResult<Self> {
        value.as_int().ok_or_else(|| mismatch("Int", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> LabsResult<Self> {
        let i = i64::from_value(value)?;
        Self::try_from(i).map_err(|e| LabsError::DatabaseError(format!("Int out of range: {e}")))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> LabsResult<Self> {
        let i = i64::from_value(value)?;
        Self::try_from(i).map_err(|e| LabsError::DatabaseError(format!("Int out of range: {e}")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> LabsResult<Self> {
        value.as_number().ok_or_else(|| mismatch("Float", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> LabsResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| LabsError::DatabaseError(format!("Invalid timestamp '{s}': {e}"))),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => s
                .parse()
                .map_err(|e| LabsError::DatabaseError(format!("Invalid UUID '{s}': {e}"))),
            _ => Err(mismatch("Uuid", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::Null => Ok(Self::Null),
            _ => Err(mismatch("Json", value)),
        }
    }
}

impl FromValue for FieldFile {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::File(file) => Ok(file.clone()),
            Value::String(s) => Ok(Self::new(s.clone())),
            _ => Err(mismatch("File", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> LabsResult<Self> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            _ => Err(mismatch("List", value)),
        }
    }
}
