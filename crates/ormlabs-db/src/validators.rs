//! Field validators and model cleaning.
//!
//! Validators are attached to [`FieldDef`](crate::fields::FieldDef) instances
//! and run by [`full_clean`]. Each checks one constraint. NULL values never
//! reach a validator; nullability is checked by `full_clean` itself.
//!
//! The schema validators check the shape of structured columns (the member
//! `info` document, the `skills` array, the community `locations` array) and
//! report the first violation they find.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use ormlabs_core::ValidationError;
use regex::Regex;
use serde_json::Value as Json;

use crate::fields::FieldType;
use crate::model::Record;
use crate::value::Value;

/// A check on a single field value.
///
/// ```
/// use ormlabs_db::validators::{MaxValueValidator, Validator};
/// use ormlabs_db::value::Value;
///
/// let v = MaxValueValidator::new(100.0);
/// assert!(v.validate(&Value::Int(40)).is_ok());
/// assert!(v.validate(&Value::Int(140)).is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates `value`, returning the failure if it is invalid.
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

/// Rejects strings longer than `max_length` characters.
#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    /// The maximum allowed length.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator`.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Validator for MaxLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            let len = s.chars().count();
            if len > self.max_length {
                return Err(ValidationError::new(
                    format!(
                        "Ensure this value has at most {} characters (it has {len}).",
                        self.max_length
                    ),
                    "max_length",
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }
}

/// Rejects numbers greater than `max_value`.
#[derive(Debug, Clone)]
pub struct MaxValueValidator {
    /// The maximum allowed value.
    pub max_value: f64,
}

impl MaxValueValidator {
    /// Creates a new `MaxValueValidator`.
    pub const fn new(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl Validator for MaxValueValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match value.as_number() {
            Some(n) if n > self.max_value => Err(ValidationError::new(
                format!(
                    "Ensure this value is less than or equal to {}.",
                    self.max_value
                ),
                "max_value",
            )),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxValueValidator"
    }
}

/// Rejects numbers smaller than `min_value`.
#[derive(Debug, Clone)]
pub struct MinValueValidator {
    /// The minimum allowed value.
    pub min_value: f64,
}

impl MinValueValidator {
    /// Creates a new `MinValueValidator`.
    pub const fn new(min_value: f64) -> Self {
        Self { min_value }
    }
}

impl Validator for MinValueValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match value.as_number() {
            Some(n) if n < self.min_value => Err(ValidationError::new(
                format!(
                    "Ensure this value is greater than or equal to {}.",
                    self.min_value
                ),
                "min_value",
            )),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinValueValidator"
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:http|ftp)s?://(?:(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
    )
    .expect("valid regex")
});

/// Rejects strings that are not e-mail addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailValidator;

impl Validator for EmailValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::String(s) if !EMAIL_RE.is_match(s) => Err(ValidationError::new(
                "Enter a valid email address.",
                "invalid",
            )),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "EmailValidator"
    }
}

// ── Structure checks ───────────────────────────────────────────────────

fn invalid(message: String) -> ValidationError {
    ValidationError::new(message, "invalid")
}

fn expect_object(json: &Json) -> Result<&serde_json::Map<String, Json>, ValidationError> {
    json.as_object()
        .ok_or_else(|| invalid(format!("{json} is not of type 'object'")))
}

fn expect_array(json: &Json) -> Result<&[Json], ValidationError> {
    json.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| invalid(format!("{json} is not of type 'array'")))
}

fn expect_string(json: &Json) -> Result<&str, ValidationError> {
    json.as_str()
        .ok_or_else(|| invalid(format!("{json} is not of type 'string'")))
}

fn expect_integer(json: &Json) -> Result<i64, ValidationError> {
    json.as_i64()
        .ok_or_else(|| invalid(format!("{json} is not of type 'integer'")))
}

fn check_language(language: &Json) -> Result<(), ValidationError> {
    let object = expect_object(language)?;
    for required in ["name", "level"] {
        if !object.contains_key(required) {
            return Err(invalid(format!("'{required}' is a required property")));
        }
    }
    if let Some(extra) = object.keys().find(|k| *k != "name" && *k != "level") {
        return Err(invalid(format!(
            "Additional properties are not allowed ('{extra}' was unexpected)"
        )));
    }
    expect_string(&object["name"])?;
    let level = expect_integer(&object["level"])?;
    if level < 0 {
        return Err(invalid(format!("{level} is less than the minimum of 0")));
    }
    if level > 10 {
        return Err(invalid(format!("{level} is greater than the maximum of 10")));
    }
    Ok(())
}

fn check_websites(websites: &Json) -> Result<(), ValidationError> {
    let items = expect_array(websites)?;
    if items.len() > 3 {
        return Err(invalid(format!("{websites} is too long")));
    }
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            return Err(invalid(format!("{websites} has non-unique elements")));
        }
        let url = expect_string(item)?;
        if !URL_RE.is_match(url) {
            return Err(invalid(format!("'{url}' is not a valid URL")));
        }
    }
    Ok(())
}

/// Checks the member `info` document.
///
/// The document is an object. `languages`, when present, is a non-empty array
/// of `{"name": string, "level": 0..=10}` objects with no other keys.
/// `websites`, when present, is an array of at most three distinct URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoSchemaValidator;

impl Validator for InfoSchemaValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let json = value.to_json();
        let object = expect_object(&json)?;
        if let Some(languages) = object.get("languages") {
            let items = expect_array(languages)?;
            if items.is_empty() {
                return Err(invalid("[] is too short".to_string()));
            }
            items.iter().try_for_each(check_language)?;
        }
        if let Some(websites) = object.get("websites") {
            check_websites(websites)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "InfoSchemaValidator"
    }
}

/// Checks that `skills` is an array of strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkillsSchemaValidator;

impl Validator for SkillsSchemaValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let json = value.to_json();
        for item in expect_array(&json)? {
            expect_string(item)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SkillsSchemaValidator"
    }
}

/// Checks that `locations` is an array of coordinate pairs.
///
/// Each entry is an array of at most two numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationSchemaValidator;

impl Validator for LocationSchemaValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let json = value.to_json();
        for entry in expect_array(&json)? {
            let coordinates = expect_array(entry)?;
            if coordinates.len() > 2 {
                return Err(invalid(format!("{entry} is too long")));
            }
            if let Some(bad) = coordinates.iter().find(|c| !c.is_number()) {
                return Err(invalid(format!("{bad} is not of type 'number'")));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "LocationSchemaValidator"
    }
}

// ── Model cleaning ─────────────────────────────────────────────────────

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Json(Json::Object(map)) => map.is_empty(),
        Value::Json(Json::Array(items)) => items.is_empty(),
        Value::Json(Json::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// Validates every concrete field of `record`.
///
/// Auto primary keys are skipped. A NULL value is an error unless the field is
/// nullable, and skips the remaining checks. An empty value is an error unless
/// the field allows blanks. Otherwise `max_length`, the implicit e-mail check
/// of e-mail fields and every attached validator run, and all failures are
/// collected per field name.
///
/// # Errors
///
/// Returns a [`ValidationError`] whose `field_errors` holds every failure.
pub fn full_clean(record: &dyn Record) -> Result<(), ValidationError> {
    let meta = record.record_meta();
    let mut errors: BTreeMap<String, Vec<ValidationError>> = BTreeMap::new();

    for field in meta.concrete_fields() {
        if field.primary_key
            && matches!(
                field.field_type,
                FieldType::AutoField | FieldType::BigAutoField
            )
        {
            continue;
        }
        let value = record.field_value(&field.attname).unwrap_or(Value::Null);
        let mut field_errors = Vec::new();

        if value.is_null() {
            if !field.null {
                field_errors.push(ValidationError::new("This field cannot be null.", "null"));
            }
        } else if is_empty(&value) && !field.blank {
            field_errors.push(ValidationError::new("This field cannot be blank.", "blank"));
        } else if !is_empty(&value) {
            if let Some(max_length) = field.max_length {
                if let Err(e) = MaxLengthValidator::new(max_length).validate(&value) {
                    field_errors.push(e);
                }
            }
            if field.field_type == FieldType::EmailField {
                if let Err(e) = EmailValidator.validate(&value) {
                    field_errors.push(e);
                }
            }
            field_errors.extend(
                field
                    .validators
                    .iter()
                    .filter_map(|v| v.validate(&value).err()),
            );
        }

        if !field_errors.is_empty() {
            errors.insert(field.name.clone(), field_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::with_field_errors(errors))
    }
}
