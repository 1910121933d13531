//! Snapshot encoders and fixture loading.
//!
//! A [`Serializer`] turns JSON objects into text and back. Snapshots are
//! encoded in the fixture shape, so anything [`dump_snapshots`] writes,
//! [`load_fixture`] reads back into a data layer.
//!
//! ## Serializers
//!
//! - [`JsonSerializer`] - Compact JSON serialization
//! - [`PrettyJsonSerializer`] - Pretty-printed JSON serialization

use chrono::{DateTime, Utc};
use ormlabs_core::{LabsError, LabsResult};

use crate::executor::DbExecutor;
use crate::fields::FieldType;
use crate::registry::ModelRegistry;
use crate::row::Row;
use crate::serialization::Snapshot;
use crate::value::{FieldFile, Value};

/// A serializer for converting data to and from string representations.
///
/// All implementations must be `Send + Sync`.
pub trait Serializer: Send + Sync {
    /// Serializes a slice of JSON objects into a string.
    fn serialize(&self, objects: &[serde_json::Value]) -> LabsResult<String>;

    /// Deserializes a string into a vector of JSON objects.
    fn deserialize(&self, data: &str) -> LabsResult<Vec<serde_json::Value>>;
}

/// Compact JSON serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, objects: &[serde_json::Value]) -> LabsResult<String> {
        Ok(serde_json::to_string(objects)?)
    }

    fn deserialize(&self, data: &str) -> LabsResult<Vec<serde_json::Value>> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Pretty-printed JSON serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyJsonSerializer;

impl Serializer for PrettyJsonSerializer {
    fn serialize(&self, objects: &[serde_json::Value]) -> LabsResult<String> {
        Ok(serde_json::to_string_pretty(objects)?)
    }

    fn deserialize(&self, data: &str) -> LabsResult<Vec<serde_json::Value>> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Encodes snapshots with `serializer`.
pub fn dump_snapshots(serializer: &dyn Serializer, snapshots: &[Snapshot]) -> LabsResult<String> {
    let objects: Vec<serde_json::Value> = snapshots.iter().map(Snapshot::to_json).collect();
    serializer.serialize(&objects)
}

fn invalid(label: &str, field: &str, json: &serde_json::Value) -> LabsError {
    LabsError::SerializationError(format!("Invalid value for {label}.{field}: {json}"))
}

fn decode_value(
    field_type: &FieldType,
    json: &serde_json::Value,
    label: &str,
    field: &str,
) -> LabsResult<Value> {
    use serde_json::Value as Json;

    if json.is_null() {
        return Ok(Value::Null);
    }
    let bad = || invalid(label, field, json);
    Ok(match field_type {
        FieldType::JsonField | FieldType::HStoreField => Value::Json(json.clone()),
        FieldType::ArrayField { base_field, .. } => {
            let items = json.as_array().ok_or_else(bad)?;
            Value::List(
                items
                    .iter()
                    .map(|item| decode_value(base_field, item, label, field))
                    .collect::<LabsResult<_>>()?,
            )
        }
        FieldType::FloatField => Value::Float(json.as_f64().ok_or_else(bad)?),
        FieldType::BooleanField => Value::Bool(json.as_bool().ok_or_else(bad)?),
        FieldType::DateTimeField => {
            let text = json.as_str().ok_or_else(bad)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|_| bad())?;
            Value::DateTime(parsed.with_timezone(&Utc))
        }
        FieldType::UuidField => {
            let text = json.as_str().ok_or_else(bad)?;
            Value::Uuid(text.parse().map_err(|_| bad())?)
        }
        FieldType::FileField { .. } | FieldType::ImageField { .. } => {
            Value::File(FieldFile::new(json.as_str().ok_or_else(bad)?))
        }
        FieldType::CharField | FieldType::TextField | FieldType::EmailField => {
            Value::String(json.as_str().ok_or_else(bad)?.to_string())
        }
        FieldType::AutoField
        | FieldType::BigAutoField
        | FieldType::IntegerField
        | FieldType::PositiveIntegerField => Value::Int(json.as_i64().ok_or_else(bad)?),
        // Relation keys take the shape of the target key.
        _ => match json {
            Json::Number(n) => Value::Int(n.as_i64().ok_or_else(bad)?),
            Json::String(s) => Value::String(s.clone()),
            _ => return Err(bad()),
        },
    })
}

/// Decodes one fixture object into its model label and a storable row.
///
/// Field keys are field names (a foreign key's raw key sits under
/// `"community"`, not `"community_id"`); unknown keys are an error.
pub fn decode_snapshot(
    registry: &ModelRegistry,
    object: &serde_json::Value,
) -> LabsResult<(String, Row)> {
    let model = object
        .get("model")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            LabsError::SerializationError(format!("Fixture object has no model label: {object}"))
        })?;
    let meta = registry.meta(model)?;
    let label = meta.label();
    let mut row = Row::default();

    if let (Some(pk), Some(pk_field)) = (object.get("pk"), meta.pk_field()) {
        let value = decode_value(&pk_field.field_type, pk, &label, &pk_field.name)?;
        row.set(pk_field.attname.clone(), value);
    }

    if let Some(fields) = object.get("fields") {
        let fields = fields.as_object().ok_or_else(|| {
            LabsError::SerializationError(format!("{label}: 'fields' is not an object"))
        })?;
        for (name, json) in fields {
            let field = meta
                .fields
                .iter()
                .find(|f| f.name == *name && f.concrete)
                .ok_or_else(|| {
                    LabsError::SerializationError(format!("{label} has no field named '{name}'"))
                })?;
            let value = decode_value(&field.field_type, json, &label, name)?;
            row.set(field.attname.clone(), value);
        }
    }
    Ok((label, row))
}

/// Loads every object of a JSON fixture into `db`, in order.
///
/// Returns the number of stored records.
pub fn load_fixture(db: &dyn DbExecutor, data: &str) -> LabsResult<usize> {
    let objects = JsonSerializer.deserialize(data)?;
    for object in &objects {
        let (label, row) = decode_snapshot(db.registry(), object)?;
        db.insert(&label, row)?;
    }
    tracing::debug!(count = objects.len(), "loaded fixture");
    Ok(objects.len())
}
