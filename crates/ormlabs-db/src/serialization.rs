//! The serialization mixin.
//!
//! [`SerializationMixin`] is implemented for every [`Record`]. It projects a
//! record onto its concrete fields minus the type's excluded set, and can
//! follow to-one relations to produce a denormalized list of [`Snapshot`]s.
//!
//! Projections are keyed by field name, primary key aside: the key travels in
//! [`Snapshot::pk`]. A foreign key appears under its field name with the raw
//! key as value (`"community": 1`).

use std::collections::HashSet;

use ormlabs_core::{LabsError, LabsResult};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::executor::DbExecutor;
use crate::fields::{FieldDef, FieldType, RelationKind};
use crate::model::Record;
use crate::related::{resolve_field, resolve_to_many, resolve_to_one};
use crate::value::Value;

/// An insertion-ordered field name to value map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMap {
    entries: Vec<(String, Value)>,
}

impl FieldMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts to a JSON object, keeping key order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, &v.to_json())?;
        }
        map.end()
    }
}

/// The snapshot of one record: its type label, primary key and field map.
///
/// Serializes to the fixture shape `{"model": .., "pk": .., "fields": {..}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The `app_label.model_name` label.
    pub model: String,
    /// The primary key.
    pub pk: Value,
    /// The projected fields.
    pub fields: FieldMap,
}

impl Snapshot {
    /// Converts to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "pk": self.pk.to_json(),
            "fields": self.fields.to_json(),
        })
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Snapshot", 3)?;
        state.serialize_field("model", &self.model)?;
        state.serialize_field("pk", &self.pk.to_json())?;
        state.serialize_field("fields", &self.fields)?;
        state.end()
    }
}

/// Projection and deep serialization of records.
pub trait SerializationMixin {
    /// Concrete field names in declaration order, primary key and excluded
    /// names left out.
    fn field_names(&self) -> Vec<&'static str>;

    /// The field map of the record: exactly [`field_names`](Self::field_names)
    /// as keys. File values become their storage path.
    fn to_dict(&self) -> FieldMap;

    /// A one-element list holding the record's snapshot.
    fn serialize(&self) -> Vec<Snapshot>;

    /// The record's snapshot followed by the deep snapshots of its to-one
    /// relations.
    ///
    /// Forward foreign keys and one-to-one fields are followed in declaration
    /// order; reverse one-to-one relations follow when `include_one_to_one`
    /// is set. Each target is serialized the same way, with the flag set to
    /// whether the hop was one-to-one. Null or dangling references, and
    /// fields that do not resolve to a record, contribute nothing. A record
    /// already emitted is never emitted or followed again, so cyclic graphs
    /// terminate.
    ///
    /// # Errors
    ///
    /// Propagates data-layer failures other than absence.
    fn deep_serialize(
        &self,
        db: &dyn DbExecutor,
        include_one_to_one: bool,
    ) -> LabsResult<Vec<Snapshot>>;

    /// [`to_dict`](Self::to_dict) plus every non-excluded many-to-many
    /// relation, as the list of the related records' field maps.
    fn to_full_dict(&self, db: &dyn DbExecutor) -> LabsResult<FieldMap>;

    /// Resolves any relation of the record by name.
    fn related_values(&self, db: &dyn DbExecutor, name: &str) -> LabsResult<Vec<Box<dyn Record>>>;
}

fn projected(field: &FieldDef, value: Value) -> Value {
    match (&field.field_type, value) {
        (FieldType::FileField { .. } | FieldType::ImageField { .. }, Value::File(file)) => {
            Value::String(file.name)
        }
        (_, value) => value,
    }
}

fn follows(field: &FieldDef) -> bool {
    matches!(
        field.field_type,
        FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. }
    )
}

fn deep_walk(
    record: &dyn Record,
    db: &dyn DbExecutor,
    include_one_to_one: bool,
    visited: &mut HashSet<(String, String)>,
    out: &mut Vec<Snapshot>,
) -> LabsResult<()> {
    let label = record.label();
    if !visited.insert((label.clone(), record.pk_value().key())) {
        return Ok(());
    }
    out.extend(record.serialize());

    let meta = record.record_meta();
    let forward = meta
        .fields
        .iter()
        .filter(|f| follows(f) && !meta.is_excluded(f));
    let reverse = db
        .registry()
        .reverse_relations(&label)
        .iter()
        .filter(|f| {
            include_one_to_one
                && matches!(f.field_type, FieldType::ReverseOneToOne { .. })
                && !meta.serialize_exclude.contains(&f.name.as_str())
        });

    for field in forward.chain(reverse) {
        let one_to_one = field.relation() == Some(RelationKind::ToOne { one_to_one: true });
        match resolve_to_one(db, record, field) {
            Ok(related) => deep_walk(&*related, db, one_to_one, visited, out)?,
            Err(LabsError::DoesNotExist(reason) | LabsError::FieldError(reason)) => {
                tracing::debug!(
                    model = %label,
                    field = %field.name,
                    %reason,
                    "skipping unresolved relation"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl<R: Record + ?Sized> SerializationMixin for R {
    fn field_names(&self) -> Vec<&'static str> {
        let meta = self.record_meta();
        meta.concrete_fields()
            .filter(|f| !f.primary_key && !meta.is_excluded(f))
            .map(|f| f.name.as_str())
            .collect()
    }

    fn to_dict(&self) -> FieldMap {
        let meta = self.record_meta();
        meta.concrete_fields()
            .filter(|f| !f.primary_key && !meta.is_excluded(f))
            .map(|f| {
                let value = self.field_value(&f.attname).unwrap_or(Value::Null);
                (f.name.as_str(), projected(f, value))
            })
            .collect()
    }

    fn serialize(&self) -> Vec<Snapshot> {
        vec![Snapshot {
            model: self.label(),
            pk: self.pk_value(),
            fields: self.to_dict(),
        }]
    }

    fn deep_serialize(
        &self,
        db: &dyn DbExecutor,
        include_one_to_one: bool,
    ) -> LabsResult<Vec<Snapshot>> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        deep_walk(self.as_record(), db, include_one_to_one, &mut visited, &mut out)?;
        Ok(out)
    }

    fn to_full_dict(&self, db: &dyn DbExecutor) -> LabsResult<FieldMap> {
        let mut map = self.to_dict();
        let meta = self.record_meta();
        for field in meta.fields.iter().filter(|f| {
            matches!(f.field_type, FieldType::ManyToManyField { .. }) && !meta.is_excluded(f)
        }) {
            let related = resolve_to_many(db, self.as_record(), field)?;
            let items = related
                .iter()
                .map(|r| Value::Json(r.to_dict().to_json()))
                .collect();
            map.insert(field.name.clone(), Value::List(items));
        }
        Ok(map)
    }

    fn related_values(&self, db: &dyn DbExecutor, name: &str) -> LabsResult<Vec<Box<dyn Record>>> {
        resolve_field(db, self.as_record(), name)
    }
}
