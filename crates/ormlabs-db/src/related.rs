//! Relation resolution.
//!
//! Turns a relation field of a record into the related records, one data
//! layer call at a time. To-one lookups signal absence with
//! [`LabsError::DoesNotExist`]; asking a non-relation (or a relation of the
//! wrong cardinality) for related records is a [`LabsError::FieldError`].

use ormlabs_core::{LabsError, LabsResult};

use crate::executor::DbExecutor;
use crate::fields::{FieldDef, FieldType, RelationKind};
use crate::model::Record;
use crate::registry::ModelRegistry;
use crate::value::Value;

/// How a many-to-many relation is stored: the intermediate model and its two
/// foreign key columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughLink {
    /// Label of the intermediate model.
    pub through: String,
    /// Foreign key column on `through` pointing at the side we start from.
    pub source_attname: String,
    /// Foreign key column on `through` pointing at `target`.
    pub target_attname: String,
    /// Label of the model on the far side.
    pub target: String,
}

fn fk_towards(registry: &ModelRegistry, through: &str, model: &str) -> LabsResult<String> {
    let meta = registry.meta(through)?;
    meta.fields
        .iter()
        .find(|f| {
            matches!(
                &f.field_type,
                FieldType::ForeignKey { to, .. } if ModelRegistry::resolve_label(meta.app_label, to) == model
            )
        })
        .map(|f| f.attname.clone())
        .ok_or_else(|| {
            LabsError::ImproperlyConfigured(format!(
                "{through} has no foreign key to {model}"
            ))
        })
}

/// Resolves the intermediate model of a many-to-many relation of `owner`.
///
/// Works for both the declaring side (`ManyToManyField`) and the reverse side
/// (`ReverseManyToMany`).
pub fn through_link(
    registry: &ModelRegistry,
    owner: &str,
    field: &FieldDef,
) -> LabsResult<ThroughLink> {
    let (declaring, m2m) = match &field.field_type {
        FieldType::ManyToManyField { .. } => (owner.to_string(), field),
        FieldType::ReverseManyToMany { from, field: name } => {
            (from.clone(), registry.get_field(from, name)?)
        }
        _ => {
            return Err(LabsError::FieldError(format!(
                "'{}' is not a many-to-many relation of {owner}",
                field.name
            )))
        }
    };
    let FieldType::ManyToManyField { to, through, .. } = &m2m.field_type else {
        return Err(LabsError::FieldError(format!(
            "'{}' is not a many-to-many relation of {declaring}",
            m2m.name
        )));
    };
    let app_label = registry.meta(&declaring)?.app_label;
    let through = through.as_deref().ok_or_else(|| {
        LabsError::FieldError(format!(
            "{declaring}.{} has no intermediate model",
            m2m.name
        ))
    })?;
    let through = ModelRegistry::resolve_label(app_label, through);
    let declared_target = ModelRegistry::resolve_label(app_label, to);
    let target = if matches!(field.field_type, FieldType::ManyToManyField { .. }) {
        declared_target
    } else {
        declaring
    };
    Ok(ThroughLink {
        source_attname: fk_towards(registry, &through, owner)?,
        target_attname: fk_towards(registry, &through, &target)?,
        through,
        target,
    })
}

/// Resolves a to-one relation (forward foreign key, forward or reverse
/// one-to-one) to its target record.
pub fn resolve_to_one(
    db: &dyn DbExecutor,
    record: &dyn Record,
    field: &FieldDef,
) -> LabsResult<Box<dyn Record>> {
    let meta = record.record_meta();
    match &field.field_type {
        FieldType::ForeignKey { to, .. } | FieldType::OneToOneField { to, .. } => {
            let value = record.field_value(&field.attname).unwrap_or(Value::Null);
            if value.is_null() {
                return Err(LabsError::DoesNotExist(format!(
                    "{}.{} is not set",
                    meta.label(),
                    field.name
                )));
            }
            let target = ModelRegistry::resolve_label(meta.app_label, to);
            db.get(&target, &value)
        }
        FieldType::ReverseOneToOne { from, field: name } => {
            let attname = db.registry().get_field(from, name)?.attname.clone();
            let mut matches = db.filter(from, &attname, &record.pk_value())?;
            match matches.len() {
                0 => Err(LabsError::DoesNotExist(format!(
                    "{} has no {}",
                    meta.label(),
                    field.name
                ))),
                1 => Ok(matches.remove(0)),
                n => Err(LabsError::MultipleObjectsReturned(format!(
                    "{} {} records point at {} {}",
                    n,
                    from,
                    meta.label(),
                    record.pk_value()
                ))),
            }
        }
        _ => Err(LabsError::FieldError(format!(
            "'{}' is not a to-one relation of {}",
            field.name,
            meta.label()
        ))),
    }
}

/// Resolves a to-many relation (reverse foreign key, many-to-many either
/// way) to the related records.
pub fn resolve_to_many(
    db: &dyn DbExecutor,
    record: &dyn Record,
    field: &FieldDef,
) -> LabsResult<Vec<Box<dyn Record>>> {
    let label = record.label();
    match &field.field_type {
        FieldType::ReverseForeignKey { from, field: name } => {
            let attname = db.registry().get_field(from, name)?.attname.clone();
            db.filter(from, &attname, &record.pk_value())
        }
        FieldType::ManyToManyField { .. } | FieldType::ReverseManyToMany { .. } => {
            let link = through_link(db.registry(), &label, field)?;
            db.filter_through(&link, &record.pk_value())
        }
        _ => Err(LabsError::FieldError(format!(
            "'{}' is not a to-many relation of {label}",
            field.name
        ))),
    }
}

/// Resolves any relation of `record` by name.
///
/// A to-one relation yields zero or one record; absence is not an error here.
pub fn resolve_field(
    db: &dyn DbExecutor,
    record: &dyn Record,
    name: &str,
) -> LabsResult<Vec<Box<dyn Record>>> {
    let label = record.label();
    let field = db.registry().get_field(&label, name)?;
    match field.relation() {
        Some(RelationKind::ToOne { .. }) => match resolve_to_one(db, record, field) {
            Ok(related) => Ok(vec![related]),
            Err(e) if e.is_does_not_exist() => Ok(Vec::new()),
            Err(e) => Err(e),
        },
        Some(RelationKind::ToMany) => resolve_to_many(db, record, field),
        None => Err(LabsError::FieldError(format!(
            "'{name}' is not a relation of {label}"
        ))),
    }
}
