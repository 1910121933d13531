//! Model checks.
//!
//! Static consistency checks between a model's schema, its accessor table and
//! the registry it lives in.

use ormlabs_core::checks::CheckMessage;

use crate::model::ModelMeta;
use crate::registry::ModelRegistry;

/// Checks one model.
///
/// - `models.E001`: a concrete field has no accessor.
/// - `models.W001`: an excluded name matches no field. Serialization still
///   works, the name is ignored.
/// - `models.E002`: a relation points at a model missing from `registry`
///   (only checked when a registry is given).
pub fn check_model(
    meta: &ModelMeta,
    accessor_names: &[&str],
    registry: Option<&ModelRegistry>,
) -> Vec<CheckMessage> {
    let label = meta.label();
    let mut messages = Vec::new();

    for field in meta.concrete_fields() {
        if !accessor_names.contains(&field.attname.as_str()) {
            messages.push(
                CheckMessage::error(
                    "models.E001",
                    format!("Field '{}' has no accessor for '{}'", field.name, field.attname),
                    &label,
                )
                .hint("Add an Accessor entry to the model's accessors() table."),
            );
        }
    }

    for name in &meta.serialize_exclude {
        if meta.get_field(name).is_none() {
            messages.push(CheckMessage::warning(
                "models.W001",
                format!("'{name}' in serialize_exclude is not a field"),
                &label,
            ));
        }
    }

    if let Some(registry) = registry {
        for field in &meta.fields {
            let Some(to) = field.field_type.related_model() else {
                continue;
            };
            if field.field_type.is_reverse() {
                continue;
            }
            let target = ModelRegistry::resolve_label(meta.app_label, to);
            if registry.get(&target).is_none() {
                messages.push(CheckMessage::error(
                    "models.E002",
                    format!(
                        "Field '{}' points to '{target}', which is not registered",
                        field.name
                    ),
                    &label,
                ));
            }
        }
    }
    messages
}

/// Checks every model of a registry.
pub fn check_all(registry: &ModelRegistry) -> Vec<CheckMessage> {
    registry
        .models()
        .flat_map(|model| check_model(model.meta, &model.accessor_names, Some(registry)))
        .collect()
}
