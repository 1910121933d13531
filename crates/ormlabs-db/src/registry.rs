//! The model registry.
//!
//! Model types are registered with [`ModelRegistry::register`] and the
//! registry is then finalized once with [`ModelRegistry::populate`], which
//! resolves every relation target and computes the reverse relations the
//! targets answer to. The data layer builds records through the row factory
//! stored at registration, so it can hand out `Box<dyn Record>` for any
//! registered type.

use std::collections::HashMap;

use ormlabs_core::{LabsError, LabsResult};

use crate::fields::{FieldDef, FieldType};
use crate::model::{Model, ModelMeta, Record};
use crate::row::Row;

type RowFactory = fn(&Row) -> LabsResult<Box<dyn Record>>;

fn factory<M: Model>(row: &Row) -> LabsResult<Box<dyn Record>> {
    M::from_row(row).map(|m| Box::new(m) as Box<dyn Record>)
}

/// One registered model type.
pub struct RegisteredModel {
    /// The type's schema.
    pub meta: &'static ModelMeta,
    /// Attribute names covered by the type's accessor table.
    pub accessor_names: Vec<&'static str>,
    /// Reverse relations pointing at this type, computed by `populate`.
    pub reverse_relations: Vec<FieldDef>,
    factory: RowFactory,
}

impl std::fmt::Debug for RegisteredModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModel")
            .field("label", &self.meta.label())
            .field("accessor_names", &self.accessor_names)
            .field("reverse_relations", &self.reverse_relations)
            .finish_non_exhaustive()
    }
}

impl RegisteredModel {
    /// Iterates over declared fields followed by reverse relations.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.meta.fields.iter().chain(self.reverse_relations.iter())
    }
}

/// Registry of model types keyed by `app_label.model_name`.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<RegisteredModel>,
    labels: HashMap<String, usize>,
    ready: bool,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model type.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` if the label is already registered or
    /// the registry has been populated.
    pub fn register<M: Model>(&mut self) -> LabsResult<()> {
        let meta = M::meta();
        let label = meta.label();
        if self.ready {
            return Err(LabsError::ImproperlyConfigured(format!(
                "Cannot register '{label}': the model registry is already populated"
            )));
        }
        if self.labels.contains_key(&label) {
            return Err(LabsError::ImproperlyConfigured(format!(
                "Model '{label}' is already registered"
            )));
        }
        self.labels.insert(label, self.models.len());
        self.models.push(RegisteredModel {
            meta,
            accessor_names: M::accessors().iter().map(|a| a.attname).collect(),
            reverse_relations: Vec::new(),
            factory: factory::<M>,
        });
        Ok(())
    }

    /// Resolves a relation target written on a model of `app_label`.
    ///
    /// `"Community"` becomes `"labs.community"`; dotted labels are only
    /// lowercased.
    ///
    /// ```
    /// use ormlabs_db::registry::ModelRegistry;
    ///
    /// assert_eq!(ModelRegistry::resolve_label("labs", "Community"), "labs.community");
    /// assert_eq!(ModelRegistry::resolve_label("labs", "auth.User"), "auth.user");
    /// ```
    pub fn resolve_label(app_label: &str, target: &str) -> String {
        if target.contains('.') {
            target.to_lowercase()
        } else {
            format!("{app_label}.{}", target.to_lowercase())
        }
    }

    /// Resolves relation targets and computes reverse relations.
    ///
    /// The reverse accessor of a relation is its `related_name`, or
    /// `<model>_set` for foreign keys and many-to-many fields and `<model>` for
    /// one-to-one fields.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` if a relation points at an unregistered
    /// model, a reverse accessor clashes with a field of its target, or the
    /// registry is already populated.
    pub fn populate(&mut self) -> LabsResult<()> {
        if self.ready {
            return Err(LabsError::ImproperlyConfigured(
                "The model registry is already populated".to_string(),
            ));
        }
        let mut pending: Vec<(usize, FieldDef)> = Vec::new();
        for model in &self.models {
            let meta = model.meta;
            let source = meta.label();
            for field in &meta.fields {
                let (to, related_name, reverse) = match &field.field_type {
                    FieldType::ForeignKey {
                        to, related_name, ..
                    } => (to, related_name, ReverseKind::ForeignKey),
                    FieldType::OneToOneField {
                        to, related_name, ..
                    } => (to, related_name, ReverseKind::OneToOne),
                    FieldType::ManyToManyField {
                        to, related_name, ..
                    } => (to, related_name, ReverseKind::ManyToMany),
                    _ => continue,
                };
                let target = Self::resolve_label(meta.app_label, to);
                let index = *self.labels.get(&target).ok_or_else(|| {
                    LabsError::ImproperlyConfigured(format!(
                        "{source}.{} points to '{target}', which is not registered",
                        field.name
                    ))
                })?;
                let name = related_name.clone().unwrap_or_else(|| match reverse {
                    ReverseKind::OneToOne => meta.model_name.to_string(),
                    _ => format!("{}_set", meta.model_name),
                });
                let from = source.clone();
                let field_name = field.name.clone();
                let field_type = match reverse {
                    ReverseKind::ForeignKey => FieldType::ReverseForeignKey {
                        from,
                        field: field_name,
                    },
                    ReverseKind::OneToOne => FieldType::ReverseOneToOne {
                        from,
                        field: field_name,
                    },
                    ReverseKind::ManyToMany => FieldType::ReverseManyToMany {
                        from,
                        field: field_name,
                    },
                };
                pending.push((index, FieldDef::new(name, field_type)));
            }
        }

        let mut computed: Vec<Vec<FieldDef>> = self.models.iter().map(|_| Vec::new()).collect();
        for (index, reverse) in pending {
            let meta = self.models[index].meta;
            let clashes = meta.get_field(&reverse.name).is_some()
                || computed[index].iter().any(|r| r.name == reverse.name);
            if clashes {
                return Err(LabsError::ImproperlyConfigured(format!(
                    "Reverse accessor '{}' for {} clashes with a field of {}",
                    reverse.name,
                    reverse.field_type.related_model().unwrap_or_default(),
                    meta.label()
                )));
            }
            computed[index].push(reverse);
        }
        for (model, reverse) in self.models.iter_mut().zip(computed) {
            model.reverse_relations = reverse;
        }

        self.ready = true;
        tracing::debug!(models = self.models.len(), "model registry populated");
        Ok(())
    }

    /// Returns `true` once [`populate`](Self::populate) has succeeded.
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Looks up a registered model by label.
    pub fn get(&self, label: &str) -> Option<&RegisteredModel> {
        self.labels.get(label).map(|&i| &self.models[i])
    }

    /// Looks up a registered model, failing with `FieldError` if absent.
    pub fn require(&self, label: &str) -> LabsResult<&RegisteredModel> {
        self.get(label)
            .ok_or_else(|| LabsError::FieldError(format!("Model '{label}' is not registered")))
    }

    /// Returns the schema of a registered model.
    pub fn meta(&self, label: &str) -> LabsResult<&'static ModelMeta> {
        self.require(label).map(|m| m.meta)
    }

    /// Finds a field or reverse relation of a model by name.
    pub fn get_field(&self, label: &str, name: &str) -> LabsResult<&FieldDef> {
        self.require(label)?
            .all_fields()
            .find(|f| f.answers_to(name))
            .ok_or_else(|| LabsError::FieldError(format!("{label} has no field named '{name}'")))
    }

    /// Returns the reverse relations of a model.
    pub fn reverse_relations(&self, label: &str) -> &[FieldDef] {
        self.get(label)
            .map_or(&[], |m| m.reverse_relations.as_slice())
    }

    /// Builds a record of the given model from a stored row.
    pub fn build(&self, label: &str, row: &Row) -> LabsResult<Box<dyn Record>> {
        (self.require(label)?.factory)(row)
    }

    /// Returns every registered label in registration order.
    pub fn labels(&self) -> Vec<String> {
        self.models.iter().map(|m| m.meta.label()).collect()
    }

    /// Iterates over the registered models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.models.iter()
    }
}

#[derive(Clone, Copy)]
enum ReverseKind {
    ForeignKey,
    OneToOne,
    ManyToMany,
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::fields::OnDelete;
    use crate::model::Accessor;
    use crate::value::Value;

    struct Team {
        id: i64,
    }

    struct Player {
        id: i64,
        team_id: Option<i64>,
    }

    struct Badge {
        id: i64,
        player_id: i64,
    }

    impl Model for Team {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new("league", "team")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
            });
            &META
        }
        fn accessors() -> &'static [Accessor<Self>] {
            static A: &[Accessor<Team>] = &[Accessor::new("id", |t| Value::from(t.id))];
            A
        }
        fn from_row(row: &Row) -> LabsResult<Self> {
            Ok(Self { id: row.get("id")? })
        }
    }

    impl Model for Player {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new("league", "player")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                    .field(
                        FieldDef::foreign_key("team", "Team", OnDelete::SetNull)
                            .nullable()
                            .related_name("players"),
                    )
            });
            &META
        }
        fn accessors() -> &'static [Accessor<Self>] {
            static A: &[Accessor<Player>] = &[
                Accessor::new("id", |p| Value::from(p.id)),
                Accessor::new("team_id", |p| Value::from(p.team_id)),
            ];
            A
        }
        fn from_row(row: &Row) -> LabsResult<Self> {
            Ok(Self {
                id: row.get("id")?,
                team_id: row.get_or_null("team_id")?,
            })
        }
    }

    impl Model for Badge {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new("league", "badge")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                    .field(FieldDef::new(
                        "player",
                        FieldType::OneToOneField {
                            to: "league.Player".into(),
                            on_delete: OnDelete::Cascade,
                            related_name: None,
                        },
                    ))
            });
            &META
        }
        fn accessors() -> &'static [Accessor<Self>] {
            static A: &[Accessor<Badge>] = &[
                Accessor::new("id", |b| Value::from(b.id)),
                Accessor::new("player_id", |b| Value::from(b.player_id)),
            ];
            A
        }
        fn from_row(row: &Row) -> LabsResult<Self> {
            Ok(Self {
                id: row.get("id")?,
                player_id: row.get("player_id")?,
            })
        }
    }

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.register::<Team>().unwrap();
        registry.register::<Player>().unwrap();
        registry.register::<Badge>().unwrap();
        registry.populate().unwrap();
        registry
    }

    #[test]
    fn test_reverse_relations_are_computed() {
        let registry = registry();
        let players = registry.get_field("league.team", "players").unwrap();
        assert!(matches!(
            &players.field_type,
            FieldType::ReverseForeignKey { from, field } if from == "league.player" && field == "team"
        ));
        assert!(!players.concrete);

        let badge = registry.get_field("league.player", "badge").unwrap();
        assert!(matches!(badge.field_type, FieldType::ReverseOneToOne { .. }));
        assert_eq!(registry.reverse_relations("league.badge").len(), 0);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ModelRegistry::new();
        registry.register::<Team>().unwrap();
        let err = registry.register::<Team>().unwrap_err();
        assert!(matches!(err, LabsError::ImproperlyConfigured(_)));
    }

    #[test]
    fn test_register_after_populate() {
        let mut registry = registry();
        assert!(registry.is_ready());
        assert!(registry.register::<Team>().is_err());
        assert!(registry.populate().is_err());
    }

    #[test]
    fn test_unregistered_target() {
        let mut registry = ModelRegistry::new();
        registry.register::<Player>().unwrap();
        let err = registry.populate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Improperly configured: league.player.team points to 'league.team', which is not registered"
        );
    }

    #[test]
    fn test_build_from_row() {
        let registry = registry();
        let row = Row::from_pairs([("id", Value::Int(3)), ("team_id", Value::Int(1))]);
        let record = registry.build("league.player", &row).unwrap();
        assert_eq!(record.pk_value(), Value::Int(3));
        assert_eq!(record.field_value("team_id"), Some(Value::Int(1)));
        assert!(registry.build("league.coach", &row).is_err());
    }

    #[test]
    fn test_labels_and_accessors() {
        let registry = registry();
        assert_eq!(
            registry.labels(),
            vec!["league.team", "league.player", "league.badge"]
        );
        assert_eq!(
            registry.get("league.player").unwrap().accessor_names,
            vec!["id", "team_id"]
        );
    }
}
