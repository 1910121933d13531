//! Field types and descriptors.
//!
//! A [`FieldType`] says what a field stores; its [`FieldKind`] groups types
//! the way the serialization mixin cares about them (scalar, array,
//! structured, file, relation). A [`FieldDef`] adds the per-model metadata:
//! attribute name, concreteness, nullability, validators.

use crate::validators::Validator;
use crate::value::Value;

/// What a field stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Auto-incrementing integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit primary key.
    BigAutoField,
    /// Bounded string.
    CharField,
    /// Unbounded string.
    TextField,
    /// String validated as an e-mail address.
    EmailField,
    /// Signed integer.
    IntegerField,
    /// Non-negative integer.
    PositiveIntegerField,
    /// Floating-point number.
    FloatField,
    /// Boolean.
    BooleanField,
    /// UTC timestamp.
    DateTimeField,
    /// UUID.
    UuidField,
    /// Arbitrary JSON document.
    JsonField,
    /// Flat string-to-string map.
    HStoreField,
    /// Reference to an uploaded file.
    FileField {
        /// Storage directory prefix.
        upload_to: String,
    },
    /// Reference to an uploaded image.
    ImageField {
        /// Storage directory prefix.
        upload_to: String,
    },
    /// Array of another field type.
    ArrayField {
        /// Element type.
        base_field: Box<FieldType>,
        /// Maximum number of elements.
        size: Option<usize>,
    },
    /// Many-to-one relation stored as a column holding the target's key.
    ForeignKey {
        /// Target model label ("app.model", or "model" within the same app).
        to: String,
        /// What happens to this row when the target is deleted.
        on_delete: OnDelete,
        /// Name of the reverse accessor on the target.
        related_name: Option<String>,
    },
    /// One-to-one relation stored as a unique foreign key column.
    OneToOneField {
        /// Target model label.
        to: String,
        /// What happens to this row when the target is deleted.
        on_delete: OnDelete,
        /// Name of the reverse accessor on the target.
        related_name: Option<String>,
    },
    /// Many-to-many relation through an intermediate model.
    ManyToManyField {
        /// Target model label.
        to: String,
        /// Intermediate model label holding one foreign key to each side.
        through: Option<String>,
        /// Name of the reverse accessor on the target.
        related_name: Option<String>,
    },
    /// Reverse side of a foreign key. Created by the registry.
    ReverseForeignKey {
        /// Label of the model declaring the foreign key.
        from: String,
        /// Name of the foreign key field on `from`.
        field: String,
    },
    /// Reverse side of a one-to-one field. Created by the registry.
    ReverseOneToOne {
        /// Label of the model declaring the one-to-one field.
        from: String,
        /// Name of the one-to-one field on `from`.
        field: String,
    },
    /// Reverse side of a many-to-many field. Created by the registry.
    ReverseManyToMany {
        /// Label of the model declaring the many-to-many field.
        from: String,
        /// Name of the many-to-many field on `from`.
        field: String,
    },
}

/// Behaviour on deletion of a foreign key target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Delete this row too.
    Cascade,
    /// Refuse to delete the target.
    Protect,
    /// Set the column to NULL.
    SetNull,
    /// Leave the dangling key in place.
    DoNothing,
}

/// Cardinality of a relation as seen from the declaring side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// At most one related record.
    ToOne {
        /// `true` for one-to-one relations (forward or reverse).
        one_to_one: bool,
    },
    /// Any number of related records.
    ToMany,
}

/// Coarse classification of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single scalar.
    Scalar,
    /// An array column.
    Array,
    /// A JSON or key/value column.
    Structured,
    /// A file or image reference.
    File,
    /// A relation to other records.
    Relation(RelationKind),
}

impl FieldType {
    /// Returns the coarse kind of this type.
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::ArrayField { .. } => FieldKind::Array,
            Self::JsonField | Self::HStoreField => FieldKind::Structured,
            Self::FileField { .. } | Self::ImageField { .. } => FieldKind::File,
            Self::ForeignKey { .. } => FieldKind::Relation(RelationKind::ToOne { one_to_one: false }),
            Self::OneToOneField { .. } | Self::ReverseOneToOne { .. } => {
                FieldKind::Relation(RelationKind::ToOne { one_to_one: true })
            }
            Self::ManyToManyField { .. }
            | Self::ReverseForeignKey { .. }
            | Self::ReverseManyToMany { .. } => FieldKind::Relation(RelationKind::ToMany),
            _ => FieldKind::Scalar,
        }
    }

    /// Returns `true` for relation types the registry creates automatically.
    pub const fn is_reverse(&self) -> bool {
        matches!(
            self,
            Self::ReverseForeignKey { .. }
                | Self::ReverseOneToOne { .. }
                | Self::ReverseManyToMany { .. }
        )
    }

    /// Returns `true` when this type occupies a column on its own table.
    pub const fn has_column(&self) -> bool {
        !self.is_reverse() && !matches!(self, Self::ManyToManyField { .. })
    }

    /// Returns the label of the model on the other side of a relation.
    pub fn related_model(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { to, .. }
            | Self::OneToOneField { to, .. }
            | Self::ManyToManyField { to, .. } => Some(to),
            Self::ReverseForeignKey { from, .. }
            | Self::ReverseOneToOne { from, .. }
            | Self::ReverseManyToMany { from, .. } => Some(from),
            _ => None,
        }
    }
}

/// A model field descriptor.
#[derive(Debug)]
pub struct FieldDef {
    /// The field name (`community`).
    pub name: String,
    /// The attribute/column name (`community_id` for relations with a column).
    pub attname: String,
    /// What the field stores.
    pub field_type: FieldType,
    /// Whether the field has backing storage on the model's own table.
    pub concrete: bool,
    /// Whether this is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Whether an empty value is allowed.
    pub blank: bool,
    /// Whether values must be unique across the table.
    pub unique: bool,
    /// Default for new instances.
    pub default: Option<Value>,
    /// Maximum string length.
    pub max_length: Option<usize>,
    /// Human-readable name.
    pub verbose_name: String,
    /// Validators run by [`full_clean`](crate::validators::full_clean).
    pub validators: Vec<Box<dyn Validator>>,
}

impl FieldDef {
    /// Creates a descriptor with defaults derived from the type.
    ///
    /// Forward to-one relations get an `_id` attribute name; many-to-many and
    /// reverse relations are non-concrete.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let attname = match field_type {
            FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. } => format!("{name}_id"),
            _ => name.clone(),
        };
        let unique = matches!(field_type, FieldType::OneToOneField { .. });
        Self {
            verbose_name: name.replace('_', " "),
            concrete: field_type.has_column(),
            name,
            attname,
            field_type,
            primary_key: false,
            null: false,
            blank: false,
            unique,
            default: None,
            max_length: None,
            validators: Vec::new(),
        }
    }

    /// Shorthand for a foreign key.
    pub fn foreign_key(name: impl Into<String>, to: impl Into<String>, on_delete: OnDelete) -> Self {
        Self::new(
            name,
            FieldType::ForeignKey {
                to: to.into(),
                on_delete,
                related_name: None,
            },
        )
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self
    }

    /// Allows NULL.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Allows empty values.
    #[must_use]
    pub const fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Requires unique values.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the maximum string length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the human-readable name.
    #[must_use]
    pub fn verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = name.into();
        self
    }

    /// Sets the reverse accessor name for relation fields.
    #[must_use]
    pub fn related_name(mut self, related: impl Into<String>) -> Self {
        match &mut self.field_type {
            FieldType::ForeignKey { related_name, .. }
            | FieldType::OneToOneField { related_name, .. }
            | FieldType::ManyToManyField { related_name, .. } => *related_name = Some(related.into()),
            _ => {}
        }
        self
    }

    /// Adds a validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Returns the coarse kind of this field.
    pub const fn kind(&self) -> FieldKind {
        self.field_type.kind()
    }

    /// Returns the relation cardinality, or `None` for non-relations.
    pub const fn relation(&self) -> Option<RelationKind> {
        match self.field_type.kind() {
            FieldKind::Relation(kind) => Some(kind),
            _ => None,
        }
    }

    /// Returns `true` for relation fields.
    pub const fn is_relation(&self) -> bool {
        self.relation().is_some()
    }

    /// Returns `true` if `name` is this field's name or attribute name.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.attname == name
    }
}
