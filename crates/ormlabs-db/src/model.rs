//! Model trait and metadata.
//!
//! A model type declares its schema once, as a static [`ModelMeta`], and its
//! attribute reads once, as a static table of [`Accessor`]s. Everything that
//! inspects records at runtime (serialization, validation, the admin) goes
//! through those two tables instead of looking attributes up by name on the
//! struct.
//!
//! [`Record`] is the object-safe face of a [`Model`]: the data layer hands
//! out `Box<dyn Record>` so one code path can walk relations across types.

use std::any::Any;

use ormlabs_core::LabsResult;

use crate::fields::FieldDef;
use crate::row::Row;
use crate::value::Value;

/// Schema of a model type.
#[derive(Debug)]
pub struct ModelMeta {
    /// The application label (e.g. "labs").
    pub app_label: &'static str,
    /// The model name in lowercase (e.g. "member").
    pub model_name: &'static str,
    /// The storage table name.
    pub db_table: String,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Human-readable plural name.
    pub verbose_name_plural: String,
    /// Default ordering; a leading `-` means descending.
    pub ordering: Vec<&'static str>,
    /// Sets of fields that must be unique together.
    pub unique_together: Vec<Vec<&'static str>>,
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Field names left out of every serialized projection.
    pub serialize_exclude: Vec<&'static str>,
}

impl ModelMeta {
    /// Creates metadata with the conventional table and verbose names.
    ///
    /// ```
    /// use ormlabs_db::model::ModelMeta;
    ///
    /// let meta = ModelMeta::new("labs", "community");
    /// assert_eq!(meta.db_table, "labs_community");
    /// assert_eq!(meta.label(), "labs.community");
    /// assert_eq!(meta.verbose_name, "community");
    /// ```
    pub fn new(app_label: &'static str, model_name: &'static str) -> Self {
        Self {
            app_label,
            model_name,
            db_table: format!("{app_label}_{model_name}"),
            verbose_name: model_name.to_string(),
            verbose_name_plural: format!("{model_name}s"),
            ordering: Vec::new(),
            unique_together: Vec::new(),
            fields: Vec::new(),
            serialize_exclude: Vec::new(),
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the plural verbose name.
    #[must_use]
    pub fn verbose_name_plural(mut self, name: impl Into<String>) -> Self {
        self.verbose_name_plural = name.into();
        self
    }

    /// Sets the default ordering.
    #[must_use]
    pub fn ordering(mut self, ordering: &[&'static str]) -> Self {
        self.ordering = ordering.to_vec();
        self
    }

    /// Adds a unique-together constraint.
    #[must_use]
    pub fn unique_together(mut self, fields: &[&'static str]) -> Self {
        self.unique_together.push(fields.to_vec());
        self
    }

    /// Sets the names excluded from serialization.
    #[must_use]
    pub fn serialize_exclude(mut self, names: &[&'static str]) -> Self {
        self.serialize_exclude = names.to_vec();
        self
    }

    /// Returns the `app_label.model_name` label.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Finds a declared field by name or attribute name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.answers_to(name))
    }

    /// Iterates over the fields with their own storage.
    pub fn concrete_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.concrete)
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Returns `true` if `field` is in the excluded set, by name or attribute name.
    pub fn is_excluded(&self, field: &FieldDef) -> bool {
        self.serialize_exclude
            .iter()
            .any(|name| field.answers_to(name))
    }
}

/// A typed getter for one attribute of a model.
pub struct Accessor<M> {
    /// The attribute name the getter answers for.
    pub attname: &'static str,
    /// Reads the attribute.
    pub get: fn(&M) -> Value,
}

impl<M> Accessor<M> {
    /// Creates an accessor.
    pub const fn new(attname: &'static str, get: fn(&M) -> Value) -> Self {
        Self { attname, get }
    }
}

impl<M> std::fmt::Debug for Accessor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("attname", &self.attname)
            .finish_non_exhaustive()
    }
}

/// A model type.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
///
/// use ormlabs_core::LabsResult;
/// use ormlabs_db::fields::{FieldDef, FieldType};
/// use ormlabs_db::model::{Accessor, Model, ModelMeta};
/// use ormlabs_db::row::Row;
/// use ormlabs_db::value::Value;
///
/// struct Community {
///     id: i64,
///     name: String,
/// }
///
/// impl Model for Community {
///     fn meta() -> &'static ModelMeta {
///         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
///             ModelMeta::new("labs", "community")
///                 .field(FieldDef::new("id", FieldType::AutoField).primary_key())
///                 .field(FieldDef::new("name", FieldType::CharField).max_length(20))
///         });
///         &META
///     }
///
///     fn accessors() -> &'static [Accessor<Self>] {
///         static ACCESSORS: &[Accessor<Community>] = &[
///             Accessor::new("id", |c| Value::from(c.id)),
///             Accessor::new("name", |c| Value::from(c.name.as_str())),
///         ];
///         ACCESSORS
///     }
///
///     fn from_row(row: &Row) -> LabsResult<Self> {
///         Ok(Self { id: row.get("id")?, name: row.get("name")? })
///     }
/// }
///
/// let c = Community { id: 1, name: "PyDevs".into() };
/// assert_eq!(c.pk(), Value::Int(1));
/// assert_eq!(c.value("name"), Some(Value::from("PyDevs")));
/// ```
pub trait Model: Send + Sync + Sized + 'static {
    /// Returns the static schema of this type.
    fn meta() -> &'static ModelMeta;

    /// Returns the static accessor table of this type.
    fn accessors() -> &'static [Accessor<Self>];

    /// Builds an instance from a stored row.
    fn from_row(row: &Row) -> LabsResult<Self>;

    /// Reads an attribute through the accessor table.
    fn value(&self, attname: &str) -> Option<Value> {
        Self::accessors()
            .iter()
            .find(|a| a.attname == attname)
            .map(|a| (a.get)(self))
    }

    /// Returns the primary key, or NULL if the type declares none.
    fn pk(&self) -> Value {
        Self::meta()
            .pk_field()
            .and_then(|f| self.value(&f.attname))
            .unwrap_or(Value::Null)
    }

    /// Converts the instance into a storable row, one column per accessor.
    fn to_row(&self) -> Row {
        Row::from_pairs(
            Self::accessors()
                .iter()
                .map(|a| (a.attname, (a.get)(self))),
        )
    }

    /// Human-readable representation, used by the admin.
    fn display(&self) -> String {
        format!("{} object ({})", Self::meta().verbose_name, self.pk())
    }
}

/// An object-safe view of any model instance.
pub trait Record: Send + Sync + 'static {
    /// Returns the schema of the record's type.
    fn record_meta(&self) -> &'static ModelMeta;

    /// Reads an attribute by attribute name.
    fn field_value(&self, attname: &str) -> Option<Value>;

    /// Returns the primary key.
    fn pk_value(&self) -> Value;

    /// Returns the human-readable representation.
    fn describe(&self) -> String;

    /// Upcasts for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Upcasts an owned record for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Views the record as a trait object.
    fn as_record(&self) -> &dyn Record;

    /// Returns the `app_label.model_name` label of the record's type.
    fn label(&self) -> String {
        self.record_meta().label()
    }
}

impl<M: Model> Record for M {
    fn record_meta(&self) -> &'static ModelMeta {
        M::meta()
    }

    fn field_value(&self, attname: &str) -> Option<Value> {
        self.value(attname)
    }

    fn pk_value(&self) -> Value {
        self.pk()
    }

    fn describe(&self) -> String {
        self.display()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_record(&self) -> &dyn Record {
        self
    }
}

impl std::fmt::Debug for dyn Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}: {}>", self.label(), self.describe())
    }
}
