//! Data-access trait and typed model helpers.
//!
//! [`DbExecutor`] is the minimal interface the relation traversal, the
//! serialization mixin and the admin need from a data layer. Every method
//! that touches stored rows is one round trip and is recorded on the
//! executor's [`QueryLog`]. Records come back as `Box<dyn Record>`; the free
//! functions at the bottom downcast them for callers that know the type.

use ormlabs_core::{LabsError, LabsResult};

use crate::model::{Model, Record};
use crate::query::{AggregateFunc, Expression, Q};
use crate::query_log::QueryLog;
use crate::registry::ModelRegistry;
use crate::related::ThroughLink;
use crate::row::Row;
use crate::value::Value;

/// A synchronous data layer over registered models.
///
/// Models are addressed by label (`"labs.member"`).
pub trait DbExecutor: Send + Sync {
    /// Returns the registry the executor builds records with.
    fn registry(&self) -> &ModelRegistry;

    /// Returns the log every round trip is recorded on.
    fn query_log(&self) -> &QueryLog;

    /// Fetches one record by primary key.
    ///
    /// Returns `DoesNotExist` if no row matches.
    fn get(&self, model: &str, pk: &Value) -> LabsResult<Box<dyn Record>>;

    /// Fetches the records whose `attname` column equals `value`.
    fn filter(&self, model: &str, attname: &str, value: &Value) -> LabsResult<Vec<Box<dyn Record>>>;

    /// Fetches the records whose `attname` column is one of `values`.
    fn filter_in(
        &self,
        model: &str,
        attname: &str,
        values: &[Value],
    ) -> LabsResult<Vec<Box<dyn Record>>>;

    /// Fetches every record of a model, in the model's default ordering.
    fn all(&self, model: &str) -> LabsResult<Vec<Box<dyn Record>>>;

    /// Stores a row and returns its primary key.
    fn insert(&self, model: &str, row: Row) -> LabsResult<Value>;

    /// Fetches the records matching `condition`, in the model's default ordering.
    fn filter_where(&self, model: &str, condition: &Q) -> LabsResult<Vec<Box<dyn Record>>>;

    /// Counts the rows matching `condition`.
    fn count_where(&self, model: &str, condition: &Q) -> LabsResult<usize>;

    /// Reads the value at `path` from every row matching `condition`.
    fn values_list(&self, model: &str, condition: &Q, path: &str) -> LabsResult<Vec<Value>>;

    /// Aggregates `expr` over the rows matching `condition`.
    fn aggregate(
        &self,
        model: &str,
        condition: &Q,
        func: AggregateFunc,
        expr: &Expression,
    ) -> LabsResult<Value>;

    /// Aggregates `expr` per distinct value of `group`, ordered by that value.
    fn aggregate_by(
        &self,
        model: &str,
        condition: &Q,
        group: &str,
        func: AggregateFunc,
        expr: &Expression,
    ) -> LabsResult<Vec<(Value, Value)>>;

    /// Stores several rows in one statement and returns their primary keys.
    ///
    /// Either every row is stored or none is.
    fn bulk_insert(&self, model: &str, rows: Vec<Row>) -> LabsResult<Vec<Value>>;

    /// Overwrites the stored row with the same primary key.
    ///
    /// Returns `DoesNotExist` if there is none.
    fn save(&self, model: &str, row: Row) -> LabsResult<()>;

    /// Sets columns on every row matching `condition` and returns how many
    /// rows changed. Each expression is computed against the row as it was
    /// before the statement.
    fn update_where(
        &self,
        model: &str,
        condition: &Q,
        assignments: &[(&str, Expression)],
    ) -> LabsResult<usize>;

    /// Deletes the rows matching `condition` and returns how many were
    /// removed, not counting cascaded rows.
    ///
    /// Rows of other models pointing at a deleted row follow the foreign
    /// key's `on_delete`.
    fn delete_where(&self, model: &str, condition: &Q) -> LabsResult<usize>;

    /// Fetches the `target` records linked to `pk` through an intermediate model.
    ///
    /// The default reads the intermediate rows and then the targets, two round
    /// trips. Backends that can join do it in one.
    fn filter_through(
        &self,
        link: &ThroughLink,
        pk: &Value,
    ) -> LabsResult<Vec<Box<dyn Record>>> {
        let links = self.filter(&link.through, &link.source_attname, pk)?;
        let targets: Vec<Value> = links
            .iter()
            .filter_map(|r| r.field_value(&link.target_attname))
            .filter(|v| !v.is_null())
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let pk_attname = self
            .registry()
            .meta(&link.target)?
            .pk_field()
            .map_or_else(|| "id".to_string(), |f| f.attname.clone());
        self.filter_in(&link.target, &pk_attname, &targets)
    }
}

/// Downcasts a record to its concrete type.
pub fn downcast<M: Model>(record: Box<dyn Record>) -> LabsResult<M> {
    let label = record.label();
    record.into_any().downcast::<M>().map(|m| *m).map_err(|_| {
        LabsError::DatabaseError(format!(
            "Expected a {} record, got {label}",
            M::meta().label()
        ))
    })
}

/// Fetches one instance of `M` by primary key.
pub fn get_model<M: Model>(db: &dyn DbExecutor, pk: impl Into<Value>) -> LabsResult<M> {
    downcast(db.get(&M::meta().label(), &pk.into())?)
}

/// Fetches every instance of `M`.
pub fn all_models<M: Model>(db: &dyn DbExecutor) -> LabsResult<Vec<M>> {
    db.all(&M::meta().label())?
        .into_iter()
        .map(downcast::<M>)
        .collect()
}

/// Stores an instance of `M` and returns its primary key.
pub fn create_model<M: Model>(db: &dyn DbExecutor, instance: &M) -> LabsResult<Value> {
    db.insert(&M::meta().label(), instance.to_row())
}

/// Fetches the instances of `M` matching `condition`.
pub fn filter_models<M: Model>(db: &dyn DbExecutor, condition: &Q) -> LabsResult<Vec<M>> {
    db.filter_where(&M::meta().label(), condition)?
        .into_iter()
        .map(downcast::<M>)
        .collect()
}

/// Writes an existing instance of `M` back.
pub fn save_model<M: Model>(db: &dyn DbExecutor, instance: &M) -> LabsResult<()> {
    db.save(&M::meta().label(), instance.to_row())
}
