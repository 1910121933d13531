//! In-process data layer.
//!
//! [`MemoryDatabase`] stores rows per model label and implements
//! [`DbExecutor`]. It does not parse SQL. Each call builds the statement it
//! stands for, performs the equivalent work on the stored rows, and records
//! one [`QueryEvent`] carrying that statement and the elapsed time, so query
//! counts and timings behave like a real backend's.
//!
//! Foreign keys are not enforced on write: a row may point at a key that
//! does not exist, and resolving it yields `DoesNotExist`. Deleting a row
//! does apply the `on_delete` of the foreign keys pointing at it, inside the
//! same round trip. Primary keys, `unique` fields and `unique_together` sets
//! are enforced on insert, save and update; a statement that breaks one
//! leaves the tables untouched.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use ormlabs_core::{LabsError, LabsResult, Settings};

use crate::executor::DbExecutor;
use crate::fields::{FieldDef, FieldType, OnDelete};
use crate::model::{ModelMeta, Record};
use crate::query::path::{column_sql, join_sql, literal, literal_list};
use crate::query::{AggregateFunc, Expression, RowSource, Scope, Q};
use crate::query_log::{QueryEvent, QueryLog};
use crate::registry::ModelRegistry;
use crate::related::{through_link, ThroughLink};
use crate::row::Row;
use crate::value::{compare_values, Value};

#[derive(Debug, Clone)]
struct ModelTable {
    rows: Vec<Row>,
    next_id: i64,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }
}

/// A record loaded together with related records.
///
/// Produced by [`MemoryDatabase::select_related`] and
/// [`MemoryDatabase::prefetch_related`]; reading the cached relations costs
/// no further round trips.
#[derive(Debug)]
pub struct Loaded {
    /// The record itself.
    pub record: Box<dyn Record>,
    to_one: BTreeMap<String, Option<Box<dyn Record>>>,
    to_many: BTreeMap<String, Vec<Box<dyn Record>>>,
}

impl Loaded {
    fn new(record: Box<dyn Record>) -> Self {
        Self {
            record,
            to_one: BTreeMap::new(),
            to_many: BTreeMap::new(),
        }
    }

    /// Returns the cached target of a to-one relation.
    ///
    /// `None` means the relation was not loaded or points nowhere.
    pub fn related_one(&self, name: &str) -> Option<&dyn Record> {
        self.to_one.get(name).and_then(|r| r.as_deref())
    }

    /// Returns the cached records of a to-many relation.
    pub fn related_many(&self, name: &str) -> &[Box<dyn Record>] {
        self.to_many.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if `name` was loaded, whatever it resolved to.
    pub fn is_cached(&self, name: &str) -> bool {
        self.to_one.contains_key(name) || self.to_many.contains_key(name)
    }
}

/// An in-memory [`DbExecutor`].
///
/// ```
/// use ormlabs_db::memory::MemoryDatabase;
/// use ormlabs_db::registry::ModelRegistry;
///
/// let db = MemoryDatabase::new(ModelRegistry::new()).unwrap();
/// assert_eq!(db.query_count(), 0);
/// ```
#[derive(Debug)]
pub struct MemoryDatabase {
    registry: ModelRegistry,
    tables: RwLock<HashMap<String, ModelTable>>,
    log: QueryLog,
}

fn q(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn pk_attname(meta: &ModelMeta) -> &str {
    meta.pk_field().map_or("id", |f| f.attname.as_str())
}

fn column_list(meta: &ModelMeta) -> String {
    meta.concrete_fields()
        .map(|f| format!("{}.{}", q(&meta.db_table), q(&f.attname)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_clause(meta: &ModelMeta) -> String {
    if meta.ordering.is_empty() {
        return String::new();
    }
    let terms: Vec<String> = meta
        .ordering
        .iter()
        .map(|o| match o.strip_prefix('-') {
            Some(name) => format!("{} DESC", q(name)),
            None => format!("{} ASC", q(o)),
        })
        .collect();
    format!(" ORDER BY {}", terms.join(", "))
}

fn sort_rows<R: Borrow<Row>>(meta: &ModelMeta, rows: &mut [R]) {
    for term in meta.ordering.iter().rev() {
        let (name, descending) = term
            .strip_prefix('-')
            .map_or((*term, false), |n| (n, true));
        let attname = meta
            .get_field(name)
            .map_or(name, |f| f.attname.as_str());
        rows.sort_by(|a, b| {
            let ord = compare_values(
                a.borrow().get_value(attname).unwrap_or(&Value::Null),
                b.borrow().get_value(attname).unwrap_or(&Value::Null),
            );
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}

fn column_equals(row: &Row, attname: &str, value: &Value) -> bool {
    row.get_value(attname).unwrap_or(&Value::Null) == value && !value.is_null()
}

/// Fills the concrete columns of `row`, taking field defaults for missing
/// and NULL values.
fn with_defaults(meta: &ModelMeta, row: &Row) -> Row {
    let mut full = Row::default();
    for field in meta.concrete_fields() {
        let value = row
            .get_value(&field.attname)
            .cloned()
            .filter(|v| !v.is_null())
            .or_else(|| field.default.clone())
            .unwrap_or(Value::Null);
        full.set(field.attname.clone(), value);
    }
    full
}

/// Gives `row` the next automatic key when it has none and returns its key.
fn assign_pk(meta: &ModelMeta, table: &mut ModelTable, row: &mut Row) -> Value {
    let pk_name = pk_attname(meta).to_string();
    let auto_pk = meta.pk_field().is_some_and(|f| {
        matches!(f.field_type, FieldType::AutoField | FieldType::BigAutoField)
    });
    if auto_pk {
        match row.get_value(&pk_name).and_then(Value::as_int) {
            Some(id) => table.next_id = table.next_id.max(id + 1),
            None => {
                row.set(pk_name.clone(), Value::Int(table.next_id));
                table.next_id += 1;
            }
        }
    }
    row.get_value(&pk_name).cloned().unwrap_or(Value::Null)
}

fn insert_sql(meta: &ModelMeta, rows: &[Row]) -> String {
    let columns: Vec<String> = meta.concrete_fields().map(|f| q(&f.attname)).collect();
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<Value> = row.iter().map(|(_, v)| v.clone()).collect();
            format!("({})", literal_list(&values))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        q(&meta.db_table),
        columns.join(", "),
        tuples.join(", ")
    )
}

/// Evaluates conditions against the locked tables.
struct TablesSource<'a> {
    registry: &'a ModelRegistry,
    tables: &'a HashMap<String, ModelTable>,
}

impl<'a> TablesSource<'a> {
    const fn new(registry: &'a ModelRegistry, tables: &'a HashMap<String, ModelTable>) -> Self {
        Self { registry, tables }
    }

    fn rows(&self, meta: &ModelMeta) -> &'a [Row] {
        self.tables
            .get(&meta.label())
            .map_or(&[], |t| t.rows.as_slice())
    }

    fn scope<'s>(&'s self, meta: &'s ModelMeta, row: &'s Row) -> Scope<'s> {
        Scope::new(self, meta, row)
    }

    /// Indices of the rows of `meta` matching `condition`, in storage order.
    fn matching(&self, meta: &ModelMeta, condition: &Q) -> Vec<usize> {
        self.rows(meta)
            .iter()
            .enumerate()
            .filter(|(_, row)| condition.matches(&self.scope(meta, row)))
            .map(|(i, _)| i)
            .collect()
    }

    /// The rows of `meta` matching `condition`, in the model's ordering.
    fn select(&self, meta: &ModelMeta, condition: &Q) -> Vec<&'a Row> {
        let rows = self.rows(meta);
        let mut hits: Vec<&Row> = self
            .matching(meta, condition)
            .into_iter()
            .filter_map(|i| rows.get(i))
            .collect();
        sort_rows(meta, &mut hits);
        hits
    }
}

impl RowSource for TablesSource<'_> {
    fn registry(&self) -> &ModelRegistry {
        self.registry
    }

    fn related_row(&self, model: &str, pk: &Value) -> Option<&Row> {
        let meta = self.registry.meta(model).ok()?;
        let pk_name = pk_attname(meta);
        self.tables
            .get(model)?
            .rows
            .iter()
            .find(|r| column_equals(r, pk_name, pk))
    }
}

impl MemoryDatabase {
    /// Creates a database over `registry`, populating it if needed.
    pub fn new(mut registry: ModelRegistry) -> LabsResult<Self> {
        if !registry.is_ready() {
            registry.populate()?;
        }
        Ok(Self {
            registry,
            tables: RwLock::new(HashMap::new()),
            log: QueryLog::new(),
        })
    }

    /// Creates a database whose query recording follows `settings`.
    ///
    /// In debug mode statements are logged reindented.
    pub fn from_settings(registry: ModelRegistry, settings: &Settings) -> LabsResult<Self> {
        let db = Self::new(registry)?;
        db.log.set_enabled(settings.record_queries);
        db.log.set_pretty(settings.debug);
        tracing::debug!(
            name = settings.default_database().map_or("default", |d| d.name.as_str()),
            record_queries = settings.record_queries,
            "memory database ready"
        );
        Ok(db)
    }

    /// Returns the cumulative round-trip count.
    pub fn query_count(&self) -> usize {
        self.log.count()
    }

    /// Returns the number of stored rows of a model. Not a round trip.
    pub fn row_count(&self, model: &str) -> LabsResult<usize> {
        Ok(self.read()?.get(model).map_or(0, |t| t.rows.len()))
    }

    /// Removes every stored row. Not a round trip.
    pub fn flush(&self) -> LabsResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(&self) -> LabsResult<RwLockReadGuard<'_, HashMap<String, ModelTable>>> {
        self.tables
            .read()
            .map_err(|e: PoisonError<_>| LabsError::DatabaseError(format!("table lock poisoned: {e}")))
    }

    fn write(&self) -> LabsResult<RwLockWriteGuard<'_, HashMap<String, ModelTable>>> {
        self.tables
            .write()
            .map_err(|e: PoisonError<_>| LabsError::DatabaseError(format!("table lock poisoned: {e}")))
    }

    /// Runs `work` as one round trip recorded under `sql`.
    ///
    /// The event is recorded whether or not the work succeeds, as a failed
    /// statement still costs a round trip.
    fn round_trip<T>(&self, sql: String, work: impl FnOnce() -> LabsResult<T>) -> LabsResult<T> {
        let started = Instant::now();
        let result = work();
        self.log.record(QueryEvent::new(sql, started.elapsed()));
        result
    }

    fn select_rows(
        &self,
        meta: &ModelMeta,
        predicate: impl Fn(&Row) -> bool,
    ) -> LabsResult<Vec<Row>> {
        let tables = self.read()?;
        let mut rows: Vec<Row> = tables
            .get(&meta.label())
            .map(|t| t.rows.iter().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default();
        sort_rows(meta, &mut rows);
        Ok(rows)
    }

    fn build_all(&self, label: &str, rows: &[Row]) -> LabsResult<Vec<Box<dyn Record>>> {
        rows.iter().map(|r| self.registry.build(label, r)).collect()
    }

    fn to_one_field<'a>(&'a self, label: &str, name: &str) -> LabsResult<&'a FieldDef> {
        let is_forward_to_one = |f: &FieldDef| {
            matches!(
                f.field_type,
                FieldType::ForeignKey { .. } | FieldType::OneToOneField { .. }
            )
        };
        let meta = self.registry.meta(label)?;
        meta.get_field(name)
            .filter(|f| is_forward_to_one(*f))
            .ok_or_else(|| {
                let choices: Vec<&str> = meta
                    .fields
                    .iter()
                    .filter(|f| is_forward_to_one(*f))
                    .map(|f| f.name.as_str())
                    .collect();
                LabsError::FieldError(format!(
                    "Invalid field name(s) given in select_related: '{name}'. Choices are: {}",
                    choices.join(", ")
                ))
            })
    }

    /// Fetches every record of `model` with the named forward to-one
    /// relations joined in, in one round trip.
    ///
    /// # Errors
    ///
    /// Returns `FieldError` if a name is not a forward foreign key or
    /// one-to-one field of `model`.
    pub fn select_related(&self, model: &str, relations: &[&str]) -> LabsResult<Vec<Loaded>> {
        let meta = self.registry.meta(model)?;
        let mut joins = Vec::new();
        let mut columns = vec![column_list(meta)];
        let mut targets = Vec::new();
        for name in relations {
            let field = self.to_one_field(model, name)?;
            let target = field
                .field_type
                .related_model()
                .map(|to| ModelRegistry::resolve_label(meta.app_label, to))
                .unwrap_or_default();
            let target_meta = self.registry.meta(&target)?;
            let join = if field.null { "LEFT OUTER JOIN" } else { "INNER JOIN" };
            joins.push(format!(
                " {join} {} ON ({}.{} = {}.{})",
                q(&target_meta.db_table),
                q(&meta.db_table),
                q(&field.attname),
                q(&target_meta.db_table),
                q(pk_attname(target_meta)),
            ));
            columns.push(column_list(target_meta));
            targets.push((field, target, target_meta));
        }
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            columns.join(", "),
            q(&meta.db_table),
            joins.concat(),
            order_clause(meta)
        );

        self.round_trip(sql, || {
            let rows = self.select_rows(meta, |_| true)?;
            let tables = self.read()?;
            let mut loaded = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut item = Loaded::new(self.registry.build(model, row)?);
                for (field, target, target_meta) in &targets {
                    let key = row.get_value(&field.attname).unwrap_or(&Value::Null);
                    let hit = tables.get(target).and_then(|t| {
                        t.rows
                            .iter()
                            .find(|r| column_equals(r, pk_attname(target_meta), key))
                    });
                    let related = hit.map(|r| self.registry.build(target, r)).transpose()?;
                    item.to_one.insert(field.name.clone(), related);
                }
                loaded.push(item);
            }
            Ok(loaded)
        })
    }

    /// Fetches every record of `model` and then, one round trip per name, the
    /// records of each named relation.
    ///
    /// Any relation kind is accepted. To-one relations land in
    /// [`Loaded::related_one`], to-many ones in [`Loaded::related_many`].
    pub fn prefetch_related(&self, model: &str, relations: &[&str]) -> LabsResult<Vec<Loaded>> {
        let mut loaded: Vec<Loaded> = self
            .all(model)?
            .into_iter()
            .map(Loaded::new)
            .collect();
        for name in relations {
            let field = self.registry.get_field(model, name)?;
            self.prefetch_one(model, field, &mut loaded)?;
        }
        Ok(loaded)
    }

    fn prefetch_one(&self, model: &str, field: &FieldDef, loaded: &mut [Loaded]) -> LabsResult<()> {
        let meta = self.registry.meta(model)?;
        match &field.field_type {
            FieldType::ForeignKey { to, .. } | FieldType::OneToOneField { to, .. } => {
                let target = ModelRegistry::resolve_label(meta.app_label, to);
                let target_meta = self.registry.meta(&target)?;
                let target_pk = pk_attname(target_meta);
                let keys: Vec<Value> = loaded
                    .iter()
                    .filter_map(|l| l.record.field_value(&field.attname))
                    .filter(|v| !v.is_null())
                    .collect();
                let rows = self.filter_rows(target_meta, target_pk, &keys)?;
                for item in loaded.iter_mut() {
                    let key = item.record.field_value(&field.attname).unwrap_or(Value::Null);
                    let related = rows
                        .iter()
                        .find(|r| column_equals(r, target_pk, &key))
                        .map(|r| self.registry.build(&target, r))
                        .transpose()?;
                    item.to_one.insert(field.name.clone(), related);
                }
            }
            FieldType::ReverseForeignKey { from, field: name }
            | FieldType::ReverseOneToOne { from, field: name } => {
                let attname = self.registry.get_field(from, name)?.attname.clone();
                let pks: Vec<Value> = loaded.iter().map(|l| l.record.pk_value()).collect();
                let rows = self.filter_rows(self.registry.meta(from)?, &attname, &pks)?;
                let one_to_one = matches!(field.field_type, FieldType::ReverseOneToOne { .. });
                for item in loaded.iter_mut() {
                    let pk = item.record.pk_value();
                    let mine = rows
                        .iter()
                        .filter(|r| column_equals(r, &attname, &pk))
                        .map(|r| self.registry.build(from, r))
                        .collect::<LabsResult<Vec<_>>>()?;
                    if one_to_one {
                        item.to_one.insert(field.name.clone(), mine.into_iter().next());
                    } else {
                        item.to_many.insert(field.name.clone(), mine);
                    }
                }
            }
            FieldType::ManyToManyField { .. } | FieldType::ReverseManyToMany { .. } => {
                let link = through_link(&self.registry, model, field)?;
                let pks: Vec<Value> = loaded.iter().map(|l| l.record.pk_value()).collect();
                let pairs = self.fetch_through(&link, &pks)?;
                for item in loaded.iter_mut() {
                    let pk = item.record.pk_value();
                    let mut mine = Vec::new();
                    for (source, row) in &pairs {
                        if *source == pk {
                            mine.push(self.registry.build(&link.target, row)?);
                        }
                    }
                    item.to_many.insert(field.name.clone(), mine);
                }
            }
            _ => {
                return Err(LabsError::FieldError(format!(
                    "'{}' does not resolve to a related object of {model}",
                    field.name
                )))
            }
        }
        Ok(())
    }

    /// Reads the rows whose `attname` column is one of `values`, as one round trip.
    fn filter_rows(&self, meta: &ModelMeta, attname: &str, values: &[Value]) -> LabsResult<Vec<Row>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}.{} IN ({}){}",
            column_list(meta),
            q(&meta.db_table),
            q(&meta.db_table),
            q(attname),
            literal_list(values),
            order_clause(meta)
        );
        self.round_trip(sql, || {
            self.select_rows(meta, |r| values.iter().any(|v| column_equals(r, attname, v)))
        })
    }

    /// Reads `(source pk, target row)` pairs for a many-to-many link in one
    /// joined round trip.
    fn fetch_through(&self, link: &ThroughLink, sources: &[Value]) -> LabsResult<Vec<(Value, Row)>> {
        let through_meta = self.registry.meta(&link.through)?;
        let target_meta = self.registry.meta(&link.target)?;
        let target_pk = pk_attname(target_meta);
        let sql = format!(
            "SELECT {}.{}, {} FROM {} INNER JOIN {} ON ({}.{} = {}.{}) WHERE {}.{} IN ({}){}",
            q(&through_meta.db_table),
            q(&link.source_attname),
            column_list(target_meta),
            q(&target_meta.db_table),
            q(&through_meta.db_table),
            q(&target_meta.db_table),
            q(target_pk),
            q(&through_meta.db_table),
            q(&link.target_attname),
            q(&through_meta.db_table),
            q(&link.source_attname),
            literal_list(sources),
            order_clause(target_meta),
        );
        self.round_trip(sql, || {
            let links = self.select_rows(through_meta, |r| {
                sources.iter().any(|s| column_equals(r, &link.source_attname, s))
            })?;
            let targets = self.select_rows(target_meta, |_| true)?;
            let mut pairs = Vec::new();
            for target in &targets {
                for row in &links {
                    let pointed = row.get_value(&link.target_attname).unwrap_or(&Value::Null);
                    if column_equals(target, target_pk, pointed) {
                        let source = row
                            .get_value(&link.source_attname)
                            .cloned()
                            .unwrap_or(Value::Null);
                        pairs.push((source, target.clone()));
                    }
                }
            }
            Ok(pairs)
        })
    }

    /// Runs `work` as one transaction.
    ///
    /// If `work` fails every table is put back the way it was before the
    /// call. Opening and committing the transaction are not round trips.
    pub fn atomic<T>(&self, work: impl FnOnce(&Self) -> LabsResult<T>) -> LabsResult<T> {
        let snapshot = self.read()?.clone();
        match work(self) {
            Ok(value) => {
                tracing::debug!(target: "ormlabs::db::transaction", "committed");
                Ok(value)
            }
            Err(e) => {
                *self.write()? = snapshot;
                tracing::debug!(target: "ormlabs::db::transaction", error = %e, "rolled back");
                Err(e)
            }
        }
    }

    /// Renders the joins and `WHERE` clause for `condition` plus `extra` paths.
    fn from_clause(&self, meta: &ModelMeta, condition: &Q, extra: &[&str]) -> String {
        let mut paths = condition.paths();
        paths.extend_from_slice(extra);
        format!(
            "{}{}",
            join_sql(&self.registry, meta, paths),
            condition.where_sql(&self.registry, meta)
        )
    }

    /// Removes the rows of `meta` at `indices` from `tables` and applies the
    /// `on_delete` of every foreign key pointing at them.
    fn delete_indices(
        &self,
        tables: &mut HashMap<String, ModelTable>,
        meta: &ModelMeta,
        indices: &[usize],
    ) -> LabsResult<()> {
        let label = meta.label();
        let pk_name = pk_attname(meta);
        let Some(table) = tables.get_mut(&label) else {
            return Ok(());
        };
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        let mut pks = Vec::with_capacity(doomed.len());
        let mut position = 0;
        table.rows.retain(|row| {
            let hit = doomed.contains(&position);
            position += 1;
            if hit {
                pks.push(row.get_value(pk_name).cloned().unwrap_or(Value::Null));
            }
            !hit
        });

        for relation in self.registry.reverse_relations(&label) {
            let (FieldType::ReverseForeignKey { from, field }
            | FieldType::ReverseOneToOne { from, field }) = &relation.field_type
            else {
                continue;
            };
            let fk = self.registry.get_field(from, field)?;
            let on_delete = match &fk.field_type {
                FieldType::ForeignKey { on_delete, .. } | FieldType::OneToOneField { on_delete, .. } => {
                    *on_delete
                }
                _ => continue,
            };
            let from_meta = self.registry.meta(from)?;
            let Some(children) = tables.get_mut(from) else {
                continue;
            };
            let hits: Vec<usize> = children
                .rows
                .iter()
                .enumerate()
                .filter(|(_, r)| pks.iter().any(|pk| column_equals(r, &fk.attname, pk)))
                .map(|(i, _)| i)
                .collect();
            if hits.is_empty() {
                continue;
            }
            match on_delete {
                OnDelete::Protect => {
                    return Err(LabsError::IntegrityError(format!(
                        "Cannot delete some {label} records because they are referenced through \
                         the protected foreign key {from}.{field}"
                    )))
                }
                OnDelete::SetNull if !fk.null => {
                    return Err(LabsError::IntegrityError(format!(
                        "NOT NULL constraint failed: {}.{}",
                        from_meta.db_table, fk.attname
                    )))
                }
                OnDelete::SetNull => {
                    for i in hits {
                        if let Some(row) = children.rows.get_mut(i) {
                            row.set(fk.attname.clone(), Value::Null);
                        }
                    }
                }
                OnDelete::DoNothing => {}
                OnDelete::Cascade => self.delete_indices(tables, from_meta, &hits)?,
            }
        }
        Ok(())
    }

    /// Checks `row` against the unique constraints of `existing`, ignoring
    /// the row at index `skip`.
    fn check_unique(meta: &ModelMeta, existing: &[Row], skip: Option<usize>, row: &Row) -> LabsResult<()> {
        let label = meta.label();
        let others = || {
            existing
                .iter()
                .enumerate()
                .filter(move |(i, _)| Some(*i) != skip)
                .map(|(_, r)| r)
        };
        for field in meta.concrete_fields().filter(|f| f.unique || f.primary_key) {
            let value = row.get_value(&field.attname).unwrap_or(&Value::Null);
            if value.is_null() && field.primary_key {
                return Err(LabsError::IntegrityError(format!(
                    "NOT NULL constraint failed: {}.{}",
                    meta.db_table, field.attname
                )));
            }
            if !value.is_null() && others().any(|r| column_equals(r, &field.attname, value)) {
                return Err(LabsError::IntegrityError(format!(
                    "UNIQUE constraint failed: {}.{}",
                    meta.db_table, field.attname
                )));
            }
        }
        for set in &meta.unique_together {
            let attnames: Vec<&str> = set
                .iter()
                .map(|name| meta.get_field(name).map_or(*name, |f| f.attname.as_str()))
                .collect();
            let clash = others().any(|other| {
                attnames.iter().all(|a| {
                    let value = row.get_value(a).unwrap_or(&Value::Null);
                    column_equals(other, a, value)
                })
            });
            if clash {
                return Err(LabsError::IntegrityError(format!(
                    "UNIQUE constraint failed: {label} ({})",
                    set.join(", ")
                )));
            }
        }
        Ok(())
    }
}

impl DbExecutor for MemoryDatabase {
    fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn query_log(&self) -> &QueryLog {
        &self.log
    }

    fn get(&self, model: &str, pk: &Value) -> LabsResult<Box<dyn Record>> {
        let meta = self.registry.meta(model)?;
        let pk_name = pk_attname(meta);
        let sql = format!(
            "SELECT {} FROM {} WHERE {}.{} = {} LIMIT 21",
            column_list(meta),
            q(&meta.db_table),
            q(&meta.db_table),
            q(pk_name),
            literal(pk)
        );
        self.round_trip(sql, || {
            let rows = self.select_rows(meta, |r| column_equals(r, pk_name, pk))?;
            match rows.as_slice() {
                [] => Err(LabsError::DoesNotExist(format!(
                    "{} matching query does not exist ({pk_name}={pk})",
                    meta.label()
                ))),
                [row] => self.registry.build(model, row),
                _ => Err(LabsError::MultipleObjectsReturned(format!(
                    "get() returned {} {} records for {pk_name}={pk}",
                    rows.len(),
                    meta.label()
                ))),
            }
        })
    }

    fn filter(&self, model: &str, attname: &str, value: &Value) -> LabsResult<Vec<Box<dyn Record>>> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {}.{} = {}{}",
            column_list(meta),
            q(&meta.db_table),
            q(&meta.db_table),
            q(attname),
            literal(value),
            order_clause(meta)
        );
        self.round_trip(sql, || {
            let rows = self.select_rows(meta, |r| column_equals(r, attname, value))?;
            self.build_all(model, &rows)
        })
    }

    fn filter_in(
        &self,
        model: &str,
        attname: &str,
        values: &[Value],
    ) -> LabsResult<Vec<Box<dyn Record>>> {
        let meta = self.registry.meta(model)?;
        let rows = self.filter_rows(meta, attname, values)?;
        self.build_all(model, &rows)
    }

    fn filter_through(&self, link: &ThroughLink, pk: &Value) -> LabsResult<Vec<Box<dyn Record>>> {
        self.fetch_through(link, std::slice::from_ref(pk))?
            .iter()
            .map(|(_, row)| self.registry.build(&link.target, row))
            .collect()
    }

    fn all(&self, model: &str) -> LabsResult<Vec<Box<dyn Record>>> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "SELECT {} FROM {}{}",
            column_list(meta),
            q(&meta.db_table),
            order_clause(meta)
        );
        self.round_trip(sql, || {
            let rows = self.select_rows(meta, |_| true)?;
            self.build_all(model, &rows)
        })
    }

    fn insert(&self, model: &str, row: Row) -> LabsResult<Value> {
        let meta = self.registry.meta(model)?;
        let mut full = with_defaults(meta, &row);
        let mut tables = self.write()?;
        let table = tables.entry(meta.label()).or_default();
        let pk = assign_pk(meta, table, &mut full);
        let sql = insert_sql(meta, std::slice::from_ref(&full));
        self.round_trip(sql, || {
            Self::check_unique(meta, &table.rows, None, &full)?;
            table.rows.push(full);
            Ok(pk)
        })
    }

    fn filter_where(&self, model: &str, condition: &Q) -> LabsResult<Vec<Box<dyn Record>>> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            column_list(meta),
            q(&meta.db_table),
            self.from_clause(meta, condition, &[]),
            order_clause(meta)
        );
        self.round_trip(sql, || {
            let tables = self.read()?;
            let source = TablesSource::new(&self.registry, &tables);
            source
                .select(meta, condition)
                .into_iter()
                .map(|row| self.registry.build(model, row))
                .collect()
        })
    }

    fn count_where(&self, model: &str, condition: &Q) -> LabsResult<usize> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "SELECT COUNT(*) AS \"__count\" FROM {}{}",
            q(&meta.db_table),
            self.from_clause(meta, condition, &[])
        );
        self.round_trip(sql, || {
            let tables = self.read()?;
            Ok(TablesSource::new(&self.registry, &tables).matching(meta, condition).len())
        })
    }

    fn values_list(&self, model: &str, condition: &Q, path: &str) -> LabsResult<Vec<Value>> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            column_sql(&self.registry, meta, path),
            q(&meta.db_table),
            self.from_clause(meta, condition, &[path]),
            order_clause(meta)
        );
        self.round_trip(sql, || {
            let tables = self.read()?;
            let source = TablesSource::new(&self.registry, &tables);
            Ok(source
                .select(meta, condition)
                .into_iter()
                .map(|row| source.scope(meta, row).resolve(path))
                .collect())
        })
    }

    fn aggregate(
        &self,
        model: &str,
        condition: &Q,
        func: AggregateFunc,
        expr: &Expression,
    ) -> LabsResult<Value> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "SELECT {}({}) AS {} FROM {}{}",
            func.sql_name(),
            expr.to_sql(&self.registry, meta),
            q(&aggregate_alias(func, expr)),
            q(&meta.db_table),
            self.from_clause(meta, condition, &expr.paths())
        );
        self.round_trip(sql, || {
            let tables = self.read()?;
            let source = TablesSource::new(&self.registry, &tables);
            let values = source
                .select(meta, condition)
                .into_iter()
                .map(|row| expr.eval(&source.scope(meta, row)))
                .collect();
            Ok(func.apply(values))
        })
    }

    fn aggregate_by(
        &self,
        model: &str,
        condition: &Q,
        group: &str,
        func: AggregateFunc,
        expr: &Expression,
    ) -> LabsResult<Vec<(Value, Value)>> {
        let meta = self.registry.meta(model)?;
        let group_sql = column_sql(&self.registry, meta, group);
        let mut paths = expr.paths();
        paths.push(group);
        let sql = format!(
            "SELECT {group_sql}, {}({}) AS {} FROM {}{} GROUP BY {group_sql} ORDER BY {group_sql} ASC",
            func.sql_name(),
            expr.to_sql(&self.registry, meta),
            q(&aggregate_alias(func, expr)),
            q(&meta.db_table),
            self.from_clause(meta, condition, &paths)
        );
        self.round_trip(sql, || {
            let tables = self.read()?;
            let source = TablesSource::new(&self.registry, &tables);
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            for row in source.select(meta, condition) {
                let scope = source.scope(meta, row);
                let key = scope.resolve(group);
                let slot = *index.entry(key.key()).or_insert_with(|| {
                    groups.push((key, Vec::new()));
                    groups.len() - 1
                });
                if let Some((_, values)) = groups.get_mut(slot) {
                    values.push(expr.eval(&scope));
                }
            }
            groups.sort_by(|a, b| compare_values(&a.0, &b.0));
            Ok(groups
                .into_iter()
                .map(|(key, values)| (key, func.apply(values)))
                .collect())
        })
    }

    fn bulk_insert(&self, model: &str, rows: Vec<Row>) -> LabsResult<Vec<Value>> {
        let meta = self.registry.meta(model)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut tables = self.write()?;
        let table = tables.entry(meta.label()).or_default();
        let (stored, next_id) = (table.rows.len(), table.next_id);
        let mut full_rows = Vec::with_capacity(rows.len());
        let mut pks = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut full = with_defaults(meta, row);
            pks.push(assign_pk(meta, table, &mut full));
            full_rows.push(full);
        }
        let sql = insert_sql(meta, &full_rows);
        self.round_trip(sql, || {
            for full in full_rows {
                if let Err(e) = Self::check_unique(meta, &table.rows, None, &full) {
                    table.rows.truncate(stored);
                    table.next_id = next_id;
                    return Err(e);
                }
                table.rows.push(full);
            }
            Ok(pks)
        })
    }

    fn save(&self, model: &str, row: Row) -> LabsResult<()> {
        let meta = self.registry.meta(model)?;
        let pk_name = pk_attname(meta);
        let pk = row.get_value(pk_name).cloned().unwrap_or(Value::Null);
        let full = with_defaults(meta, &row);
        let assignments: Vec<String> = full
            .iter()
            .filter(|(column, _)| *column != pk_name)
            .map(|(column, value)| format!("{} = {}", q(column), literal(value)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}.{} = {}",
            q(&meta.db_table),
            assignments.join(", "),
            q(&meta.db_table),
            q(pk_name),
            literal(&pk)
        );
        let mut tables = self.write()?;
        let table = tables.entry(meta.label()).or_default();
        self.round_trip(sql, || {
            let index = table
                .rows
                .iter()
                .position(|r| column_equals(r, pk_name, &pk))
                .ok_or_else(|| {
                    LabsError::DoesNotExist(format!(
                        "{} matching query does not exist ({pk_name}={pk})",
                        meta.label()
                    ))
                })?;
            Self::check_unique(meta, &table.rows, Some(index), &full)?;
            if let Some(stored) = table.rows.get_mut(index) {
                *stored = full;
            }
            Ok(())
        })
    }

    fn update_where(
        &self,
        model: &str,
        condition: &Q,
        assignments: &[(&str, Expression)],
    ) -> LabsResult<usize> {
        let meta = self.registry.meta(model)?;
        let mut columns = Vec::with_capacity(assignments.len());
        for (name, expr) in assignments {
            let field = meta
                .get_field(name)
                .filter(|f| f.concrete)
                .ok_or_else(|| {
                    LabsError::FieldError(format!("{} has no concrete field named '{name}'", meta.label()))
                })?;
            columns.push((field.attname.as_str(), expr));
        }
        let set: Vec<String> = columns
            .iter()
            .map(|(column, expr)| format!("{} = {}", q(column), expr.to_sql(&self.registry, meta)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            q(&meta.db_table),
            set.join(", "),
            condition.where_sql(&self.registry, meta)
        );
        let mut tables = self.write()?;
        self.round_trip(sql, || {
            let changes: Vec<(usize, Vec<(&str, Value)>)> = {
                let source = TablesSource::new(&self.registry, &tables);
                let rows = source.rows(meta);
                source
                    .matching(meta, condition)
                    .into_iter()
                    .filter_map(|i| rows.get(i).map(|row| (i, row)))
                    .map(|(i, row)| {
                        let scope = source.scope(meta, row);
                        let values = columns
                            .iter()
                            .map(|(column, expr)| (*column, expr.eval(&scope)))
                            .collect();
                        (i, values)
                    })
                    .collect()
            };
            let table = tables.entry(meta.label()).or_default();
            let backup = table.rows.clone();
            for (i, values) in &changes {
                if let Some(row) = table.rows.get_mut(*i) {
                    for (column, value) in values {
                        row.set(*column, value.clone());
                    }
                }
            }
            for (i, _) in &changes {
                let checked = table
                    .rows
                    .get(*i)
                    .map_or(Ok(()), |row| Self::check_unique(meta, &table.rows, Some(*i), row));
                if let Err(e) = checked {
                    table.rows = backup;
                    return Err(e);
                }
            }
            Ok(changes.len())
        })
    }

    fn delete_where(&self, model: &str, condition: &Q) -> LabsResult<usize> {
        let meta = self.registry.meta(model)?;
        let sql = format!(
            "DELETE FROM {}{}",
            q(&meta.db_table),
            condition.where_sql(&self.registry, meta)
        );
        let mut tables = self.write()?;
        self.round_trip(sql, || {
            let hits = TablesSource::new(&self.registry, &tables).matching(meta, condition);
            let mut working = tables.clone();
            let removed = hits.len();
            self.delete_indices(&mut working, meta, &hits)?;
            *tables = working;
            Ok(removed)
        })
    }
}

fn aggregate_alias(func: AggregateFunc, expr: &Expression) -> String {
    let name = func.sql_name().to_lowercase();
    match expr {
        Expression::F(path) => format!("{path}__{name}"),
        _ => name,
    }
}
