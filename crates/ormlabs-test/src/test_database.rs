//! Test database utilities.
//!
//! Provides [`TestDatabase`], a fresh [`MemoryDatabase`] per test. It
//! implements [`DbExecutor`] so it can be handed to anything that reads
//! records, and adds fixture loading and query-count helpers for use with
//! [`assert_num_queries`](crate::assert_queries::assert_num_queries).
//!
//! ## Example
//!
//! ```rust,no_run
//! use ormlabs_test::test_database::TestDatabase;
//!
//! let db = TestDatabase::new(|_registry| Ok(()));
//! assert_eq!(db.query_count(), 0);
//! ```

use std::sync::Arc;

use ormlabs_core::LabsResult;
use ormlabs_db::related::ThroughLink;
use ormlabs_db::serializers::load_fixture;
use ormlabs_db::{
    AggregateFunc, DbExecutor, Expression, MemoryDatabase, ModelRegistry, QueryLog, Record, Row,
    Value, Q,
};

/// An isolated in-memory database for one test.
///
/// Clones share the same tables and query log.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    inner: Arc<MemoryDatabase>,
}

impl TestDatabase {
    /// Creates a test database with the models `register` adds.
    ///
    /// # Panics
    ///
    /// Panics if registration or registry population fails.
    pub fn new<F>(register: F) -> Self
    where
        F: FnOnce(&mut ModelRegistry) -> LabsResult<()>,
    {
        let mut registry = ModelRegistry::new();
        if let Err(e) = register(&mut registry) {
            panic!("Failed to register test models: {e}");
        }
        Self::from_registry(registry)
    }

    /// Creates a test database over an existing registry.
    ///
    /// # Panics
    ///
    /// Panics if the registry cannot be populated.
    pub fn from_registry(registry: ModelRegistry) -> Self {
        match Self::try_from_registry(registry) {
            Ok(db) => db,
            Err(e) => panic!("Failed to create the test database: {e}"),
        }
    }

    /// Creates a test database over an existing registry.
    pub fn try_from_registry(registry: ModelRegistry) -> LabsResult<Self> {
        Ok(Self {
            inner: Arc::new(MemoryDatabase::new(registry)?),
        })
    }

    /// Loads a JSON fixture, then resets the query counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture cannot be decoded or a row violates a
    /// constraint.
    pub fn load_fixture(&self, data: &str) -> LabsResult<usize> {
        let loaded = load_fixture(self.inner.as_ref(), data)?;
        tracing::debug!(objects = loaded, "loaded test fixture");
        self.reset_query_count();
        Ok(loaded)
    }

    /// Returns the current query count.
    pub fn query_count(&self) -> usize {
        self.inner.query_count()
    }

    /// Resets the query counter to zero and forgets captured statements.
    pub fn reset_query_count(&self) {
        self.inner.query_log().clear();
    }

    /// Returns the statements captured since the last reset, oldest first.
    pub fn captured_queries(&self) -> Vec<String> {
        self.inner
            .query_log()
            .events()
            .into_iter()
            .map(|e| e.sql)
            .collect()
    }

    /// Returns the wrapped database.
    pub fn database(&self) -> &MemoryDatabase {
        &self.inner
    }
}

impl DbExecutor for TestDatabase {
    fn registry(&self) -> &ModelRegistry {
        self.inner.registry()
    }

    fn query_log(&self) -> &QueryLog {
        self.inner.query_log()
    }

    fn get(&self, model: &str, pk: &Value) -> LabsResult<Box<dyn Record>> {
        self.inner.get(model, pk)
    }

    fn filter(&self, model: &str, attname: &str, value: &Value) -> LabsResult<Vec<Box<dyn Record>>> {
        self.inner.filter(model, attname, value)
    }

    fn filter_in(
        &self,
        model: &str,
        attname: &str,
        values: &[Value],
    ) -> LabsResult<Vec<Box<dyn Record>>> {
        self.inner.filter_in(model, attname, values)
    }

    fn filter_through(&self, link: &ThroughLink, pk: &Value) -> LabsResult<Vec<Box<dyn Record>>> {
        self.inner.filter_through(link, pk)
    }

    fn all(&self, model: &str) -> LabsResult<Vec<Box<dyn Record>>> {
        self.inner.all(model)
    }

    fn insert(&self, model: &str, row: Row) -> LabsResult<Value> {
        self.inner.insert(model, row)
    }

    fn filter_where(&self, model: &str, condition: &Q) -> LabsResult<Vec<Box<dyn Record>>> {
        self.inner.filter_where(model, condition)
    }

    fn count_where(&self, model: &str, condition: &Q) -> LabsResult<usize> {
        self.inner.count_where(model, condition)
    }

    fn values_list(&self, model: &str, condition: &Q, path: &str) -> LabsResult<Vec<Value>> {
        self.inner.values_list(model, condition, path)
    }

    fn aggregate(
        &self,
        model: &str,
        condition: &Q,
        func: AggregateFunc,
        expr: &Expression,
    ) -> LabsResult<Value> {
        self.inner.aggregate(model, condition, func, expr)
    }

    fn aggregate_by(
        &self,
        model: &str,
        condition: &Q,
        group: &str,
        func: AggregateFunc,
        expr: &Expression,
    ) -> LabsResult<Vec<(Value, Value)>> {
        self.inner.aggregate_by(model, condition, group, func, expr)
    }

    fn bulk_insert(&self, model: &str, rows: Vec<Row>) -> LabsResult<Vec<Value>> {
        self.inner.bulk_insert(model, rows)
    }

    fn save(&self, model: &str, row: Row) -> LabsResult<()> {
        self.inner.save(model, row)
    }

    fn update_where(
        &self,
        model: &str,
        condition: &Q,
        assignments: &[(&str, Expression)],
    ) -> LabsResult<usize> {
        self.inner.update_where(model, condition, assignments)
    }

    fn delete_where(&self, model: &str, condition: &Q) -> LabsResult<usize> {
        self.inner.delete_where(model, condition)
    }
}
