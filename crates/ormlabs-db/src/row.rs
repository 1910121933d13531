//! Stored rows.

use ormlabs_core::{LabsError, LabsResult};

use crate::value::{FromValue, Value};

/// One stored row: column names paired with values.
///
/// Columns keep insertion order. Rows are what the data layer stores and what
/// [`Model::from_row`](crate::model::Model::from_row) consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from parallel column and value vectors.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut row = Self::default();
        for (column, value) in pairs {
            row.set(column, value);
        }
        row
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> LabsResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            LabsError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value, treating a missing column as NULL.
    pub fn get_or_null<T: FromValue>(&self, column: &str) -> LabsResult<T> {
        T::from_value(self.get_value(column).unwrap_or(&Value::Null))
    }

    /// Returns the raw value of a column.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Sets a column, replacing an existing value or appending a new column.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.columns.iter().position(|c| *c == column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}
