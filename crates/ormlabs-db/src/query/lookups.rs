//! Field lookups and `Q` conditions.
//!
//! A [`Lookup`] compares the value at a field path with an operand and a
//! [`Q`] combines lookups with `&`, `|` and `!`. Comparisons against NULL
//! never match, the same as in SQL.
//!
//! # Examples
//!
//! ```
//! use ormlabs_db::query::{Lookup, Q};
//! use ormlabs_db::value::Value;
//!
//! // skills @> ARRAY['ruby']
//! let ruby = Q::filter("skills", Lookup::Contains(Value::from(vec!["ruby"])));
//!
//! // info ? 'websites' AND NOT (info -> 'websites' = '[]')
//! let websites = Q::filter("info", Lookup::HasKey("websites".into()))
//!     & !Q::filter("info__websites", Lookup::Exact(Value::Json(serde_json::json!([]))));
//! assert!(matches!(websites, Q::And(ref children) if children.len() == 2));
//! # let _ = ruby;
//! ```

use std::cmp::Ordering;
use std::ops;

use crate::model::ModelMeta;
use crate::registry::ModelRegistry;
use crate::value::{compare_values, Value};

use super::expressions::Expression;
use super::path::{column_sql, literal, literal_list, Scope};

/// A comparison applied to the value at a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Equality (`field = value`). `Exact(Value::Null)` tests for NULL.
    Exact(Value),
    /// Case-insensitive string equality.
    IExact(String),
    /// Substring for strings, superset for arrays and containment (`@>`)
    /// for JSON documents.
    Contains(Value),
    /// Case-insensitive substring.
    IContains(String),
    /// Membership (`field IN (...)`).
    In(Vec<Value>),
    /// Greater than.
    Gt(Expression),
    /// Greater than or equal.
    Gte(Expression),
    /// Less than.
    Lt(Expression),
    /// Less than or equal.
    Lte(Expression),
    /// String prefix.
    StartsWith(String),
    /// Case-insensitive string prefix.
    IStartsWith(String),
    /// String suffix.
    EndsWith(String),
    /// Case-insensitive string suffix.
    IEndsWith(String),
    /// Inclusive range (`field BETWEEN low AND high`).
    Range(Value, Value),
    /// NULL test: `true` matches NULL, `false` matches everything else.
    IsNull(bool),
    /// The JSON object has the key.
    HasKey(String),
    /// The array shares at least one element with the operand (`&&`).
    Overlap(Vec<Value>),
    /// Every element of the array is in the operand (`<@`).
    ContainedBy(Vec<Value>),
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.total_cmp(&y) == Ordering::Equal,
        _ => a == b,
    }
}

/// Orders two values when SQL could compare them.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let comparable = match (a, b) {
        (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::DateTime(_), Value::DateTime(_))
        | (Value::Uuid(_), Value::Uuid(_)) => true,
        _ => a.as_number().is_some() && b.as_number().is_some(),
    };
    comparable.then(|| compare_values(a, b))
}

/// JSON containment: objects by key, arrays element-wise, scalars by value.
fn json_contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    use serde_json::Value as Json;
    match (haystack, needle) {
        (Json::Object(hay), Json::Object(wanted)) => wanted
            .iter()
            .all(|(k, v)| hay.get(k).is_some_and(|h| json_contains(h, v))),
        (Json::Array(hay), Json::Array(wanted)) => wanted
            .iter()
            .all(|w| hay.iter().any(|h| json_contains(h, w))),
        (Json::Array(hay), scalar) if !scalar.is_object() => hay.contains(scalar),
        _ => haystack == needle,
    }
}

fn contains(value: &Value, needle: &Value) -> bool {
    match (value, needle) {
        (Value::String(hay), Value::String(part)) => hay.contains(part.as_str()),
        (Value::List(hay), Value::List(wanted)) => {
            wanted.iter().all(|w| hay.iter().any(|h| values_equal(h, w)))
        }
        (Value::Json(_) | Value::List(_), _) if !needle.is_null() => {
            json_contains(&value.to_json(), &needle.to_json())
        }
        _ => false,
    }
}

fn upper(text: &str) -> String {
    text.to_uppercase()
}

impl Lookup {
    /// Tests `value`, the value at the filtered path of the row in `scope`.
    ///
    /// `scope` evaluates expression operands such as `F("ticket_number")`.
    pub fn matches(&self, value: &Value, scope: &Scope<'_>) -> bool {
        let text = value.as_str();
        match self {
            Self::Exact(Value::Null) | Self::IsNull(true) => value.is_null(),
            Self::IsNull(false) => !value.is_null(),
            Self::Exact(other) => values_equal(value, other),
            Self::IExact(other) => text.is_some_and(|t| upper(t) == upper(other)),
            Self::Contains(needle) => contains(value, needle),
            Self::IContains(part) => text.is_some_and(|t| upper(t).contains(&upper(part))),
            Self::In(values) => values.iter().any(|v| values_equal(value, v)),
            Self::Gt(expr) => compare(value, &expr.eval(scope)) == Some(Ordering::Greater),
            Self::Gte(expr) => compare(value, &expr.eval(scope)).is_some_and(Ordering::is_ge),
            Self::Lt(expr) => compare(value, &expr.eval(scope)) == Some(Ordering::Less),
            Self::Lte(expr) => compare(value, &expr.eval(scope)).is_some_and(Ordering::is_le),
            Self::StartsWith(prefix) => text.is_some_and(|t| t.starts_with(prefix.as_str())),
            Self::IStartsWith(prefix) => text.is_some_and(|t| upper(t).starts_with(&upper(prefix))),
            Self::EndsWith(suffix) => text.is_some_and(|t| t.ends_with(suffix.as_str())),
            Self::IEndsWith(suffix) => text.is_some_and(|t| upper(t).ends_with(&upper(suffix))),
            Self::Range(low, high) => {
                compare(value, low).is_some_and(Ordering::is_ge)
                    && compare(value, high).is_some_and(Ordering::is_le)
            }
            Self::HasKey(key) => {
                matches!(value, Value::Json(serde_json::Value::Object(map)) if map.contains_key(key))
            }
            Self::Overlap(values) => match value {
                Value::List(items) => items.iter().any(|i| values.iter().any(|v| values_equal(i, v))),
                _ => false,
            },
            Self::ContainedBy(values) => match value {
                Value::List(items) => items.iter().all(|i| values.iter().any(|v| values_equal(i, v))),
                _ => false,
            },
        }
    }

    /// Returns the expression operand of a comparison.
    pub const fn operand(&self) -> Option<&Expression> {
        match self {
            Self::Gt(expr) | Self::Gte(expr) | Self::Lt(expr) | Self::Lte(expr) => Some(expr),
            _ => None,
        }
    }

    /// Renders the condition on `column`.
    pub fn to_sql(&self, column: &str, registry: &ModelRegistry, meta: &ModelMeta) -> String {
        let pattern = |before: &str, text: &str, after: &str| {
            literal(&Value::String(format!("{before}{text}{after}")))
        };
        match self {
            Self::Exact(Value::Null) | Self::IsNull(true) => format!("{column} IS NULL"),
            Self::IsNull(false) => format!("{column} IS NOT NULL"),
            Self::Exact(value) => format!("{column} = {}", literal(value)),
            Self::IExact(text) => format!("UPPER({column}::text) = UPPER({})", pattern("", text, "")),
            Self::Contains(Value::String(text)) => format!("{column} LIKE {}", pattern("%", text, "%")),
            Self::Contains(value @ Value::List(_)) => format!("{column} @> {}", literal(value)),
            Self::Contains(value) => format!("{column} @> '{}'", value.to_json()),
            Self::IContains(text) => {
                format!("UPPER({column}::text) LIKE UPPER({})", pattern("%", text, "%"))
            }
            Self::In(values) => format!("{column} IN ({})", literal_list(values)),
            Self::Gt(expr) => format!("{column} > {}", expr.to_sql(registry, meta)),
            Self::Gte(expr) => format!("{column} >= {}", expr.to_sql(registry, meta)),
            Self::Lt(expr) => format!("{column} < {}", expr.to_sql(registry, meta)),
            Self::Lte(expr) => format!("{column} <= {}", expr.to_sql(registry, meta)),
            Self::StartsWith(text) => format!("{column} LIKE {}", pattern("", text, "%")),
            Self::IStartsWith(text) => {
                format!("UPPER({column}::text) LIKE UPPER({})", pattern("", text, "%"))
            }
            Self::EndsWith(text) => format!("{column} LIKE {}", pattern("%", text, "")),
            Self::IEndsWith(text) => {
                format!("UPPER({column}::text) LIKE UPPER({})", pattern("%", text, ""))
            }
            Self::Range(low, high) => {
                format!("{column} BETWEEN {} AND {}", literal(low), literal(high))
            }
            Self::HasKey(key) => format!("{column} ? {}", pattern("", key, "")),
            Self::Overlap(values) => format!("{column} && ARRAY[{}]", literal_list(values)),
            Self::ContainedBy(values) => format!("{column} <@ ARRAY[{}]", literal_list(values)),
        }
    }
}

/// A composable filter condition.
///
/// `Q` objects combine with `&` (AND), `|` (OR) and `!` (NOT).
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single lookup on a field path.
    Filter {
        /// The field path (may use `__` to cross relations or apply transforms).
        field: String,
        /// The lookup operation.
        lookup: Lookup,
    },
    /// Logical AND. Empty matches every row.
    And(Vec<Q>),
    /// Logical OR. Empty matches no row.
    Or(Vec<Q>),
    /// Logical negation.
    Not(Box<Q>),
}

impl Q {
    /// Creates a single-lookup condition.
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }

    /// The condition every row satisfies.
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Returns `true` if this is an empty AND or OR.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Collects every field path the condition reads.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    pub(crate) fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a str>) {
        match self {
            Self::Filter { field, lookup } => {
                paths.push(field);
                if let Some(expr) = lookup.operand() {
                    expr.collect_paths(paths);
                }
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_paths(paths);
                }
            }
            Self::Not(inner) => inner.collect_paths(paths),
        }
    }

    /// Tests the row in `scope`.
    pub fn matches(&self, scope: &Scope<'_>) -> bool {
        match self {
            Self::Filter { field, lookup } => lookup.matches(&scope.resolve(field), scope),
            Self::And(children) => children.iter().all(|c| c.matches(scope)),
            Self::Or(children) => children.iter().any(|c| c.matches(scope)),
            Self::Not(inner) => !inner.matches(scope),
        }
    }

    /// Renders the condition as a SQL boolean expression over `meta`'s table.
    pub fn to_sql(&self, registry: &ModelRegistry, meta: &ModelMeta) -> String {
        let joined = |children: &[Self], sep: &str| {
            let parts: Vec<String> = children
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| c.to_sql(registry, meta))
                .collect();
            match parts.as_slice() {
                [] => String::new(),
                [only] => only.clone(),
                _ => format!("({})", parts.join(sep)),
            }
        };
        match self {
            Self::Filter { field, lookup } => {
                lookup.to_sql(&column_sql(registry, meta, field), registry, meta)
            }
            Self::And(children) => joined(children, " AND "),
            Self::Or(children) => joined(children, " OR "),
            Self::Not(inner) => format!("NOT ({})", inner.to_sql(registry, meta)),
        }
    }

    /// Renders ` WHERE ...`, or nothing for a condition that matches every row.
    pub fn where_sql(&self, registry: &ModelRegistry, meta: &ModelMeta) -> String {
        if matches!(self, Self::And(children) if children.is_empty()) {
            return String::new();
        }
        format!(" WHERE {}", self.to_sql(registry, meta))
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            // Flatten nested ANDs
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}
