//! Column expressions and aggregates.
//!
//! An [`Expression`] computes a value per row: a field reference (`F`), a
//! constant, arithmetic, string concatenation or a `CASE`. Arithmetic on two
//! integers stays integral (division truncates); any float operand makes the
//! result a float. NULL operands, overflow and division by zero give NULL.

use std::ops;

use crate::model::ModelMeta;
use crate::registry::ModelRegistry;
use crate::value::{compare_values, Value};

use super::lookups::Q;
use super::path::{column_sql, literal, Scope};

/// A value computed from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// The value at a field path.
    F(String),
    /// A constant.
    Value(Value),
    /// Addition.
    Add(Box<Expression>, Box<Expression>),
    /// Subtraction.
    Sub(Box<Expression>, Box<Expression>),
    /// Multiplication.
    Mul(Box<Expression>, Box<Expression>),
    /// Division.
    Div(Box<Expression>, Box<Expression>),
    /// String concatenation. NULL parts count as empty strings.
    Concat(Vec<Expression>),
    /// The first matching branch, or the default.
    Case {
        /// Branches, tested in order.
        whens: Vec<When>,
        /// The value when no branch matches.
        default: Box<Expression>,
    },
}

/// One `WHEN ... THEN ...` branch of [`Expression::Case`].
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    /// The branch condition.
    pub condition: Q,
    /// The branch value.
    pub then: Expression,
}

impl When {
    /// Creates a branch.
    pub fn new(condition: Q, then: impl Into<Expression>) -> Self {
        Self {
            condition,
            then: then.into(),
        }
    }
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    fn apply(self, left: &Value, right: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            let result = match self {
                Self::Add => a.checked_add(*b),
                Self::Sub => a.checked_sub(*b),
                Self::Mul => a.checked_mul(*b),
                Self::Div => a.checked_div(*b),
            };
            return result.map_or(Value::Null, Value::Int);
        }
        let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
            return Value::Null;
        };
        match self {
            Self::Add => Value::Float(a + b),
            Self::Sub => Value::Float(a - b),
            Self::Mul => Value::Float(a * b),
            Self::Div => Some(a / b)
                .filter(|q| q.is_finite())
                .map_or(Value::Null, Value::Float),
        }
    }
}

impl Expression {
    /// A reference to the value at `path`.
    pub fn f(path: impl Into<String>) -> Self {
        Self::F(path.into())
    }

    /// A constant.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Concatenates `parts` as strings.
    pub fn concat(parts: impl IntoIterator<Item = Self>) -> Self {
        Self::Concat(parts.into_iter().collect())
    }

    /// A `CASE` over `whens` falling back to `default`.
    pub fn case(whens: Vec<When>, default: impl Into<Self>) -> Self {
        Self::Case {
            whens,
            default: Box::new(default.into()),
        }
    }

    fn binary(&self) -> Option<(ArithOp, &Self, &Self)> {
        match self {
            Self::Add(l, r) => Some((ArithOp::Add, l, r)),
            Self::Sub(l, r) => Some((ArithOp::Sub, l, r)),
            Self::Mul(l, r) => Some((ArithOp::Mul, l, r)),
            Self::Div(l, r) => Some((ArithOp::Div, l, r)),
            _ => None,
        }
    }

    /// Collects every field path the expression reads.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    pub(crate) fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a str>) {
        if let Some((_, left, right)) = self.binary() {
            left.collect_paths(paths);
            right.collect_paths(paths);
            return;
        }
        match self {
            Self::F(path) => paths.push(path),
            Self::Concat(parts) => {
                for part in parts {
                    part.collect_paths(paths);
                }
            }
            Self::Case { whens, default } => {
                for when in whens {
                    when.condition.collect_paths(paths);
                    when.then.collect_paths(paths);
                }
                default.collect_paths(paths);
            }
            _ => {}
        }
    }

    /// Computes the expression for the row in `scope`.
    pub fn eval(&self, scope: &Scope<'_>) -> Value {
        if let Some((op, left, right)) = self.binary() {
            return op.apply(&left.eval(scope), &right.eval(scope));
        }
        match self {
            Self::F(path) => scope.resolve(path),
            Self::Value(value) => value.clone(),
            Self::Concat(parts) => Value::String(
                parts
                    .iter()
                    .map(|p| match p.eval(scope) {
                        Value::Null => String::new(),
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Self::Case { whens, default } => whens
                .iter()
                .find(|w| w.condition.matches(scope))
                .map_or_else(|| default.eval(scope), |w| w.then.eval(scope)),
            Self::Add(..) | Self::Sub(..) | Self::Mul(..) | Self::Div(..) => Value::Null,
        }
    }

    /// Renders the expression as SQL over `meta`'s table.
    pub fn to_sql(&self, registry: &ModelRegistry, meta: &ModelMeta) -> String {
        if let Some((op, left, right)) = self.binary() {
            return format!(
                "({} {} {})",
                left.to_sql(registry, meta),
                op.symbol(),
                right.to_sql(registry, meta)
            );
        }
        match self {
            Self::F(path) => column_sql(registry, meta, path),
            Self::Value(value) => literal(value),
            Self::Concat(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_sql(registry, meta)).collect();
                format!("CONCAT({})", parts.join(", "))
            }
            Self::Case { whens, default } => {
                let mut sql = String::from("CASE");
                for when in whens {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        when.condition.to_sql(registry, meta),
                        when.then.to_sql(registry, meta)
                    ));
                }
                sql.push_str(&format!(" ELSE {} END", default.to_sql(registry, meta)));
                sql
            }
            Self::Add(..) | Self::Sub(..) | Self::Mul(..) | Self::Div(..) => String::new(),
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

macro_rules! arith_impl {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for Expression {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

arith_impl!(Add, add, Add);
arith_impl!(Sub, sub, Sub);
arith_impl!(Mul, mul, Mul);
arith_impl!(Div, div, Div);

/// An aggregate over the values of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    /// Number of non-NULL values.
    Count,
    /// Sum. Integral when every input is an integer.
    Sum,
    /// Arithmetic mean, always a float.
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
}

impl AggregateFunc {
    /// Returns the SQL function name.
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    /// Aggregates `values`, skipping NULLs.
    ///
    /// An empty input gives NULL, except for `Count` which gives zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(self, values: Vec<Value>) -> Value {
        let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
        match self {
            Self::Count => Value::Int(i64::try_from(values.len()).unwrap_or(i64::MAX)),
            _ if values.is_empty() => Value::Null,
            Self::Sum if values.iter().all(|v| v.as_int().is_some()) => values
                .iter()
                .filter_map(Value::as_int)
                .try_fold(0_i64, i64::checked_add)
                .map_or(Value::Null, Value::Int),
            Self::Sum => Value::Float(values.iter().filter_map(Value::as_number).sum()),
            Self::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Self::Min => values
                .into_iter()
                .min_by(compare_values)
                .unwrap_or(Value::Null),
            Self::Max => values
                .into_iter()
                .max_by(compare_values)
                .unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(ArithOp::Div.apply(&Value::Int(7), &Value::Int(2)), Value::Int(3));
        assert_eq!(ArithOp::Div.apply(&Value::Int(7), &Value::Int(0)), Value::Null);
        assert_eq!(ArithOp::Add.apply(&Value::Int(i64::MAX), &Value::Int(1)), Value::Null);
        assert_eq!(ArithOp::Sub.apply(&Value::Int(100), &Value::Int(10)), Value::Int(90));
    }

    #[test]
    fn test_mixed_arithmetic() {
        assert_eq!(ArithOp::Mul.apply(&Value::Int(3), &Value::Float(0.5)), Value::Float(1.5));
        assert_eq!(ArithOp::Add.apply(&Value::Null, &Value::Int(1)), Value::Null);
        assert_eq!(ArithOp::Add.apply(&Value::from("a"), &Value::Int(1)), Value::Null);
    }

    #[test]
    fn test_operators_build_trees() {
        let expr = Expression::f("discount") + Expression::value(10);
        assert_eq!(
            expr,
            Expression::Add(
                Box::new(Expression::F("discount".into())),
                Box::new(Expression::Value(Value::Int(10)))
            )
        );
    }

    #[test]
    fn test_aggregates() {
        let values = vec![Value::Int(1), Value::Null, Value::Int(3)];
        assert_eq!(AggregateFunc::Count.apply(values.clone()), Value::Int(2));
        assert_eq!(AggregateFunc::Sum.apply(values.clone()), Value::Int(4));
        assert_eq!(AggregateFunc::Avg.apply(values.clone()), Value::Float(2.0));
        assert_eq!(AggregateFunc::Min.apply(values.clone()), Value::Int(1));
        assert_eq!(AggregateFunc::Max.apply(values), Value::Int(3));
    }

    #[test]
    fn test_aggregates_over_nothing() {
        assert_eq!(AggregateFunc::Count.apply(Vec::new()), Value::Int(0));
        assert_eq!(AggregateFunc::Sum.apply(vec![Value::Null]), Value::Null);
        assert_eq!(AggregateFunc::Max.apply(Vec::new()), Value::Null);
    }

    #[test]
    fn test_float_sum() {
        let values = vec![Value::Int(1), Value::Float(0.5)];
        assert_eq!(AggregateFunc::Sum.apply(values), Value::Float(1.5));
        assert_eq!(AggregateFunc::Max.sql_name(), "MAX");
    }
}
