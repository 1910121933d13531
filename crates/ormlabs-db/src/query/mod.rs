//! Filter conditions and column expressions.
//!
//! [`Q`] trees of [`Lookup`]s select rows and [`Expression`]s compute values
//! from them. Both name columns by field path: `name`, `community__name`
//! across a foreign key, and transforms after the field such as
//! `skills__len`, `skills__0` or `info__contact__work__phone`. The backend
//! evaluates them against stored rows and renders the SQL they stand for.
//!
//! # Examples
//!
//! ```
//! use ormlabs_db::query::{Expression, Lookup, Q};
//! use ormlabs_db::value::Value;
//!
//! // (first_name LIKE 'B%' OR last_name ILIKE '%h%') AND (age < 25 OR age > 30)
//! let name = Q::filter("first_name", Lookup::StartsWith("B".into()))
//!     | Q::filter("last_name", Lookup::IContains("h".into()));
//! let age = Q::filter("age", Lookup::Lt(Expression::value(25)))
//!     | Q::filter("age", Lookup::Gt(Expression::value(30)));
//! let pattern = name & age;
//! assert!(matches!(pattern, Q::And(ref children) if children.len() == 2));
//!
//! // ticket * (100 - discount) * event__ticket_price / 100
//! let price = Expression::f("ticket")
//!     * (Expression::value(100) - Expression::f("discount"))
//!     * Expression::f("event__ticket_price")
//!     / Expression::value(100);
//! # let _ = price;
//! ```

pub mod expressions;
pub mod lookups;
pub mod path;

pub use expressions::{AggregateFunc, Expression, When};
pub use lookups::{Lookup, Q};
pub use path::{RowSource, Scope, LOOKUP_SEP};
