//! # ormlabs-db
//!
//! Model layer of ormlabs. Model types declare a static [`ModelMeta`] and an
//! accessor table; a [`ModelRegistry`] indexes them by label and computes
//! reverse relations; a [`DbExecutor`] hands records out as `Box<dyn Record>`
//! and records every round trip on its [`QueryLog`].
//!
//! On top of that sit the two pieces with real logic:
//!
//! - [`SerializationMixin`], the flat and deep projection of records into
//!   [`Snapshot`]s
//! - [`instrument`], which counts and times the round trips of one unit of
//!   work
//!
//! ## Module Overview
//!
//! - [`value`] - The [`Value`] enum and conversions
//! - [`row`] - Stored rows
//! - [`fields`] - Field descriptors ([`FieldDef`]) and types
//! - [`model`] - The [`Model`] and [`Record`] traits, [`ModelMeta`], [`Accessor`]
//! - [`registry`] - The model registry
//! - [`executor`] - The data-access trait and typed helpers
//! - [`related`] - Relation resolution
//! - [`memory`] - The in-process backend
//! - [`query`] - Lookups, `Q` conditions, expressions and aggregates
//! - [`query_log`] - Round-trip events and the cumulative log
//! - [`instrument`](mod@instrument) - Query statistics for one unit of work
//! - [`serialization`] - The serialization mixin
//! - [`serializers`] - Snapshot encoders and fixture loading
//! - [`validators`] - Field validators and [`full_clean`](validators::full_clean)
//! - [`checks`] - Model consistency checks

// - struct_excessive_bools: FieldDef carries the usual field flags
// - cast_precision_loss: integer-to-float casts are fine for validator bounds
// - result_large_err: LabsError is the shared error type
// - needless_pass_by_value: builder signatures take owned values
// - format_push_string: SQL text is built with push_str(&format!(..))
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]

pub mod checks;
pub mod executor;
pub mod fields;
pub mod instrument;
pub mod memory;
pub mod model;
pub mod query;
pub mod query_log;
pub mod registry;
pub mod related;
pub mod row;
pub mod serialization;
pub mod serializers;
pub mod validators;
pub mod value;

pub use executor::{
    all_models, create_model, downcast, filter_models, get_model, save_model, DbExecutor,
};
pub use fields::{FieldDef, FieldKind, FieldType, OnDelete, RelationKind};
pub use instrument::{instrument, instrument_async, measure, QueryScope, QueryStats};
pub use memory::{Loaded, MemoryDatabase};
pub use model::{Accessor, Model, ModelMeta, Record};
pub use query::{AggregateFunc, Expression, Lookup, When, Q};
pub use query_log::{QueryEvent, QueryLog};
pub use registry::ModelRegistry;
pub use row::Row;
pub use serialization::{FieldMap, SerializationMixin, Snapshot};
pub use value::{FieldFile, FromValue, Value};
