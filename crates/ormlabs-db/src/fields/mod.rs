//! Field descriptors.
//!
//! Every model declares its fields statically as a list of [`FieldDef`]s. The
//! serialization mixin and the data layer only ever look fields up through
//! these descriptors.

pub mod types;

pub use types::{FieldDef, FieldKind, FieldType, OnDelete, RelationKind};
