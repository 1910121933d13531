//! # ormlabs-test
//!
//! Testing utilities for ormlabs. Provides an isolated in-memory database per
//! test with fixture loading, and assertions on the number of queries a piece
//! of code executes.
//!
//! ## Modules
//!
//! - [`test_database`] - [`TestDatabase`](test_database::TestDatabase)
//! - [`assert_queries`] - Query-count assertions

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::format_push_string)]

pub mod assert_queries;
pub mod test_database;

pub use assert_queries::{
    assert_max_queries, assert_max_queries_async, assert_num_queries, assert_num_queries_async,
};
pub use test_database::TestDatabase;
