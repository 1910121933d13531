//! # labs
//!
//! The labs application: a community/event schema, its admin registrations,
//! sample data, and a set of annotated query demonstrations that show what
//! each access pattern costs in round trips.
//!
//! ## Modules
//!
//! - [`models`] - `Community`, `Member`, `Event` and `Registration`
//! - [`admin`] - The labs admin site
//! - [`fixtures`] - Sample data
//! - [`querysets`] - Instrumented query demonstrations
//! - [`cli`] - The `labs` command line
//!
//! ## Quick Start
//!
//! ```rust
//! use labs::cli::open_database;
//! use labs::querysets::run_demo;
//! use ormlabs_core::Settings;
//!
//! let db = open_database(&Settings::default()).unwrap();
//! let run = run_demo(&db, "community_per_member_optimised").unwrap();
//! assert_eq!(run.stats.count, 1);
//! ```

#![allow(clippy::result_large_err)]
#![allow(clippy::missing_const_for_fn)]

pub mod admin;
pub mod cli;
pub mod fixtures;
pub mod models;
pub mod querysets;

pub use models::{Community, Event, Member, Registration};
