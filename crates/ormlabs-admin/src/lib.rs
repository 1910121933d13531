//! # ormlabs-admin
//!
//! Admin registrations for ormlabs models. A [`ModelAdmin`] configures a
//! model's change list; an [`AdminSite`] validates registrations against model
//! metadata and renders change lists through any
//! [`DbExecutor`](ormlabs_db::DbExecutor).
//!
//! ## Modules
//!
//! - [`model_admin`] - The [`ModelAdmin`] configuration
//! - [`site`] - The [`AdminSite`] registry and registration checks
//! - [`changelist`] - Filtering, search, ordering, pagination and rendering

#![allow(clippy::result_large_err)]
#![allow(clippy::missing_const_for_fn)]

pub mod changelist;
pub mod model_admin;
pub mod site;

pub use changelist::{ChangeList, ChangeListParams, ChangeListRow};
pub use model_admin::ModelAdmin;
pub use site::AdminSite;
