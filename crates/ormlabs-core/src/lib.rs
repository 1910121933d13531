//! # ormlabs-core
//!
//! Foundation types shared by every ormlabs crate. Nothing in here knows about
//! models or databases.
//!
//! ## Modules
//!
//! - [`error`] - The [`LabsError`] enum and result alias
//! - [`settings`] - Project settings and the global settings cell
//! - [`settings_loader`] - Loading settings from TOML/JSON files and the environment
//! - [`logging`] - Tracing subscriber setup
//! - [`checks`] - Diagnostic messages produced by configuration checks

pub mod checks;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

pub use error::{LabsError, LabsResult, ValidationError};
pub use settings::{Environment, Settings, SETTINGS};
