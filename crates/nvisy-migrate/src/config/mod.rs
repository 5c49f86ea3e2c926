//! Target configuration.
//!
//! A run is driven by an ordered list of [`DatabaseTarget`]s, usually loaded
//! from a YAML file through [`TargetsConfig`].

mod loader;
mod target;

pub use loader::TargetsConfig;
pub use target::{BackendKind, DatabaseTarget};
