#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Tracing target constants for consistent logging.

/// Tracing target for configuration loading.
///
/// Use this target for logging config file resolution and target lookup.
pub const TRACING_TARGET_CONFIG: &str = "nvisy_migrate::config";

/// Tracing target for migration script discovery.
pub const TRACING_TARGET_SOURCE: &str = "nvisy_migrate::source";

/// Tracing target for backend drivers.
///
/// Use this target for logging connection establishment and version table access.
pub const TRACING_TARGET_DRIVER: &str = "nvisy_migrate::driver";

/// Tracing target for the migration engine.
///
/// Use this target for logging script application, forced versions and recovery.
pub const TRACING_TARGET_ENGINE: &str = "nvisy_migrate::engine";

/// Tracing target for the multi-target runner.
pub const TRACING_TARGET_RUNNER: &str = "nvisy_migrate::runner";

pub mod config;
pub mod driver;
pub mod engine;
mod error;
pub mod prelude;
pub mod runner;
pub mod source;

pub use crate::error::{BoxError, ErrorKind, MigrateError, MigrateResult};
