//! Convenient re-exports for common use.

pub use crate::config::{BackendKind, DatabaseTarget, TargetsConfig};
pub use crate::driver::{BackendDriverFactory, Driver, DriverFactory, VersionState};
pub use crate::engine::{MigrationStatus, Migrator, RunOutcome, RunReport, RunRequest};
pub use crate::runner::{RunSummary, RunnerConfig, TargetOutcome, TargetRunner};
pub use crate::source::{Direction, FileSource, MigrationScript, ScriptSet};
pub use crate::{MigrateError, MigrateResult};
