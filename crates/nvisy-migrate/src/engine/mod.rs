//! Migration engine.
//!
//! The engine drives one target from its stored version towards the version
//! a [`RunRequest`] asks for, one script at a time, and restores the last
//! known-good version when a script fails.

mod migrator;
mod report;
mod request;

pub use migrator::Migrator;
pub use report::{MigrationStatus, RunOutcome, RunReport};
pub use request::RunRequest;
