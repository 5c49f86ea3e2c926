//! Migration script discovery.
//!
//! Scripts live in a single directory, referenced as a plain path or a
//! `file://` URI, and are named `{version}_{title}.{up|down}.{ext}`. Ordering
//! is derived from the version prefix only; file contents are never parsed
//! here. See [`FileSource`] for the validation rules applied on open.

mod file_source;
mod script;
mod script_set;

pub use file_source::FileSource;
pub use script::{Direction, MigrationScript, ScriptFile};
pub use script_set::ScriptSet;
