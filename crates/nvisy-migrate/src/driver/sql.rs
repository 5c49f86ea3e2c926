//! Helpers shared by the relational drivers.

use diesel::QueryableByName;
use diesel::sql_types::{BigInt, Bool};

use crate::source::ScriptFile;
use crate::{BoxError, MigrateError};

/// Longest statement excerpt attached to a backend error.
const QUERY_EXCERPT_LEN: usize = 240;

/// Row of the version table.
#[derive(Debug, QueryableByName)]
pub(crate) struct VersionRow {
    #[diesel(sql_type = BigInt)]
    pub version: i64,
    #[diesel(sql_type = Bool)]
    pub dirty: bool,
}

/// Quotes a possibly schema-qualified identifier with `quote`, doubling any
/// embedded quote characters.
pub(crate) fn quote_identifier(name: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    name.split('.')
        .map(|part| {
            let escaped = part.replace(quote, &doubled);
            format!("{quote}{escaped}{quote}")
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Returns the leading part of a script body, for error reports.
pub(crate) fn query_excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(QUERY_EXCERPT_LEN) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_owned(),
    }
}

/// Wraps a script execution failure.
pub(crate) fn script_error(
    version: u64,
    script: &ScriptFile,
    source: impl Into<BoxError>,
) -> MigrateError {
    MigrateError::Backend {
        version,
        script: script.name.clone(),
        query: Some(query_excerpt(&script.body)),
        source: source.into(),
    }
}

/// Wraps a failure while reading or writing the version table.
pub(crate) fn version_table_error(table: &str, err: diesel::result::Error) -> MigrateError {
    MigrateError::Unexpected(format!("version table {table}: {err}").into())
}
