//! Persisted version bookkeeping.

use std::fmt;

use crate::{MigrateError, MigrateResult};

/// Version marker stored for "no version, but dirty".
pub(crate) const NIL_VERSION: i64 = -1;

/// Applied version and dirty flag, as persisted in the target database.
///
/// The version table holds at most one row: an empty table means no version
/// has been applied, and `version = -1` is only ever written together with
/// `dirty = true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VersionState {
    /// Currently applied version, `None` before the first migration.
    pub version: Option<u64>,
    /// Set while a script is being applied; a stale `true` means an earlier
    /// run was interrupted.
    pub dirty: bool,
}

impl VersionState {
    /// State of a database no migration has touched.
    pub const NONE: Self = Self {
        version: None,
        dirty: false,
    };

    /// Creates a clean state at `version`.
    #[inline]
    pub const fn clean(version: Option<u64>) -> Self {
        Self {
            version,
            dirty: false,
        }
    }

    /// Creates a dirty state at `version`.
    #[inline]
    pub const fn dirty(version: Option<u64>) -> Self {
        Self {
            version,
            dirty: true,
        }
    }

    /// Converts this state into the row to persist, or `None` when the
    /// version table should be left empty.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unexpected`] for versions beyond `i64::MAX`.
    pub fn to_row(self) -> MigrateResult<Option<(i64, bool)>> {
        match (self.version, self.dirty) {
            (None, false) => Ok(None),
            (None, true) => Ok(Some((NIL_VERSION, true))),
            (Some(version), dirty) => {
                let version = i64::try_from(version).map_err(|_| {
                    let reason = format!("version {version} does not fit in BIGINT");
                    MigrateError::Unexpected(reason.into())
                })?;
                Ok(Some((version, dirty)))
            }
        }
    }

    /// Reads a state back from a persisted row.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unexpected`] for negative versions other than
    /// the nil marker.
    pub fn from_row(row: Option<(i64, bool)>) -> MigrateResult<Self> {
        match row {
            None => Ok(Self::NONE),
            Some((NIL_VERSION, dirty)) => Ok(Self {
                version: None,
                dirty,
            }),
            Some((version, dirty)) => {
                let version = u64::try_from(version).map_err(|_| {
                    MigrateError::Unexpected(format!("stored version {version} is invalid").into())
                })?;
                Ok(Self {
                    version: Some(version),
                    dirty,
                })
            }
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "{version}")?,
            None => f.write_str("none")?,
        }
        if self.dirty {
            f.write_str(" (dirty)")?;
        }
        Ok(())
    }
}
