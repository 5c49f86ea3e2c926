//! Ordered collection of loaded migration scripts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use derive_more::Deref;

use super::MigrationScript;
use crate::{MigrateError, MigrateResult};

/// Migration scripts keyed and ordered by version.
///
/// Dereferences to the underlying ordered map, so iteration always yields
/// scripts in strictly increasing version order.
#[derive(Debug, Clone, Default, Deref)]
pub struct ScriptSet {
    path: PathBuf,
    #[deref]
    scripts: BTreeMap<u64, MigrationScript>,
}

impl ScriptSet {
    /// Creates a script set from already-loaded scripts.
    pub fn new(
        path: impl Into<PathBuf>,
        scripts: impl IntoIterator<Item = MigrationScript>,
    ) -> Self {
        Self {
            path: path.into(),
            scripts: scripts.into_iter().map(|s| (s.version, s)).collect(),
        }
    }

    /// Returns the directory the scripts were loaded from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the oldest script.
    pub fn first(&self) -> Option<&MigrationScript> {
        self.scripts.values().next()
    }

    /// Returns the newest available version.
    pub fn last_version(&self) -> Option<u64> {
        self.scripts.keys().next_back().copied()
    }

    /// Returns all versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.scripts.keys().copied()
    }

    /// Returns the first script newer than `current`, or the oldest script
    /// when nothing is applied yet.
    pub fn next_after(&self, current: Option<u64>) -> Option<&MigrationScript> {
        match current {
            None => self.first(),
            Some(version) => version
                .checked_add(1)
                .and_then(|next| self.scripts.range(next..).next())
                .map(|(_, script)| script),
        }
    }

    /// Returns the number of scripts newer than `current`.
    pub fn pending_after(&self, current: Option<u64>) -> usize {
        match current {
            None => self.scripts.len(),
            Some(version) => version
                .checked_add(1)
                .map_or(0, |next| self.scripts.range(next..).count()),
        }
    }

    /// Returns the script that reverts `current` along with the version the
    /// database will be at afterwards.
    ///
    /// Returns `Ok(None)` when `current` predates every script, i.e. there is
    /// nothing to roll back.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unexpected`] when `current` falls inside the
    /// script range but has no script of its own.
    pub fn rollback_from(
        &self,
        current: u64,
    ) -> MigrateResult<Option<(&MigrationScript, Option<u64>)>> {
        let Some(first) = self.first() else {
            return Ok(None);
        };
        if current < first.version {
            return Ok(None);
        }

        let script = self.scripts.get(&current).ok_or_else(|| {
            MigrateError::Unexpected(
                format!(
                    "version {current} has no script in {}",
                    self.path.display()
                )
                .into(),
            )
        })?;

        let previous = self.scripts.range(..current).next_back().map(|(v, _)| *v);
        Ok(Some((script, previous)))
    }
}
