//! Loads migration scripts from a directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use super::script::parse_file_name;
use super::{Direction, MigrationScript, ScriptFile, ScriptSet};
use crate::config::DatabaseTarget;
use crate::{MigrateError, MigrateResult, TRACING_TARGET_SOURCE};

/// Directory-backed migration source.
///
/// Opening is read-only, so the same source can be opened any number of
/// times and always yields the same [`ScriptSet`] for unchanged files.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
    allow_version_gaps: bool,
}

/// Scripts for one version while the directory is being scanned.
#[derive(Default)]
struct PendingScript {
    title: String,
    up: Option<ScriptFile>,
    down: Option<ScriptFile>,
}

impl FileSource {
    /// Creates a source for a directory path or `file://` URI.
    pub fn new(location: impl AsRef<str>) -> Self {
        let location = location.as_ref().trim();
        let dir = location.strip_prefix("file://").unwrap_or(location);
        Self {
            dir: PathBuf::from(dir),
            allow_version_gaps: false,
        }
    }

    /// Creates a source for the target's script directory and gap policy.
    pub fn for_target(target: &DatabaseTarget) -> Self {
        Self {
            dir: target.migration_dir(),
            allow_version_gaps: target.allow_version_gaps,
        }
    }

    /// Accepts non-contiguous versions when set.
    pub fn allow_version_gaps(mut self, allow: bool) -> Self {
        self.allow_version_gaps = allow;
        self
    }

    /// Returns the directory scripts are read from.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads and validates every script in the directory.
    ///
    /// Files that do not follow `{version}_{title}.{up|down}.{ext}` are
    /// ignored. Subdirectories are not searched.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Source`] if the directory cannot be read, a
    /// version has two scripts for the same direction, a reverse script has
    /// no forward script, or versions are not contiguous while gaps are not
    /// allowed.
    #[tracing::instrument(
        target = TRACING_TARGET_SOURCE,
        skip(self),
        fields(dir = %self.dir.display())
    )]
    pub async fn open(&self) -> MigrateResult<ScriptSet> {
        let error = |reason: String| MigrateError::invalid_source(&self.dir, reason);

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|err| error(format!("cannot read directory: {err}")))?;

        let mut pending: BTreeMap<u64, PendingScript> = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| error(format!("cannot list directory: {err}")))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| error(format!("cannot stat entry: {err}")))?;
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::debug!(
                    target: TRACING_TARGET_SOURCE,
                    file = ?file_name,
                    "Skipping non UTF-8 file name"
                );
                continue;
            };
            let Some(parsed) = parse_file_name(name) else {
                tracing::debug!(
                    target: TRACING_TARGET_SOURCE,
                    file = name,
                    "Skipping file outside naming convention"
                );
                continue;
            };

            let body = fs::read_to_string(entry.path())
                .await
                .map_err(|err| error(format!("cannot read {name}: {err}")))?;
            let file = ScriptFile::new(name, body);

            let slot = pending.entry(parsed.version).or_default();
            let existing = match parsed.direction {
                Direction::Up => slot.up.replace(file),
                Direction::Down => slot.down.replace(file),
            };
            if let Some(existing) = existing {
                return Err(error(format!(
                    "duplicate {} script for version {}: {} and {name}",
                    parsed.direction, parsed.version, existing.name
                )));
            }
            if parsed.direction == Direction::Up || slot.title.is_empty() {
                slot.title = parsed.title.to_owned();
            }
        }

        let mut scripts = Vec::with_capacity(pending.len());
        let mut previous: Option<u64> = None;
        for (version, script) in pending {
            let Some(up) = script.up else {
                return Err(error(format!("version {version} has a down script but no up script")));
            };

            if let Some(previous) = previous
                && !self.allow_version_gaps
                && version != previous + 1
            {
                return Err(error(format!(
                    "version gap between {previous} and {version}"
                )));
            }
            previous = Some(version);

            scripts.push(MigrationScript {
                version,
                title: script.title,
                up,
                down: script.down,
            });
        }

        let set = ScriptSet::new(&self.dir, scripts);
        tracing::debug!(
            target: TRACING_TARGET_SOURCE,
            count = set.len(),
            first = ?set.first().map(|s| s.version),
            last = ?set.last_version(),
            "Loaded migration scripts"
        );

        Ok(set)
    }
}
