//! Results of engine invocations.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::driver::VersionState;
use crate::source::{Direction, ScriptSet};

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// At least one script was applied.
    Succeeded,
    /// Nothing was pending in the requested direction.
    NoChange,
    /// The stored version was overridden without running scripts.
    Forced,
}

/// Summary of one successful engine run against a target.
///
/// Failed runs are reported as a [`MigrateError`](crate::MigrateError)
/// instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Name of the target.
    pub target: String,
    /// Direction that was requested.
    pub direction: Direction,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Version state read before the run.
    pub version_before: VersionState,
    /// Version recorded after the run.
    pub version_after: Option<u64>,
    /// Versions of the scripts applied, in application order.
    pub applied: Vec<u64>,
    /// Total duration of the run.
    pub duration: Duration,
}

impl RunReport {
    /// Returns the number of scripts applied.
    #[inline]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Returns whether the stored version changed.
    pub fn changed(&self) -> bool {
        self.version_before.version != self.version_after || self.version_before.dirty
    }
}

/// Migration status of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Name of the target.
    pub target: String,
    /// Stored version state.
    pub current: VersionState,
    /// Newest version available in the script directory.
    pub latest: Option<u64>,
    /// Number of scripts newer than the stored version.
    pub pending: usize,
}

impl MigrationStatus {
    /// Computes the status of `current` against a script set.
    pub fn new(target: impl Into<String>, current: VersionState, scripts: &ScriptSet) -> Self {
        Self {
            target: target.into(),
            current,
            latest: scripts.last_version(),
            pending: scripts.pending_after(current.version),
        }
    }

    /// Returns true if all scripts have been applied and the state is clean.
    #[inline]
    pub fn is_up_to_date(&self) -> bool {
        self.pending == 0 && !self.current.dirty
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latest = self
            .latest
            .map_or_else(|| "none".to_owned(), |v| v.to_string());
        write!(
            f,
            "{}: version {}, latest {latest}, {} pending",
            self.target, self.current, self.pending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MigrationScript, ScriptFile};

    fn scripts() -> ScriptSet {
        ScriptSet::new(
            "migrations",
            (1..=3).map(|v| {
                MigrationScript::new(v, "s", ScriptFile::new(format!("{v}_s.up.sql"), "SELECT 1"))
            }),
        )
    }

    #[test]
    fn status_counts_pending() {
        let status = MigrationStatus::new("write", VersionState::clean(Some(1)), &scripts());
        assert_eq!(status.latest, Some(3));
        assert_eq!(status.pending, 2);
        assert!(!status.is_up_to_date());
        assert_eq!(status.to_string(), "write: version 1, latest 3, 2 pending");
    }

    #[test]
    fn dirty_is_never_up_to_date() {
        let status = MigrationStatus::new("write", VersionState::dirty(Some(3)), &scripts());
        assert_eq!(status.pending, 0);
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn forced_clean_over_dirty_counts_as_changed() {
        let report = RunReport {
            target: "write".into(),
            direction: Direction::Up,
            outcome: RunOutcome::Forced,
            version_before: VersionState::dirty(Some(2)),
            version_after: Some(2),
            applied: Vec::new(),
            duration: Duration::ZERO,
        };
        assert!(report.changed());

        let report = RunReport {
            version_before: VersionState::clean(Some(2)),
            outcome: RunOutcome::NoChange,
            ..report
        };
        assert!(!report.changed());
    }

    #[test]
    fn outcome_names_are_snake_case() {
        assert_eq!(RunOutcome::NoChange.to_string(), "no_change");
        assert_eq!(RunOutcome::Forced.as_ref(), "forced");
    }
}
