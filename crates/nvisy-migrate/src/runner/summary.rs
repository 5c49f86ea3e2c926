//! Per-target results of a multi-target run.

use crate::MigrateError;
use crate::engine::RunReport;

/// What happened to one target.
#[derive(Debug)]
pub enum TargetOutcome<T = RunReport> {
    /// The target is disabled in configuration.
    Skipped,
    /// The target ran to completion.
    Completed(T),
    /// The target failed.
    Failed(MigrateError),
}

impl<T> TargetOutcome<T> {
    /// Returns whether the target failed.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the error of a failed target.
    pub fn error(&self) -> Option<&MigrateError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// A target name paired with its outcome.
#[derive(Debug)]
pub struct TargetResult<T = RunReport> {
    /// Name of the target.
    pub target: String,
    /// What happened to it.
    pub outcome: TargetOutcome<T>,
}

/// Outcomes of every target visited by a run, in visiting order.
///
/// Targets after a failure are absent when the run stopped early.
#[derive(Debug)]
#[must_use = "run summaries report failures that should be handled"]
pub struct RunSummary<T = RunReport> {
    results: Vec<TargetResult<T>>,
}

impl<T> Default for RunSummary<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

impl<T> RunSummary<T> {
    pub(crate) fn push(&mut self, target: impl Into<String>, outcome: TargetOutcome<T>) {
        self.results.push(TargetResult {
            target: target.into(),
            outcome,
        });
    }

    /// Returns true if no target failed.
    pub fn is_success(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_failed())
    }

    /// Returns the results in visiting order.
    pub fn results(&self) -> &[TargetResult<T>] {
        &self.results
    }

    /// Returns the outcome recorded for `target`.
    pub fn get(&self, target: &str) -> Option<&TargetOutcome<T>> {
        self.results
            .iter()
            .find(|r| r.target == target)
            .map(|r| &r.outcome)
    }

    /// Returns the failed targets and their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &MigrateError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.error().map(|err| (r.target.as_str(), err)))
    }

    /// Returns the number of completed targets.
    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Completed(_)))
            .count()
    }

    /// Returns the number of skipped targets.
    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Skipped))
            .count()
    }

    /// Returns the number of failed targets.
    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

impl<T> IntoIterator for RunSummary<T> {
    type IntoIter = std::vec::IntoIter<TargetResult<T>>;
    type Item = TargetResult<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
