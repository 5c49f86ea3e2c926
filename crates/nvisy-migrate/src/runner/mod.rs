//! Sequential migration of every configured target.
//!
//! Each enabled target gets its own driver, its own script set and its own
//! engine run. Targets never share connections and are processed one after
//! another in configuration order.

mod summary;

use serde::{Deserialize, Serialize};
pub use summary::{RunSummary, TargetOutcome, TargetResult};

use crate::config::DatabaseTarget;
use crate::driver::{BackendDriverFactory, Driver, DriverFactory};
use crate::engine::{MigrationStatus, Migrator, RunReport, RunRequest};
use crate::source::FileSource;
use crate::{MigrateResult, TRACING_TARGET_RUNNER};

/// Process-wide run settings, fixed for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Version recorded on every target instead of running scripts.
    pub force_version: Option<u64>,
    /// Stops at the first failed target.
    pub fail_fast: bool,
}

impl RunnerConfig {
    /// Sets the forced-version override.
    pub fn with_force_version(mut self, version: Option<u64>) -> Self {
        self.force_version = version;
        self
    }

    /// Sets fail-fast mode.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Runs migrations against a list of targets.
#[derive(Debug, Clone)]
pub struct TargetRunner<F = BackendDriverFactory> {
    config: RunnerConfig,
    factory: F,
}

impl TargetRunner {
    /// Creates a runner using the drivers compiled into this crate.
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_factory(config, BackendDriverFactory)
    }
}

impl<F: DriverFactory> TargetRunner<F> {
    /// Creates a runner using a custom driver factory.
    pub fn with_factory(config: RunnerConfig, factory: F) -> Self {
        Self { config, factory }
    }

    /// Returns the run settings.
    #[inline]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Returns the driver factory.
    #[inline]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Migrates every target in order.
    ///
    /// Disabled targets are skipped. A failed target is recorded and the
    /// run moves on to the next target unless fail-fast mode is on. The
    /// configured forced version applies to requests that carry none.
    #[tracing::instrument(
        target = TRACING_TARGET_RUNNER,
        skip_all,
        fields(
            targets = targets.len(),
            direction = %request.direction,
            step = request.step,
        )
    )]
    pub async fn run_all(&self, targets: &[DatabaseTarget], request: RunRequest) -> RunSummary {
        let force_version = request.force_version.or(self.config.force_version);
        let request = request.with_force_version(force_version);
        let mut summary = RunSummary::default();

        for target in targets {
            if target.disabled {
                tracing::info!(
                    target: TRACING_TARGET_RUNNER,
                    target_name = %target.name,
                    "Migration disabled, skipping target"
                );
                summary.push(&target.name, TargetOutcome::Skipped);
                continue;
            }

            match self.run_target(target, &request).await {
                Ok(report) => {
                    tracing::info!(
                        target: TRACING_TARGET_RUNNER,
                        target_name = %target.name,
                        outcome = %report.outcome,
                        applied = report.applied_count(),
                        changed = report.changed(),
                        version = ?report.version_after,
                        "Target migrated"
                    );
                    summary.push(&target.name, TargetOutcome::Completed(report));
                }
                Err(err) => {
                    tracing::error!(
                        target: TRACING_TARGET_RUNNER,
                        target_name = %target.name,
                        kind = %target.backend,
                        error = %err,
                        code = err.error_code(),
                        "Target migration failed"
                    );
                    summary.push(&target.name, TargetOutcome::Failed(err));
                    if self.config.fail_fast {
                        tracing::warn!(
                            target: TRACING_TARGET_RUNNER,
                            "Stopping after first failed target"
                        );
                        break;
                    }
                }
            }
        }

        summary
    }

    /// Reports the migration status of every enabled target.
    ///
    /// Status checks never write, so every target is checked even after a
    /// failure.
    #[tracing::instrument(
        target = TRACING_TARGET_RUNNER,
        skip_all,
        fields(targets = targets.len())
    )]
    pub async fn status_all(&self, targets: &[DatabaseTarget]) -> RunSummary<MigrationStatus> {
        let mut summary = RunSummary::default();

        for target in targets {
            if target.disabled {
                summary.push(&target.name, TargetOutcome::Skipped);
                continue;
            }

            let outcome = match self.status_target(target).await {
                Ok(status) => TargetOutcome::Completed(status),
                Err(err) => {
                    tracing::error!(
                        target: TRACING_TARGET_RUNNER,
                        target_name = %target.name,
                        error = %err,
                        "Status check failed"
                    );
                    TargetOutcome::Failed(err)
                }
            };
            summary.push(&target.name, outcome);
        }

        summary
    }

    /// Migrates a single target, ignoring its disabled flag.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while connecting, loading the scripts or
    /// running the engine.
    pub async fn run_target(
        &self,
        target: &DatabaseTarget,
        request: &RunRequest,
    ) -> MigrateResult<RunReport> {
        let mut driver = self.factory.create(target).await?;
        let result = async {
            let scripts = FileSource::for_target(target).open().await?;
            Migrator::new(&target.name, driver.as_mut(), &scripts)
                .run(request)
                .await
        }
        .await;

        close(target, driver).await;
        result
    }

    async fn status_target(&self, target: &DatabaseTarget) -> MigrateResult<MigrationStatus> {
        let mut driver = self.factory.create(target).await?;
        let result = async {
            let scripts = FileSource::for_target(target).open().await?;
            Migrator::new(&target.name, driver.as_mut(), &scripts)
                .status()
                .await
        }
        .await;

        close(target, driver).await;
        result
    }
}

async fn close(target: &DatabaseTarget, mut driver: Box<dyn Driver>) {
    if let Err(err) = driver.close().await {
        tracing::warn!(
            target: TRACING_TARGET_RUNNER,
            target_name = %target.name,
            error = %err,
            "Failed to close connection"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::MigrateError;
    use crate::driver::{MemoryDatabase, MemoryDriverFactory, VersionState};
    use crate::engine::RunOutcome;

    fn script_dir(count: u64) -> TempDir {
        let dir = TempDir::new().unwrap();
        for v in 1..=count {
            fs::write(dir.path().join(format!("{v}_step.up.sql")), "CREATE").unwrap();
            fs::write(dir.path().join(format!("{v}_step.down.sql")), "DROP").unwrap();
        }
        dir
    }

    fn target(name: &str, kind: &str, dir: &TempDir) -> DatabaseTarget {
        let location = format!("file://{}", dir.path().display());
        DatabaseTarget::new(name, kind, format!("{kind}://localhost/{name}"), location)
    }

    #[tokio::test]
    async fn disabled_target_is_skipped_and_later_targets_run() {
        let dir = script_dir(2);
        let targets = [
            target("write", "postgres", &dir).with_disabled(true),
            target("read", "mysql", &dir),
        ];
        let factory = MemoryDriverFactory::new()
            .with_database("write", MemoryDatabase::with_version(VersionState::clean(Some(1))));
        let runner = TargetRunner::with_factory(RunnerConfig::default(), factory);

        let summary = runner.run_all(&targets, RunRequest::up()).await;

        assert!(summary.is_success());
        assert!(matches!(summary.get("write"), Some(TargetOutcome::Skipped)));
        assert!(matches!(summary.get("read"), Some(TargetOutcome::Completed(_))));
        assert_eq!(runner.factory().connects(), vec!["read"]);

        let write = runner.factory().database("write");
        assert_eq!(write.version(), VersionState::clean(Some(1)));
        assert_eq!(write.write_count(), 0);
        assert_eq!(runner.factory().database("read").version(), VersionState::clean(Some(2)));
    }

    #[tokio::test]
    async fn unsupported_kind_fails_without_connecting() {
        let dir = script_dir(1);
        let targets = [target("legacy", "oracle", &dir), target("write", "postgres", &dir)];
        let runner =
            TargetRunner::with_factory(RunnerConfig::default(), MemoryDriverFactory::new());

        let summary = runner.run_all(&targets, RunRequest::up()).await;

        assert!(!summary.is_success());
        let err = summary.get("legacy").and_then(TargetOutcome::error).unwrap();
        assert!(matches!(err, MigrateError::UnsupportedBackend { .. }));
        assert_eq!(runner.factory().connects(), vec!["write"]);
        assert_eq!(runner.factory().database("legacy").write_count(), 0);
    }

    #[tokio::test]
    async fn failures_continue_unless_fail_fast() {
        let dir = script_dir(1);
        let targets = [target("audit", "postgres", &dir), target("write", "postgres", &dir)];

        let factory = MemoryDriverFactory::new().with_unreachable("audit");
        let runner = TargetRunner::with_factory(RunnerConfig::default(), factory);
        let summary = runner.run_all(&targets, RunRequest::up()).await;
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.completed_count(), 1);

        let factory = MemoryDriverFactory::new().with_unreachable("audit");
        let config = RunnerConfig::default().with_fail_fast(true);
        let runner = TargetRunner::with_factory(config, factory);
        let summary = runner.run_all(&targets, RunRequest::up()).await;
        assert_eq!(summary.results().len(), 1);
        assert!(summary.get("write").is_none());
        assert_eq!(runner.factory().database("write").write_count(), 0);
    }

    #[tokio::test]
    async fn configured_force_version_applies_to_every_target() {
        let dir = script_dir(3);
        let targets = [target("write", "postgres", &dir), target("read", "mongodb", &dir)];
        let factory = MemoryDriverFactory::new()
            .with_database("read", MemoryDatabase::with_version(VersionState::dirty(Some(3))));
        let config = RunnerConfig::default().with_force_version(Some(2));
        let runner = TargetRunner::with_factory(config, factory);

        let summary = runner.run_all(&targets, RunRequest::up()).await;

        assert!(summary.is_success());
        for name in ["write", "read"] {
            let Some(TargetOutcome::Completed(report)) = summary.get(name) else {
                panic!("{name} did not complete");
            };
            assert_eq!(report.outcome, RunOutcome::Forced);
            let database = runner.factory().database(name);
            assert_eq!(database.version(), VersionState::clean(Some(2)));
            assert!(database.applied().is_empty());
        }
    }

    #[tokio::test]
    async fn broken_source_fails_target_and_closes_driver() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("1_a.up.sql"), "CREATE").unwrap();
        fs::write(dir.path().join("1_b.up.sql"), "CREATE").unwrap();
        let targets = [target("write", "postgres", &dir)];
        let runner =
            TargetRunner::with_factory(RunnerConfig::default(), MemoryDriverFactory::new());

        let summary = runner.run_all(&targets, RunRequest::up()).await;

        let err = summary.get("write").and_then(TargetOutcome::error).unwrap();
        assert!(matches!(err, MigrateError::Source { .. }));
        let database = runner.factory().database("write");
        assert!(database.lock().closed);
        assert_eq!(database.write_count(), 0);
    }

    #[tokio::test]
    async fn status_reports_every_enabled_target() {
        let dir = script_dir(3);
        let targets = [
            target("write", "postgres", &dir),
            target("read", "mysql", &dir).with_disabled(true),
        ];
        let factory = MemoryDriverFactory::new()
            .with_database("write", MemoryDatabase::with_version(VersionState::clean(Some(1))));
        let runner = TargetRunner::with_factory(RunnerConfig::default(), factory);

        let summary = runner.status_all(&targets).await;

        let Some(TargetOutcome::Completed(status)) = summary.get("write") else {
            panic!("status missing");
        };
        assert_eq!(status.pending, 2);
        assert!(matches!(summary.get("read"), Some(TargetOutcome::Skipped)));
        assert_eq!(runner.factory().database("write").write_count(), 0);
    }
}
