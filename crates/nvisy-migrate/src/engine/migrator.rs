//! The migration engine.

use std::time::Instant;

use super::{MigrationStatus, RunOutcome, RunReport, RunRequest};
use crate::driver::{Driver, VersionState};
use crate::source::{Direction, MigrationScript, ScriptSet};
use crate::{MigrateError, MigrateResult, TRACING_TARGET_ENGINE};

/// Applies scripts from a [`ScriptSet`] to one target through its driver.
///
/// Every script moves the stored version through three writes: the target
/// version marked dirty, the script itself, then the target version marked
/// clean. When a script or a version write fails, the stored version is
/// forced back to the version read at the start of the run. This repairs
/// the bookkeeping only; schema changes a failed script made before failing
/// stay in place.
pub struct Migrator<'a> {
    target: &'a str,
    driver: &'a mut dyn Driver,
    scripts: &'a ScriptSet,
}

impl<'a> Migrator<'a> {
    /// Creates an engine for the named target.
    pub fn new(target: &'a str, driver: &'a mut dyn Driver, scripts: &'a ScriptSet) -> Self {
        Self {
            target,
            driver,
            scripts,
        }
    }

    /// Runs `request` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DirtyState`] when an earlier run left the
    /// target dirty and no version is forced. The dirty flag is cleared at
    /// the stored version before returning, so the next run is not blocked.
    /// Otherwise returns the first script or driver error. Running out of
    /// scripts is not an error.
    #[tracing::instrument(
        target = TRACING_TARGET_ENGINE,
        skip_all,
        fields(
            target_name = %self.target,
            direction = %request.direction,
            step = request.step,
        )
    )]
    pub async fn run(&mut self, request: &RunRequest) -> MigrateResult<RunReport> {
        let started = Instant::now();
        let last_good = self.driver.read_version().await?;

        tracing::debug!(
            target: TRACING_TARGET_ENGINE,
            version = %last_good,
            scripts = %self.scripts.path().display(),
            pending = self.scripts.pending_after(last_good.version),
            "Read current version"
        );

        if let Some(version) = request.force_version {
            self.driver
                .set_version(VersionState::clean(Some(version)))
                .await?;

            tracing::info!(
                target: TRACING_TARGET_ENGINE,
                from = %last_good,
                to = version,
                "Forced migration version"
            );

            return Ok(RunReport {
                target: self.target.to_owned(),
                direction: request.direction,
                outcome: RunOutcome::Forced,
                version_before: last_good,
                version_after: Some(version),
                applied: Vec::new(),
                duration: started.elapsed(),
            });
        }

        if last_good.dirty {
            tracing::error!(
                target: TRACING_TARGET_ENGINE,
                version = %last_good,
                "Database is dirty, refusing to migrate"
            );
            let err = MigrateError::DirtyState {
                version: last_good.version,
            };
            self.recover(last_good, &err).await;
            return Err(err);
        }

        let mut current = last_good.version;
        let mut applied = Vec::new();
        if let Err(err) = self.apply(request, &mut current, &mut applied).await {
            tracing::error!(
                target: TRACING_TARGET_ENGINE,
                error = %err,
                code = err.error_code(),
                query = err.query(),
                last_good = %last_good,
                applied = applied.len(),
                "Migration failed"
            );
            self.recover(last_good, &err).await;
            return Err(err);
        }

        let outcome = if applied.is_empty() {
            RunOutcome::NoChange
        } else {
            RunOutcome::Succeeded
        };

        let report = RunReport {
            target: self.target.to_owned(),
            direction: request.direction,
            outcome,
            version_before: last_good,
            version_after: current,
            applied,
            duration: started.elapsed(),
        };

        tracing::info!(
            target: TRACING_TARGET_ENGINE,
            outcome = %report.outcome,
            applied = report.applied_count(),
            version = ?report.version_after,
            duration = ?report.duration,
            "Migration run finished"
        );

        Ok(report)
    }

    /// Reads the stored version and compares it with the script set.
    ///
    /// Never writes to the target.
    pub async fn status(&mut self) -> MigrateResult<MigrationStatus> {
        let current = self.driver.read_version().await?;
        Ok(MigrationStatus::new(self.target, current, self.scripts))
    }

    async fn apply(
        &mut self,
        request: &RunRequest,
        current: &mut Option<u64>,
        applied: &mut Vec<u64>,
    ) -> MigrateResult<()> {
        let (direction, limit) = if request.is_unbounded() {
            (request.direction, u64::MAX)
        } else {
            match request.signed_steps() {
                n if n > 0 => (Direction::Up, n.unsigned_abs()),
                n => (Direction::Down, n.unsigned_abs()),
            }
        };

        let mut count = 0;
        while count < limit {
            let result = match direction {
                Direction::Up => self.step_up(current).await,
                Direction::Down => self.step_down(current).await,
            };

            match result {
                Ok(version) => applied.push(version),
                Err(err) if err.is_benign() => {
                    tracing::debug!(
                        target: TRACING_TARGET_ENGINE,
                        applied = applied.len(),
                        "No pending migrations"
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
            count += 1;
        }

        Ok(())
    }

    async fn step_up(&mut self, current: &mut Option<u64>) -> MigrateResult<u64> {
        let scripts = self.scripts;
        let script = scripts
            .next_after(*current)
            .ok_or(MigrateError::NoPendingMigrations)?;

        self.apply_one(script, Direction::Up, Some(script.version))
            .await?;
        *current = Some(script.version);
        Ok(script.version)
    }

    async fn step_down(&mut self, current: &mut Option<u64>) -> MigrateResult<u64> {
        let Some(version) = *current else {
            return Err(MigrateError::NoPendingMigrations);
        };
        let scripts = self.scripts;
        let Some((script, previous)) = scripts.rollback_from(version)? else {
            return Err(MigrateError::NoPendingMigrations);
        };

        self.apply_one(script, Direction::Down, previous).await?;
        *current = previous;
        Ok(script.version)
    }

    async fn apply_one(
        &mut self,
        script: &MigrationScript,
        direction: Direction,
        target: Option<u64>,
    ) -> MigrateResult<()> {
        let file = script.file(direction).ok_or_else(|| {
            MigrateError::Unexpected(
                format!("version {} has no {direction} script", script.version).into(),
            )
        })?;

        tracing::debug!(
            target: TRACING_TARGET_ENGINE,
            version = script.version,
            script = %file.name,
            "Applying migration"
        );

        self.driver.set_version(VersionState::dirty(target)).await?;
        if file.is_empty() {
            tracing::debug!(target: TRACING_TARGET_ENGINE, script = %file.name, "Script is empty");
        } else {
            self.driver.apply_script(script.version, file).await?;
        }
        self.driver.set_version(VersionState::clean(target)).await?;

        tracing::info!(
            target: TRACING_TARGET_ENGINE,
            version = script.version,
            direction = %direction,
            script = %file.name,
            "Applied migration"
        );

        Ok(())
    }

    /// Forces the stored version back to `last_good` after a failed run.
    ///
    /// A failed recovery is logged; the caller still reports the original
    /// error.
    async fn recover(&mut self, last_good: VersionState, err: &MigrateError) {
        if !err.requires_recovery() {
            return;
        }

        let restored = VersionState::clean(last_good.version);
        match self.driver.set_version(restored).await {
            Ok(()) => tracing::warn!(
                target: TRACING_TARGET_ENGINE,
                version = %restored,
                "Restored last known-good version; partial schema changes are not undone"
            ),
            Err(recovery) => tracing::error!(
                target: TRACING_TARGET_ENGINE,
                version = %restored,
                error = %recovery,
                "Failed to restore last known-good version"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::driver::{MemoryDatabase, MemoryDriver};
    use crate::source::ScriptFile;

    fn scripts(count: u64) -> ScriptSet {
        ScriptSet::new(
            "migrations",
            (1..=count).map(|v| {
                let up = ScriptFile::new(format!("{v}_step.up.sql"), "CREATE");
                MigrationScript::new(v, "step", up)
                    .with_down(ScriptFile::new(format!("{v}_step.down.sql"), "DROP"))
            }),
        )
    }

    fn driver(database: &MemoryDatabase) -> MemoryDriver {
        MemoryDriver::new(BackendKind::Postgres, database.clone())
    }

    async fn run(
        database: &MemoryDatabase,
        scripts: &ScriptSet,
        request: RunRequest,
    ) -> MigrateResult<RunReport> {
        let mut driver = driver(database);
        Migrator::new("write", &mut driver, scripts).run(&request).await
    }

    #[tokio::test]
    async fn unbounded_up_applies_everything() {
        let database = MemoryDatabase::default();
        let report = run(&database, &scripts(3), RunRequest::up()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.applied, vec![1, 2, 3]);
        assert_eq!(report.version_before, VersionState::NONE);
        assert_eq!(report.version_after, Some(3));
        assert_eq!(database.version(), VersionState::clean(Some(3)));
        assert_eq!(
            database.applied(),
            vec!["1_step.up.sql", "2_step.up.sql", "3_step.up.sql"]
        );
    }

    #[tokio::test]
    async fn each_script_is_bracketed_by_dirty_and_clean_writes() {
        let database = MemoryDatabase::default();
        run(&database, &scripts(2), RunRequest::up()).await.unwrap();

        assert_eq!(
            database.lock().writes,
            vec![
                VersionState::dirty(Some(1)),
                VersionState::clean(Some(1)),
                VersionState::dirty(Some(2)),
                VersionState::clean(Some(2)),
            ]
        );
    }

    #[tokio::test]
    async fn up_then_down_returns_to_none() {
        let database = MemoryDatabase::default();
        let set = scripts(3);

        let up = run(&database, &set, RunRequest::up()).await.unwrap();
        assert_eq!(up.version_after, Some(3));

        let down = run(&database, &set, RunRequest::down()).await.unwrap();
        assert_eq!(down.outcome, RunOutcome::Succeeded);
        assert_eq!(down.applied, vec![3, 2, 1]);
        assert_eq!(down.version_after, None);
        assert_eq!(database.version(), VersionState::NONE);
        assert_eq!(database.lock().writes.last(), Some(&VersionState::NONE));
    }

    #[tokio::test]
    async fn nothing_pending_is_no_change_without_writes() {
        let database = MemoryDatabase::with_version(VersionState::clean(Some(3)));
        let report = run(&database, &scripts(3), RunRequest::up()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::NoChange);
        assert!(report.applied.is_empty());
        assert_eq!(database.write_count(), 0);

        let empty = MemoryDatabase::default();
        let report = run(&empty, &scripts(3), RunRequest::down()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::NoChange);
        assert_eq!(empty.write_count(), 0);
    }

    #[tokio::test]
    async fn bounded_up_applies_exactly_step_scripts() {
        let database = MemoryDatabase::default();
        let set = scripts(5);
        let mut driver = driver(&database);
        let mut migrator = Migrator::new("write", &mut driver, &set);

        let report = migrator.run(&RunRequest::up().with_step(2)).await.unwrap();
        assert_eq!(report.applied, vec![1, 2]);

        let status = migrator.status().await.unwrap();
        assert_eq!(status.current, VersionState::clean(Some(2)));
        assert_eq!(status.pending, 3);
    }

    #[tokio::test]
    async fn bounded_down_reverts_step_scripts() {
        let database = MemoryDatabase::with_version(VersionState::clean(Some(4)));
        let report = run(&database, &scripts(5), RunRequest::down().with_step(2))
            .await
            .unwrap();

        assert_eq!(report.applied, vec![4, 3]);
        assert_eq!(database.version(), VersionState::clean(Some(2)));
    }

    #[tokio::test]
    async fn negative_step_reverses_direction() {
        let database = MemoryDatabase::with_version(VersionState::clean(Some(3)));
        let report = run(&database, &scripts(3), RunRequest::up().with_step(-1))
            .await
            .unwrap();

        assert_eq!(report.applied, vec![3]);
        assert_eq!(database.version(), VersionState::clean(Some(2)));
    }

    #[tokio::test]
    async fn running_out_of_scripts_is_success() {
        let database = MemoryDatabase::with_version(VersionState::clean(Some(2)));
        let report = run(&database, &scripts(3), RunRequest::up().with_step(5))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.applied, vec![3]);
    }

    #[tokio::test]
    async fn failed_script_restores_pre_run_version() {
        let database = MemoryDatabase::default();
        database.fail_on("2_step.up.sql");

        let err = run(&database, &scripts(3), RunRequest::up()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Backend { version: 2, .. }));
        assert_eq!(database.version(), VersionState::NONE);
        assert_eq!(database.applied(), vec!["1_step.up.sql"]);

        let database = MemoryDatabase::with_version(VersionState::clean(Some(1)));
        database.fail_on("3_step.up.sql");
        run(&database, &scripts(3), RunRequest::up()).await.unwrap_err();
        assert_eq!(database.version(), VersionState::clean(Some(1)));
    }

    #[tokio::test]
    async fn forced_version_runs_no_scripts() {
        let database = MemoryDatabase::with_version(VersionState::clean(Some(1)));
        let request = RunRequest::up().with_force_version(Some(3));
        let report = run(&database, &scripts(5), request).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Forced);
        assert_eq!(report.version_after, Some(3));
        assert_eq!(database.version(), VersionState::clean(Some(3)));
        assert!(database.applied().is_empty());
    }

    #[tokio::test]
    async fn forced_version_clears_dirty_state() {
        let database = MemoryDatabase::with_version(VersionState::dirty(Some(4)));
        let request = RunRequest::down().with_force_version(Some(0));
        let report = run(&database, &scripts(5), request).await.unwrap();

        assert_eq!(report.version_before, VersionState::dirty(Some(4)));
        assert_eq!(database.version(), VersionState::clean(Some(0)));
        assert!(database.applied().is_empty());
    }

    #[tokio::test]
    async fn dirty_state_is_refused_and_cleared() {
        let database = MemoryDatabase::with_version(VersionState::dirty(Some(2)));
        let err = run(&database, &scripts(3), RunRequest::up()).await.unwrap_err();

        assert!(matches!(err, MigrateError::DirtyState { version: Some(2) }));
        assert!(database.applied().is_empty());
        assert_eq!(database.lock().writes, vec![VersionState::clean(Some(2))]);

        // The cleared flag lets the next run proceed from the stored version.
        let report = run(&database, &scripts(3), RunRequest::up()).await.unwrap();
        assert_eq!(report.applied, vec![3]);
        assert_eq!(database.version(), VersionState::clean(Some(3)));
    }

    #[tokio::test]
    async fn dirty_none_state_is_cleared_to_none() {
        let database = MemoryDatabase::with_version(VersionState::dirty(None));
        let err = run(&database, &scripts(2), RunRequest::down()).await.unwrap_err();

        assert!(matches!(err, MigrateError::DirtyState { version: None }));
        assert_eq!(database.version(), VersionState::NONE);
    }

    #[tokio::test]
    async fn missing_down_script_fails_and_recovers() {
        let set = ScriptSet::new(
            "migrations",
            [
                MigrationScript::new(1, "a", ScriptFile::new("1_a.up.sql", "CREATE"))
                    .with_down(ScriptFile::new("1_a.down.sql", "DROP")),
                MigrationScript::new(2, "b", ScriptFile::new("2_b.up.sql", "CREATE")),
            ],
        );
        let database = MemoryDatabase::with_version(VersionState::clean(Some(2)));

        let err = run(&database, &set, RunRequest::down()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Unexpected(_)));
        assert_eq!(database.version(), VersionState::clean(Some(2)));
        assert!(database.applied().is_empty());
    }

    #[tokio::test]
    async fn failed_recovery_keeps_original_error() {
        let database = MemoryDatabase::default();
        database.lock().fail_writes = true;

        let err = run(&database, &scripts(1), RunRequest::up()).await.unwrap_err();
        assert!(err.to_string().contains("version write refused"));
        assert_eq!(database.version(), VersionState::NONE);
    }

    #[tokio::test]
    async fn empty_script_still_advances_version() {
        let set = ScriptSet::new(
            "migrations",
            [MigrationScript::new(1, "noop", ScriptFile::new("1_noop.up.sql", "  \n"))],
        );
        let database = MemoryDatabase::default();
        let report = run(&database, &set, RunRequest::up()).await.unwrap();

        assert_eq!(report.applied, vec![1]);
        assert!(database.applied().is_empty());
        assert_eq!(database.version(), VersionState::clean(Some(1)));
    }

    #[tokio::test]
    async fn status_never_writes() {
        let database = MemoryDatabase::with_version(VersionState::clean(Some(1)));
        let set = scripts(4);
        let mut driver = driver(&database);

        let status = Migrator::new("write", &mut driver, &set).status().await.unwrap();
        assert_eq!(status.latest, Some(4));
        assert_eq!(status.pending, 3);
        assert_eq!(database.write_count(), 0);
    }
}
