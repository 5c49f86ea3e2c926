//! Command execution.

use anyhow::anyhow;
use nvisy_migrate::config::DatabaseTarget;
use nvisy_migrate::driver::DriverFactory;
use nvisy_migrate::engine::{MigrationStatus, RunRequest};
use nvisy_migrate::runner::{RunSummary, TargetOutcome, TargetRunner};
use nvisy_migrate::source::Direction;

use crate::TRACING_TARGET_COMMAND;
use crate::config::{Cli, Command};

/// Runs the parsed command against every selected target.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or any target
/// fails.
pub async fn execute(cli: &Cli) -> anyhow::Result<()> {
    let targets = cli.targets.load_targets()?;
    let runner = TargetRunner::new(cli.targets.runner_config());
    execute_with(&runner, &targets, cli.command).await
}

/// Runs `command` with the given runner.
pub async fn execute_with<F: DriverFactory>(
    runner: &TargetRunner<F>,
    targets: &[DatabaseTarget],
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Up(args) => {
            migrate(runner, targets, RunRequest::new(Direction::Up, args.step)).await
        }
        Command::Down(args) => {
            migrate(runner, targets, RunRequest::new(Direction::Down, args.step)).await
        }
        Command::Status => status(runner, targets).await,
    }
}

async fn migrate<F: DriverFactory>(
    runner: &TargetRunner<F>,
    targets: &[DatabaseTarget],
    request: RunRequest,
) -> anyhow::Result<()> {
    let summary = runner.run_all(targets, request).await;

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        completed = summary.completed_count(),
        skipped = summary.skipped_count(),
        failed = summary.failed_count(),
        "Migration finished"
    );

    ensure_success(&summary)
}

async fn status<F: DriverFactory>(
    runner: &TargetRunner<F>,
    targets: &[DatabaseTarget],
) -> anyhow::Result<()> {
    let summary = runner.status_all(targets).await;

    for result in summary.results() {
        match &result.outcome {
            TargetOutcome::Completed(status) => println!("{}", status_line(status)),
            TargetOutcome::Skipped => println!("{}: migration disabled", result.target),
            TargetOutcome::Failed(err) => println!("{}: error: {err}", result.target),
        }
    }

    ensure_success(&summary)
}

fn status_line(status: &MigrationStatus) -> String {
    let state = if status.is_up_to_date() {
        "up to date"
    } else if status.current.dirty {
        "dirty"
    } else {
        "pending"
    };
    format!("{status} [{state}]")
}

/// Turns failed targets into an error, logging each with a hint.
fn ensure_success<T>(summary: &RunSummary<T>) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    for (target, err) in summary.failures() {
        tracing::error!(
            target: TRACING_TARGET_COMMAND,
            target_name = target,
            code = err.error_code(),
            kind = err.kind().as_ref(),
            suggestion = err.suggestion(),
            "Target failed: {err}"
        );
        failed.push(target);
    }

    if failed.is_empty() {
        return Ok(());
    }

    Err(anyhow!(
        "{} target(s) failed: {}",
        failed.len(),
        failed.join(", ")
    ))
}
