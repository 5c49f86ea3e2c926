//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── command: Command        # up | down | status
//! ├── targets: TargetsArgs    # config file, target keys, forced version
//! └── log_format: LogFormat   # text | json
//! ```
//!
//! Every global option can also be provided through an environment variable.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! # Migrate two targets to the latest version
//! nvisy-migrate --targets read-database,write-database up
//!
//! # Or via environment variables
//! APP_ENV=staging MIGRATE_TARGETS=write-database nvisy-migrate down --step 1
//! ```

mod targets;

use std::process;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
pub use targets::TargetsArgs;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "nvisy-migrate")]
#[command(about = "Versioned schema migrations for PostgreSQL, MySQL and MongoDB")]
#[command(version)]
pub struct Cli {
    /// Migration command to run.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file and target selection.
    #[clap(flatten)]
    pub targets: TargetsArgs,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

/// Migration commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Applies pending migrations.
    Up(StepArgs),
    /// Reverts applied migrations.
    Down(StepArgs),
    /// Shows the stored and latest version of every target.
    Status,
}

/// Step count of a migration command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Args)]
pub struct StepArgs {
    /// Number of scripts to apply; 0 applies all of them.
    ///
    /// A negative count runs in the opposite direction.
    #[arg(short = 'n', long, default_value_t = 0, allow_negative_numbers = true)]
    pub step: i64,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so that its values act as defaults for
    /// clap's `env` lookups.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.targets
            .validate()
            .context("invalid target selection")?;
        Ok(())
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            command = ?self.command,
            "Migration command"
        );
        self.targets.log();
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_up_with_step() {
        let cli = Cli::parse_from([
            "nvisy-migrate",
            "--targets",
            "write-database",
            "up",
            "--step",
            "2",
        ]);
        assert_eq!(cli.command, Command::Up(StepArgs { step: 2 }));
        assert_eq!(cli.targets.targets, vec!["write-database"]);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn parses_down_without_step_as_unbounded() {
        let cli = Cli::parse_from(["nvisy-migrate", "--targets", "a,b", "down"]);
        assert_eq!(cli.command, Command::Down(StepArgs { step: 0 }));
        assert_eq!(cli.targets.targets, vec!["a", "b"]);
    }

    #[test]
    fn accepts_negative_steps() {
        let cli = Cli::parse_from(["nvisy-migrate", "--targets", "a", "up", "-n", "-1"]);
        assert_eq!(cli.command, Command::Up(StepArgs { step: -1 }));
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "nvisy-migrate",
            "status",
            "--targets",
            "write-database",
            "--log-format",
            "json",
            "--fail-fast",
        ]);
        assert_eq!(cli.command, Command::Status);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.targets.fail_fast);
    }

    #[test]
    fn parses_forced_version_zero() {
        let cli =
            Cli::parse_from(["nvisy-migrate", "--targets", "a", "--force-version", "0", "up"]);
        assert_eq!(cli.targets.force_version, Some(0));
        assert_eq!(cli.targets.runner_config().force_version, Some(0));
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(Cli::try_parse_from(["nvisy-migrate", "--targets", "a", "redo"]).is_err());
    }

    #[test]
    fn validate_requires_targets() {
        let cli = Cli::parse_from(["nvisy-migrate", "--targets", "", "up"]);
        assert!(cli.validate().is_err());
    }
}
