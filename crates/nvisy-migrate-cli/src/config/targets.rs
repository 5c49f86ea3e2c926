//! Configuration file and target selection.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::Args;
use nvisy_migrate::config::{DatabaseTarget, TargetsConfig};
use nvisy_migrate::runner::RunnerConfig;

use crate::TRACING_TARGET_CONFIG;

/// Configuration file and target selection.
///
/// # Environment Variables
///
/// - `APP_ENV` - Environment name; selects `./config/{APP_ENV}/config.yaml`
/// - `MIGRATE_CONFIG` - Configuration file used when `APP_ENV` is unset
/// - `MIGRATE_TARGETS` - Comma-separated configuration keys of the targets
/// - `MIGRATE_FORCE_VERSION` - Version to record on every target without running scripts
#[derive(Debug, Clone, Args)]
#[must_use = "config does nothing unless you use it"]
pub struct TargetsArgs {
    /// Environment name; when set, the configuration is read from
    /// `./config/{APP_ENV}/config.yaml` and `--config` is ignored.
    #[arg(long, env = "APP_ENV", global = true)]
    pub app_env: Option<String>,

    /// Path to the YAML configuration file.
    #[arg(
        short,
        long,
        env = "MIGRATE_CONFIG",
        default_value = "./config/config.yaml",
        global = true
    )]
    pub config: PathBuf,

    /// Configuration keys of the targets to migrate, in order.
    ///
    /// Nested sections use dotted keys, e.g. `databases.write`.
    #[arg(long, env = "MIGRATE_TARGETS", value_delimiter = ',', global = true)]
    pub targets: Vec<String>,

    /// Records this version on every target without running any script.
    ///
    /// Use it to clear a dirty state after repairing the schema by hand.
    #[arg(long, env = "MIGRATE_FORCE_VERSION", global = true)]
    pub force_version: Option<u64>,

    /// Stops at the first target that fails.
    #[arg(long, env = "MIGRATE_FAIL_FAST", global = true)]
    pub fail_fast: bool,
}

impl TargetsArgs {
    /// Returns the configuration file to read.
    pub fn config_path(&self) -> PathBuf {
        match self.app_env.as_deref().map(str::trim) {
            Some(env) if !env.is_empty() => Path::new("./config").join(env).join("config.yaml"),
            _ => self.config.clone(),
        }
    }

    /// Returns the selected target keys, without blanks.
    pub fn target_keys(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
    }

    /// Returns the run settings shared by every target.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default()
            .with_force_version(self.force_version)
            .with_fail_fast(self.fail_fast)
    }

    /// Reads the configuration file and resolves every selected target.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a selected target is
    /// missing or incomplete.
    pub fn load_targets(&self) -> anyhow::Result<Vec<DatabaseTarget>> {
        let path = self.config_path();
        let config = TargetsConfig::from_path(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config
            .targets(self.target_keys())
            .context("failed to resolve migration targets")
    }

    /// Validates the selection.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target_keys().next().is_none() {
            return Err(anyhow!(
                "No migration targets selected. Pass --targets or set MIGRATE_TARGETS."
            ));
        }

        Ok(())
    }

    /// Logs the selection.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            config = %self.config_path().display(),
            targets = ?self.target_keys().collect::<Vec<_>>(),
            force_version = ?self.force_version,
            fail_fast = self.fail_fast,
            "Target selection"
        );
    }
}
