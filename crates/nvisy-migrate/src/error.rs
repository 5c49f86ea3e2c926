//! Error types and utilities for migration runs.
//!
//! Every failure a run can hit is a [`MigrateError`]. The variants follow the
//! classification the engine acts on: configuration problems stop the process
//! before any target runs, backend and unexpected failures trigger version
//! recovery, and [`MigrateError::NoPendingMigrations`] is a benign signal that
//! never leaves the engine as a failure.

use std::borrow::Cow;
use std::path::PathBuf;

use strum::{AsRefStr, IntoStaticStr};

/// Type-erased error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a [`MigrateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or incomplete target configuration.
    Config,
    /// Backend kind outside the supported set.
    UnsupportedBackend,
    /// The backend could not be reached or refused the connection.
    Connection,
    /// The script directory is unreadable or inconsistent.
    Source,
    /// Nothing left to apply in the requested direction.
    NoPendingMigrations,
    /// A script failed to apply.
    Backend,
    /// The stored version was left dirty by an earlier run.
    DirtyState,
    /// Anything else.
    Unexpected,
}

/// Comprehensive error type for all migration operations.
#[derive(Debug, thiserror::Error)]
#[must_use = "migration errors should be handled appropriately"]
pub enum MigrateError {
    /// Target configuration is malformed or incomplete.
    ///
    /// Raised while loading configuration, before any target runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend kind is not one of the supported kinds, or its support
    /// was not compiled in.
    ///
    /// No connection is attempted for such a target.
    #[error("Unsupported backend kind: {kind}")]
    UnsupportedBackend {
        /// Kind string as it appeared in configuration.
        kind: String,
    },

    /// Failed to establish a connection to the target database.
    #[error("Failed to connect to {kind} database: {source}")]
    Connection {
        /// Backend kind the connection was attempted for.
        kind: &'static str,
        #[source]
        source: BoxError,
    },

    /// The migration script directory could not be read or is inconsistent.
    #[error("Invalid migration source {}: {reason}", .path.display())]
    Source {
        /// Directory the scripts were loaded from.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// There are no scripts left to apply in the requested direction.
    ///
    /// This is not a failure; the engine turns it into a successful outcome.
    #[error("No pending migrations")]
    NoPendingMigrations,

    /// A migration script failed to apply.
    #[error("Migration {version} ({script}) failed: {source}")]
    Backend {
        /// Version of the offending script.
        version: u64,
        /// File name of the offending script.
        script: String,
        /// Statement or command excerpt that failed, when known.
        query: Option<String>,
        #[source]
        source: BoxError,
    },

    /// The stored version is marked dirty by an earlier, interrupted run.
    #[error("Database is dirty at version {}, inspect the schema before rerunning", display_version(.version))]
    DirtyState {
        /// Version recorded alongside the dirty flag.
        version: Option<u64>,
    },

    /// Unexpected error occurred.
    #[error("Unexpected error: {0}")]
    Unexpected(Cow<'static, str>),
}

fn display_version(version: &Option<u64>) -> String {
    version.map_or_else(|| "none".to_owned(), |v| v.to_string())
}

impl MigrateError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a source error for the given directory.
    pub fn invalid_source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Source {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connection error for the given backend kind.
    pub fn connection(kind: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            kind,
            source: source.into(),
        }
    }

    /// Returns the classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::UnsupportedBackend { .. } => ErrorKind::UnsupportedBackend,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Source { .. } => ErrorKind::Source,
            Self::NoPendingMigrations => ErrorKind::NoPendingMigrations,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::DirtyState { .. } => ErrorKind::DirtyState,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Returns whether this error only signals that nothing was left to do.
    #[inline]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::NoPendingMigrations)
    }

    /// Returns whether the stored version must be forced back to the last
    /// known-good version after this error.
    ///
    /// Failures raised while scripts are being applied qualify, as does a
    /// dirty state found on entry; errors that stop a target before the
    /// engine reads the database do not.
    #[inline]
    pub const fn requires_recovery(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::DirtyState { .. } | Self::Unexpected(_)
        )
    }

    /// Returns the offending query excerpt for backend failures.
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Backend { query, .. } => query.as_deref(),
            _ => None,
        }
    }

    /// Returns a unique error code for this error type.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "M001",
            Self::UnsupportedBackend { .. } => "M002",
            Self::Connection { .. } => "M003",
            Self::Source { .. } => "M004",
            Self::NoPendingMigrations => "M005",
            Self::Backend { .. } => "M006",
            Self::DirtyState { .. } => "M007",
            Self::Unexpected(_) => "M008",
        }
    }

    /// Provides a human-readable suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => {
                Some("Check the configuration file and the selected target keys")
            }
            Self::UnsupportedBackend { .. } => {
                Some("Use one of: postgres, mysql, mongodb (and build with the matching feature)")
            }
            Self::Connection { .. } => {
                Some("Check the connection string and that the database is reachable")
            }
            Self::Source { .. } => Some(
                "Scripts must be named {version}_{title}.up.{ext} / .down.{ext} with unique, contiguous versions",
            ),
            Self::NoPendingMigrations => None,
            Self::Backend { .. } => Some(
                "The version record was reset, but partial schema changes may remain; inspect the database before rerunning",
            ),
            Self::DirtyState { .. } => Some(
                "The dirty flag was cleared; repair the schema by hand, or rerun with --force-version",
            ),
            Self::Unexpected(_) => None,
        }
    }
}

/// Specialized [`Result`] type for migration operations.
pub type MigrateResult<T, E = MigrateError> = Result<T, E>;
