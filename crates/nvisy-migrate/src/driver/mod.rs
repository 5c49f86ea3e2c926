//! Backend drivers.
//!
//! A [`Driver`] owns one live connection to a target database and knows how
//! to read and write the persisted [`VersionState`] and how to execute a
//! script body. Drivers are created per target by a [`DriverFactory`]; the
//! default [`BackendDriverFactory`] picks the implementation from the
//! target's backend kind.

use async_trait::async_trait;

use crate::config::{BackendKind, DatabaseTarget};
use crate::source::ScriptFile;
use crate::{MigrateError, MigrateResult, TRACING_TARGET_DRIVER};

#[cfg(any(test, feature = "test-utils"))]
mod memory;
#[cfg(feature = "mongodb")]
mod mongo;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(any(feature = "postgres", feature = "mysql"))]
mod sql;
mod version;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub use memory::{MemoryDatabase, MemoryDriver, MemoryDriverFactory, MemoryState};
#[cfg(feature = "mongodb")]
#[cfg_attr(docsrs, doc(cfg(feature = "mongodb")))]
pub use mongo::MongoDriver;
#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub use mysql::MysqlDriver;
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub use postgres::PgDriver;
pub use version::VersionState;

/// A live connection to one target database.
///
/// Implementations keep at most one row of version state. Writes of that
/// state must be atomic: readers never observe a half-written row.
#[async_trait]
pub trait Driver: Send {
    /// Returns the backend this driver talks to.
    fn kind(&self) -> BackendKind;

    /// Reads the persisted version state.
    async fn read_version(&mut self) -> MigrateResult<VersionState>;

    /// Replaces the persisted version state.
    async fn set_version(&mut self, state: VersionState) -> MigrateResult<()>;

    /// Executes one script body on behalf of `version`.
    ///
    /// Failures are reported as [`MigrateError::Backend`].
    async fn apply_script(&mut self, version: u64, script: &ScriptFile) -> MigrateResult<()>;

    /// Releases the connection.
    async fn close(&mut self) -> MigrateResult<()> {
        Ok(())
    }
}

/// Creates drivers for targets.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Opens a driver for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnsupportedBackend`] without attempting a
    /// connection when the target's kind is not supported, and
    /// [`MigrateError::Connection`] when the database cannot be reached.
    async fn create(&self, target: &DatabaseTarget) -> MigrateResult<Box<dyn Driver>>;
}

/// Factory for the drivers compiled into this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendDriverFactory;

#[async_trait]
impl DriverFactory for BackendDriverFactory {
    async fn create(&self, target: &DatabaseTarget) -> MigrateResult<Box<dyn Driver>> {
        let kind = target.backend_kind()?;

        tracing::debug!(
            target: TRACING_TARGET_DRIVER,
            target_name = %target.name,
            kind = %kind,
            url = %target.connection_string_masked(),
            "Connecting to database"
        );

        match kind {
            #[cfg(feature = "postgres")]
            BackendKind::Postgres => Ok(Box::new(PgDriver::connect(target).await?)),
            #[cfg(feature = "mysql")]
            BackendKind::Mysql => Ok(Box::new(MysqlDriver::connect(target).await?)),
            #[cfg(feature = "mongodb")]
            BackendKind::MongoDb => Ok(Box::new(MongoDriver::connect(target).await?)),
            #[allow(unreachable_patterns)]
            _ => Err(MigrateError::UnsupportedBackend {
                kind: target.backend.clone(),
            }),
        }
    }
}
