//! In-memory driver for tests.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Driver, DriverFactory, VersionState};
use crate::config::{BackendKind, DatabaseTarget};
use crate::source::ScriptFile;
use crate::{MigrateError, MigrateResult};

/// Observable state of one in-memory database.
#[derive(Debug, Default)]
pub struct MemoryState {
    /// Persisted version record.
    pub version: VersionState,
    /// Every version write, in order.
    pub writes: Vec<VersionState>,
    /// Names of the scripts executed, in order.
    pub applied: Vec<String>,
    /// Script name whose execution fails.
    pub fail_script: Option<String>,
    /// Makes every version write fail.
    pub fail_writes: bool,
    /// Whether the driver was closed.
    pub closed: bool,
}

/// Shared handle to an in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    /// Creates a database holding `version`.
    pub fn with_version(version: VersionState) -> Self {
        let database = Self::default();
        database.lock().version = version;
        database
    }

    /// Locks the state for inspection or setup.
    pub fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the persisted version record.
    pub fn version(&self) -> VersionState {
        self.lock().version
    }

    /// Returns the names of the scripts executed so far.
    pub fn applied(&self) -> Vec<String> {
        self.lock().applied.clone()
    }

    /// Returns the number of version writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Makes the script with the given file name fail.
    pub fn fail_on(&self, script: impl Into<String>) {
        self.lock().fail_script = Some(script.into());
    }
}

/// Driver backed by a [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    kind: BackendKind,
    database: MemoryDatabase,
}

impl MemoryDriver {
    /// Creates a driver over `database`, reporting itself as `kind`.
    pub fn new(kind: BackendKind, database: MemoryDatabase) -> Self {
        Self { kind, database }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn read_version(&mut self) -> MigrateResult<VersionState> {
        Ok(self.database.version())
    }

    async fn set_version(&mut self, version: VersionState) -> MigrateResult<()> {
        let mut state = self.database.lock();
        if state.fail_writes {
            return Err(MigrateError::Unexpected("version write refused".into()));
        }
        state.version = version;
        state.writes.push(version);
        Ok(())
    }

    async fn apply_script(&mut self, version: u64, script: &ScriptFile) -> MigrateResult<()> {
        let mut state = self.database.lock();
        if state.fail_script.as_deref() == Some(script.name.as_str()) {
            return Err(MigrateError::Backend {
                version,
                script: script.name.clone(),
                query: Some(script.body.clone()),
                source: "injected failure".into(),
            });
        }
        state.applied.push(script.name.clone());
        Ok(())
    }

    async fn close(&mut self) -> MigrateResult<()> {
        self.database.lock().closed = true;
        Ok(())
    }
}

/// Factory handing out [`MemoryDriver`]s, one database per target name.
#[derive(Debug, Default)]
pub struct MemoryDriverFactory {
    databases: Mutex<HashMap<String, MemoryDatabase>>,
    unreachable: HashSet<String>,
    connects: Mutex<Vec<String>>,
}

impl MemoryDriverFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a database for the target with the given name.
    pub fn with_database(self, target: impl Into<String>, database: MemoryDatabase) -> Self {
        self.databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.into(), database);
        self
    }

    /// Makes connections to the named target fail.
    pub fn with_unreachable(mut self, target: impl Into<String>) -> Self {
        self.unreachable.insert(target.into());
        self
    }

    /// Returns the database for a target, creating an empty one if needed.
    pub fn database(&self, target: &str) -> MemoryDatabase {
        self.databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(target.to_owned())
            .or_default()
            .clone()
    }

    /// Returns the names of the targets a connection was attempted for.
    pub fn connects(&self) -> Vec<String> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DriverFactory for MemoryDriverFactory {
    async fn create(&self, target: &DatabaseTarget) -> MigrateResult<Box<dyn Driver>> {
        // Any known kind works here, whether or not its driver is compiled in.
        let kind = BackendKind::from_str(target.backend.trim()).map_err(|_| {
            MigrateError::UnsupportedBackend {
                kind: target.backend.clone(),
            }
        })?;

        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.name.clone());

        if self.unreachable.contains(&target.name) {
            return Err(MigrateError::connection(kind.as_str(), "connection refused"));
        }

        Ok(Box::new(MemoryDriver::new(kind, self.database(&target.name))))
    }
}
