//! PostgreSQL driver.

use async_trait::async_trait;
use diesel::OptionalExtension;
use diesel::sql_types::{BigInt, Bool};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};

use super::sql::{VersionRow, quote_identifier, script_error, version_table_error};
use super::{Driver, VersionState};
use crate::config::{BackendKind, DatabaseTarget};
use crate::source::ScriptFile;
use crate::{MigrateError, MigrateResult, TRACING_TARGET_DRIVER};

/// Driver for PostgreSQL targets.
///
/// The version lives in a single-row table (`schema_migrations` unless the
/// target overrides it) that is created on connect. Script bodies run as one
/// batch, so a multi-statement script is only atomic if it wraps itself in
/// `BEGIN; ... COMMIT;`.
pub struct PgDriver {
    conn: AsyncPgConnection,
    table: String,
}

impl PgDriver {
    /// Connects to the target and makes sure the version table exists.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Connection`] if the database cannot be reached
    /// or the version table cannot be created.
    pub async fn connect(target: &DatabaseTarget) -> MigrateResult<Self> {
        let conn = AsyncPgConnection::establish(&target.connection_string)
            .await
            .map_err(|err| MigrateError::connection(BackendKind::Postgres.as_str(), err))?;

        let table = quote_identifier(target.migrations_table(BackendKind::Postgres), '"');
        let mut driver = Self { conn, table };
        driver.ensure_version_table().await?;

        tracing::info!(
            target: TRACING_TARGET_DRIVER,
            target_name = %target.name,
            table = %driver.table,
            "Connected to PostgreSQL"
        );

        Ok(driver)
    }

    async fn ensure_version_table(&mut self) -> MigrateResult<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)",
            self.table
        );
        self.conn
            .batch_execute(&query)
            .await
            .map_err(|err| MigrateError::connection(BackendKind::Postgres.as_str(), err))
    }
}

#[async_trait]
impl Driver for PgDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn read_version(&mut self) -> MigrateResult<VersionState> {
        let query = format!("SELECT version, dirty FROM {} LIMIT 1", self.table);
        let row = diesel::sql_query(query)
            .get_result::<VersionRow>(&mut self.conn)
            .await
            .optional()
            .map_err(|err| version_table_error(&self.table, err))?;

        VersionState::from_row(row.map(|row| (row.version, row.dirty)))
    }

    async fn set_version(&mut self, state: VersionState) -> MigrateResult<()> {
        let row = state.to_row()?;
        let delete = format!("TRUNCATE {}", self.table);
        let insert = format!("INSERT INTO {} (version, dirty) VALUES ($1, $2)", self.table);

        self.conn
            .transaction(|conn| {
                async move {
                    diesel::sql_query(delete).execute(conn).await?;
                    if let Some((version, dirty)) = row {
                        diesel::sql_query(insert)
                            .bind::<BigInt, _>(version)
                            .bind::<Bool, _>(dirty)
                            .execute(conn)
                            .await?;
                    }
                    Ok::<(), diesel::result::Error>(())
                }
                .scope_boxed()
            })
            .await
            .map_err(|err| version_table_error(&self.table, err))
    }

    async fn apply_script(&mut self, version: u64, script: &ScriptFile) -> MigrateResult<()> {
        self.conn
            .batch_execute(&script.body)
            .await
            .map_err(|err| script_error(version, script, err))
    }
}
