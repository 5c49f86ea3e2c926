//! MySQL driver.

use async_trait::async_trait;
use diesel::OptionalExtension;
use diesel::sql_types::{BigInt, Bool};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncMysqlConnection, RunQueryDsl, SimpleAsyncConnection};

use super::sql::{VersionRow, quote_identifier, script_error, version_table_error};
use super::{Driver, VersionState};
use crate::config::{BackendKind, DatabaseTarget};
use crate::source::ScriptFile;
use crate::{MigrateError, MigrateResult, TRACING_TARGET_DRIVER};

/// Driver for MySQL and MariaDB targets.
///
/// Uses `go_schema_migrations` as the default version table. MySQL commits
/// DDL implicitly, so a failing script can leave earlier statements of the
/// same script applied.
pub struct MysqlDriver {
    conn: AsyncMysqlConnection,
    table: String,
}

impl MysqlDriver {
    /// Connects to the target and makes sure the version table exists.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Connection`] if the database cannot be reached
    /// or the version table cannot be created.
    pub async fn connect(target: &DatabaseTarget) -> MigrateResult<Self> {
        let conn = AsyncMysqlConnection::establish(&target.connection_string)
            .await
            .map_err(|err| MigrateError::connection(BackendKind::Mysql.as_str(), err))?;

        let table = quote_identifier(target.migrations_table(BackendKind::Mysql), '`');
        let mut driver = Self { conn, table };

        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)",
            driver.table
        );
        driver
            .conn
            .batch_execute(&query)
            .await
            .map_err(|err| MigrateError::connection(BackendKind::Mysql.as_str(), err))?;

        tracing::info!(
            target: TRACING_TARGET_DRIVER,
            target_name = %target.name,
            table = %driver.table,
            "Connected to MySQL"
        );

        Ok(driver)
    }
}

#[async_trait]
impl Driver for MysqlDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
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
        // TRUNCATE commits implicitly in MySQL, DELETE stays inside the transaction.
        let delete = format!("DELETE FROM {}", self.table);
        let insert = format!("INSERT INTO {} (version, dirty) VALUES (?, ?)", self.table);

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
