//! MongoDB driver.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, ReplaceOptions};
use mongodb::{Client, Collection, Database};

use super::{Driver, VersionState};
use crate::config::{BackendKind, DatabaseTarget};
use crate::source::ScriptFile;
use crate::{MigrateError, MigrateResult, TRACING_TARGET_DRIVER};

/// Driver for MongoDB targets.
///
/// Script bodies are JSON arrays of database commands, each run in order
/// with `runCommand`, e.g.
///
/// ```json
/// [
///   {
///     "createIndexes": "users",
///     "indexes": [{ "key": { "email": 1 }, "name": "email_1", "unique": true }]
///   }
/// ]
/// ```
///
/// The version record is a single document in the `schema_migrations`
/// collection of the target database, replaced in place by an upsert so a
/// reader never sees the collection empty mid-write.
pub struct MongoDriver {
    client: Client,
    database: Database,
    versions: Collection<Document>,
}

impl MongoDriver {
    /// Connects to the target and verifies the server is reachable.
    ///
    /// The database is the target's `database` field, falling back to the
    /// default database of the connection string.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Config`] when no database can be determined
    /// and [`MigrateError::Connection`] when the server cannot be reached.
    pub async fn connect(target: &DatabaseTarget) -> MigrateResult<Self> {
        let kind = BackendKind::MongoDb.as_str();
        let options = ClientOptions::parse(&target.connection_string)
            .await
            .map_err(|err| MigrateError::connection(kind, err))?;

        let name = match target.database.trim() {
            "" => options.default_database.clone().ok_or_else(|| {
                MigrateError::config(format!(
                    "target '{}' needs a database name for MongoDB",
                    target.name
                ))
            })?,
            name => name.to_owned(),
        };

        let client =
            Client::with_options(options).map_err(|err| MigrateError::connection(kind, err))?;
        let database = client.database(&name);
        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|err| MigrateError::connection(kind, err))?;

        let versions = database.collection(target.migrations_table(BackendKind::MongoDb));

        tracing::info!(
            target: TRACING_TARGET_DRIVER,
            target_name = %target.name,
            database = %name,
            "Connected to MongoDB"
        );

        Ok(Self {
            client,
            database,
            versions,
        })
    }
}

/// Parses a script body into the commands it runs.
fn parse_commands(version: u64, script: &ScriptFile) -> MigrateResult<Vec<Document>> {
    serde_json::from_str(&script.body).map_err(|err| MigrateError::Backend {
        version,
        script: script.name.clone(),
        query: None,
        source: Box::new(err),
    })
}

fn read_integer(document: &Document, key: &str) -> Option<i64> {
    match document.get(key)? {
        Bson::Int64(value) => Some(*value),
        Bson::Int32(value) => Some(i64::from(*value)),
        _ => None,
    }
}

/// Builds the single version document and the upsert that replaces it.
fn version_replacement(version: i64, dirty: bool) -> (Document, ReplaceOptions) {
    let document = doc! { "version": version, "dirty": dirty };
    let options = ReplaceOptions::builder().upsert(true).build();
    (document, options)
}

fn versions_error(err: mongodb::error::Error) -> MigrateError {
    MigrateError::Unexpected(format!("version collection: {err}").into())
}

#[async_trait]
impl Driver for MongoDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    async fn read_version(&mut self) -> MigrateResult<VersionState> {
        let Some(document) = self
            .versions
            .find_one(doc! {}, None)
            .await
            .map_err(versions_error)?
        else {
            return VersionState::from_row(None);
        };

        let version = read_integer(&document, "version").ok_or_else(|| {
            MigrateError::Unexpected("version document has no integer 'version'".into())
        })?;
        let dirty = document.get_bool("dirty").unwrap_or(false);
        VersionState::from_row(Some((version, dirty)))
    }

    async fn set_version(&mut self, state: VersionState) -> MigrateResult<()> {
        let Some((version, dirty)) = state.to_row()? else {
            self.versions
                .delete_many(doc! {}, None)
                .await
                .map_err(versions_error)?;
            return Ok(());
        };

        let (document, options) = version_replacement(version, dirty);
        self.versions
            .replace_one(doc! {}, document, options)
            .await
            .map_err(versions_error)?;

        Ok(())
    }

    async fn apply_script(&mut self, version: u64, script: &ScriptFile) -> MigrateResult<()> {
        for command in parse_commands(version, script)? {
            let query = command.to_string();
            self.database
                .run_command(command, None)
                .await
                .map_err(|err| MigrateError::Backend {
                    version,
                    script: script.name.clone(),
                    query: Some(query),
                    source: Box::new(err),
                })?;
        }
        Ok(())
    }

    async fn close(&mut self) -> MigrateResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
