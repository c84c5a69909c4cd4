use tracing::{info, warn};

use crate::engine::{DatabaseEngine, IsolationLevel};
use crate::error::{DatabaseError, Result};
use crate::migration::{
    DatabaseReport, InitializeReport, Migration, SchemaState, SystemInfo, plan_migrations,
};
use crate::transaction::TransactionContext;

use super::Database;

fn table_create_error(database: &str, message: impl Into<String>, source: Option<DatabaseError>) -> DatabaseError {
    DatabaseError::TableCreateError {
        database: database.to_string(),
        message: message.into(),
        source: source.map(Box::new),
    }
}

fn migrate_error(database: &str, message: impl Into<String>, source: DatabaseError) -> DatabaseError {
    DatabaseError::MigrateError {
        database: database.to_string(),
        message: message.into(),
        source: Some(Box::new(source)),
    }
}

/// Failure outside either branch: creation errors for a brand-new database,
/// migration errors otherwise.
fn bootstrap_error(
    database: &str,
    found: Option<SchemaState>,
    message: impl Into<String>,
    source: DatabaseError,
) -> DatabaseError {
    match found {
        Some(SchemaState::BrandNew) => table_create_error(database, message, Some(source)),
        _ => migrate_error(database, message, source),
    }
}

impl<E: DatabaseEngine> Database<E> {
    /// Contents of the reserved system table; empty (version 0) when it does not exist.
    pub fn system_info(&self, database: &str) -> Result<SystemInfo> {
        self.read_system_info(database, None)
    }

    fn read_system_info(
        &self,
        database: &str,
        mut transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<SystemInfo> {
        let exists = self.builder.system_info_exists(database);
        let found = self.scalar_value(transaction.as_deref_mut(), &exists, true)?;
        let mut info = SystemInfo::default();
        if found.as_i64().unwrap_or(0) < 1 {
            return Ok(info);
        }
        let select = self.builder.system_info_select(database);
        for row in self.reader(transaction, &select, true)? {
            info.set(row.get::<String>("Name")?, row.get::<String>("Value")?);
        }
        Ok(info)
    }

    /// Brings every logical database to the configured schema version.
    ///
    /// Each database is checked and upgraded inside its own serializable
    /// transaction. A brand-new database gets every mapped table and the
    /// system table at version 1; an older one runs the supplied migration
    /// chain. The first failure rolls back its database and is returned;
    /// databases processed before it stay committed.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::TableCreateError`] when a brand-new database cannot be created,
    ///   including a configured version other than 1
    /// - [`DatabaseError::MigrateError`] when the migration chain is incomplete or a step fails,
    ///   or when the system table cannot be read
    ///
    /// Both carry the database name; a failed commit is reported with the
    /// variant of the branch that ran.
    pub fn initialize(&self, migrations: &[Migration]) -> Result<InitializeReport> {
        let mut report = InitializeReport::default();
        for database in self.engine.database_names() {
            let mut ctx = self
                .begin_transaction(&database, IsolationLevel::Serializable)
                .map_err(|e| bootstrap_error(&database, None, "starting the bootstrap transaction failed", e))?;
            match self.bootstrap_database(&database, migrations, &mut ctx) {
                Ok(outcome) => {
                    self.commit(&mut ctx).map_err(|e| {
                        bootstrap_error(&database, Some(outcome.found), "committing the bootstrap failed", e)
                    })?;
                    info!(
                        database = %outcome.database,
                        found = %outcome.found,
                        version = outcome.version_after,
                        "database ready"
                    );
                    report.databases.push(outcome);
                }
                Err(err) => {
                    if let Err(rollback_err) = self.rollback(&mut ctx) {
                        warn!(database = %database, error = %rollback_err, "bootstrap rollback failed");
                    }
                    warn!(database = %database, error = %err, "bootstrap rolled back");
                    return Err(err);
                }
            }
        }
        Ok(report)
    }

    fn bootstrap_database(
        &self,
        database: &str,
        migrations: &[Migration],
        ctx: &mut TransactionContext<E>,
    ) -> Result<DatabaseReport> {
        let target = self.settings.version;
        let current = self
            .read_system_info(database, Some(&mut *ctx))
            .map_err(|e| bootstrap_error(database, None, "reading the system table failed", e))?
            .version();
        let found = if current == 0 && self.settings.automatic_create_table {
            SchemaState::BrandNew
        } else if current >= target {
            SchemaState::UpToDate
        } else {
            SchemaState::NeedsMigration
        };

        let mut outcome = DatabaseReport {
            database: database.to_string(),
            found,
            state: SchemaState::Ready,
            version_before: current,
            version_after: current,
            tables_created: 0,
            migrations_applied: 0,
        };

        match found {
            SchemaState::BrandNew => {
                outcome.tables_created = self.create_database(database, target, ctx)?;
                outcome.version_after = 1;
            }
            SchemaState::NeedsMigration => {
                outcome.migrations_applied = self.migrate_database(database, current, target, migrations, ctx)?;
                outcome.version_after = target;
            }
            _ => {
                if current > target {
                    warn!(
                        database,
                        stored = current,
                        configured = target,
                        "stored schema version is newer than the configured one"
                    );
                }
            }
        }
        Ok(outcome)
    }

    fn create_database(&self, database: &str, target: u32, ctx: &mut TransactionContext<E>) -> Result<usize> {
        if target != 1 {
            return Err(table_create_error(
                database,
                format!("a new database is created at version 1, configured version is {target}"),
                None,
            ));
        }
        let schemas = self.registry.schemas_in(database);
        info!(database, tables = schemas.len(), "creating brand-new database");
        for schema in &schemas {
            let command = self.builder.create_table(schema, false);
            self.non_query(Some(&mut *ctx), &command).map_err(|e| {
                table_create_error(database, format!("creating table {} failed", schema.table), Some(e))
            })?;
        }
        let command = self.builder.system_info_create(database);
        self.non_query(Some(&mut *ctx), &command)
            .map_err(|e| table_create_error(database, "creating the system table failed", Some(e)))?;
        Ok(schemas.len())
    }

    fn migrate_database(
        &self,
        database: &str,
        current: u32,
        target: u32,
        migrations: &[Migration],
        ctx: &mut TransactionContext<E>,
    ) -> Result<usize> {
        let plan = plan_migrations(database, current, target, migrations)?;
        info!(database, from = current, to = target, steps = plan.len(), "migrating");
        for step in &plan {
            let command = self.builder.raw(database, step.sql());
            self.non_query(Some(&mut *ctx), &command).map_err(|e| {
                migrate_error(
                    database,
                    format!("step {} -> {} failed", step.old_version(), step.new_version()),
                    e,
                )
            })?;
            info!(database, version = step.new_version(), "migration step applied");
        }
        let command = self.builder.system_info_update_version(database, target);
        self.non_query(Some(&mut *ctx), &command)
            .map_err(|e| migrate_error(database, "recording the new version failed", e))?;
        Ok(plan.len())
    }
}
