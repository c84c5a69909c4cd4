//! The CRUD orchestrator.
//!
//! [`Database`] is the public data-access surface. It asks the
//! [`SqlBuilder`] for every command it runs, hands the command to the
//! [`DatabaseEngine`], enforces optimistic concurrency and soft deletes, and
//! turns unclassified engine failures into [`DatabaseError::DataAccess`]
//! with the entity, the operation and a JSON payload attached.
//!
//! Every operation takes an optional [`TransactionContext`]. Without one it
//! runs in its own auto-committing scope; reads then go to a replica when the
//! engine has one configured.
//!
//! # Examples
//!
//! ```ignore
//! let db = Database::new(engine, registry, settings);
//! db.initialize(&migrations)?;
//!
//! let mut book = BookEntity::new("Dune");
//! db.add(&mut book, "alice", None)?;
//!
//! let mut tx = db.begin_transaction_for::<BookEntity>(IsolationLevel::ReadCommitted)?;
//! book.title = "Dune Messiah".into();
//! db.update(&mut book, "alice", Some(&mut tx))?;
//! db.commit(&mut tx)?;
//! ```

mod bootstrap;
mod read;
mod write;

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::command::CompiledCommand;
use crate::compiler::SqlBuilder;
use crate::config::DatabaseSettings;
use crate::engine::{DatabaseEngine, IsolationLevel};
use crate::entity::Entity;
use crate::error::{DatabaseError, Result};
use crate::expression::{FromExpression, SelectExpression, WhereExpression};
use crate::registry::SchemaRegistry;
use crate::transaction::TransactionContext;
use crate::value::{Row, Value};

/// Repository over one storage engine and its logical databases.
pub struct Database<E: DatabaseEngine> {
    engine: E,
    registry: Arc<SchemaRegistry>,
    builder: SqlBuilder,
    settings: DatabaseSettings,
}

impl<E: DatabaseEngine> std::fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.builder.dialect().name())
            .field("databases", &self.engine.database_names())
            .field("settings", &self.settings)
            .finish()
    }
}

impl<E: DatabaseEngine> Database<E> {
    pub fn new(engine: E, registry: Arc<SchemaRegistry>, settings: DatabaseSettings) -> Self {
        let builder = SqlBuilder::new(Arc::clone(&registry), engine.dialect());
        Self {
            engine,
            registry,
            builder,
            settings,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn sql_builder(&self) -> &SqlBuilder {
        &self.builder
    }

    pub fn select<T: Entity>(&self) -> SelectExpression<T> {
        SelectExpression::new()
    }

    pub fn from<T: Entity>(&self) -> FromExpression<T> {
        FromExpression::new()
    }

    pub fn where_<T: Entity>(&self) -> WhereExpression<T> {
        WhereExpression::new()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub fn begin_transaction(
        &self,
        database: &str,
        isolation: IsolationLevel,
    ) -> Result<TransactionContext<E>> {
        TransactionContext::begin(&self.engine, database, isolation)
    }

    /// Begins a transaction on the logical database `T` is mapped to.
    pub fn begin_transaction_for<T: Entity>(
        &self,
        isolation: IsolationLevel,
    ) -> Result<TransactionContext<E>> {
        let schema = self.registry.schema::<T>()?;
        self.begin_transaction(&schema.database, isolation)
    }

    pub fn commit(&self, transaction: &mut TransactionContext<E>) -> Result<()> {
        transaction.commit(&self.engine)
    }

    pub fn rollback(&self, transaction: &mut TransactionContext<E>) -> Result<()> {
        transaction.rollback(&self.engine)
    }

    /// Runs `work` inside the caller's transaction, or inside an ad hoc one
    /// that commits on success and rolls back on error.
    fn with_transaction<R>(
        &self,
        database: &str,
        transaction: Option<&mut TransactionContext<E>>,
        work: impl FnOnce(&mut TransactionContext<E>) -> Result<R>,
    ) -> Result<R> {
        if let Some(ctx) = transaction {
            return work(ctx);
        }
        let mut ctx = self.begin_transaction(database, IsolationLevel::default())?;
        match work(&mut ctx) {
            Ok(value) => {
                self.commit(&mut ctx)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(&mut ctx) {
                    warn!(database, error = %rollback_err, "rollback after failed operation failed");
                }
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Execution routing
    // ------------------------------------------------------------------

    fn non_query(
        &self,
        transaction: Option<&mut TransactionContext<E>>,
        command: &CompiledCommand,
    ) -> Result<u64> {
        match transaction {
            Some(ctx) => {
                let handle = ctx.handle_for(&command.database)?;
                self.engine.execute_non_query(Some(handle), command)
            }
            None => self.engine.execute_non_query(None, command),
        }
    }

    /// Reads use the master inside a transaction or when `use_master` is set.
    fn reader(
        &self,
        transaction: Option<&mut TransactionContext<E>>,
        command: &CompiledCommand,
        use_master: bool,
    ) -> Result<Vec<Row>> {
        match transaction {
            Some(ctx) => {
                let handle = ctx.handle_for(&command.database)?;
                self.engine.execute_reader(Some(handle), command, true)
            }
            None => self.engine.execute_reader(None, command, use_master),
        }
    }

    fn scalar_value(
        &self,
        transaction: Option<&mut TransactionContext<E>>,
        command: &CompiledCommand,
        use_master: bool,
    ) -> Result<Value> {
        match transaction {
            Some(ctx) => {
                let handle = ctx.handle_for(&command.database)?;
                self.engine.execute_scalar(Some(handle), command, true)
            }
            None => self.engine.execute_scalar(None, command, use_master),
        }
    }
}

/// JSON rendering of a value for diagnostics.
fn payload<S: Serialize + ?Sized>(value: &S) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| format!("<unserializable: {err}>"))
}

/// Rejects invalid items before any I/O.
fn validate_all<T: Entity>(entity: &str, items: &[T]) -> Result<()> {
    for (index, item) in items.iter().enumerate() {
        item.validate().map_err(|reason| {
            DatabaseError::ArgumentNotValid(format!("{entity} item {index} is not valid: {reason}"))
        })?;
    }
    Ok(())
}
