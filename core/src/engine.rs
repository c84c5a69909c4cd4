//! Storage engine boundary.
//!
//! A [`DatabaseEngine`] owns physical connections, resolves a logical
//! database name to its master or replica connection and runs compiled
//! commands. The orchestrator never touches a connection directly.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::CompiledCommand;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::value::{Row, Value};

/// Transaction isolation level requested from the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadUncommitted => "read uncommitted",
            Self::ReadCommitted => "read committed",
            Self::RepeatableRead => "repeatable read",
            Self::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

/// Backend adapter executing compiled commands.
///
/// Commands run against `command.database`. With a transaction handle they
/// run on the transaction's connection; without one the engine opens a
/// connection for the call, the master for writes and, when `use_master` is
/// `false`, a replica for reads if one is configured.
pub trait DatabaseEngine: Send + Sync {
    /// Native transaction handle. Dropping an uncommitted handle must roll it back.
    type Transaction: Send;

    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Logical databases this engine serves, in configuration order.
    fn database_names(&self) -> Vec<String>;

    fn begin_transaction(&self, database: &str, isolation: IsolationLevel) -> Result<Self::Transaction>;

    fn commit(&self, transaction: Self::Transaction) -> Result<()>;

    fn rollback(&self, transaction: Self::Transaction) -> Result<()>;

    /// Runs every statement; returns the rows affected by the last one.
    fn execute_non_query(
        &self,
        transaction: Option<&mut Self::Transaction>,
        command: &CompiledCommand,
    ) -> Result<u64>;

    /// Runs every statement; returns the rows of the last statement that produced a result set.
    fn execute_reader(
        &self,
        transaction: Option<&mut Self::Transaction>,
        command: &CompiledCommand,
        use_master: bool,
    ) -> Result<Vec<Row>>;

    /// First column of the first row of [`Self::execute_reader`], `Value::Null` when empty.
    fn execute_scalar(
        &self,
        transaction: Option<&mut Self::Transaction>,
        command: &CompiledCommand,
        use_master: bool,
    ) -> Result<Value> {
        let rows = self.execute_reader(transaction, command, use_master)?;
        Ok(rows
            .first()
            .and_then(|row| row.value_at(0))
            .cloned()
            .unwrap_or(Value::Null))
    }
}
