//! [`DatabaseEngine`] implementation over SQLite files.
//!
//! Each logical database maps to one master file and optionally one replica
//! file. Calls without a transaction open a connection for the duration of
//! the call; a transaction owns its master connection until it is committed,
//! rolled back or dropped. Master files are created on first use unless
//! [`SqliteEngine::create_missing`] turns that off.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dbmap_core::{
    CompiledCommand, ConnectionSettings, DatabaseConfig, DatabaseEngine, Dialect, IsolationLevel, Row,
    SqliteDialect,
};
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::convert::{SqlValue, from_value_ref};
use crate::error::{Result, SqliteError};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Master and replica files of one logical database.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    database: String,
    master: PathBuf,
    replica: Option<PathBuf>,
}

/// SQLite storage engine.
///
/// # Examples
///
/// ```no_run
/// use dbmap_core::{ConnectionSettings, DatabaseEngine};
/// use dbmap_sqlite::SqliteEngine;
///
/// let engine = SqliteEngine::new(vec![
///     ConnectionSettings::master("shop", "data/shop.db"),
///     ConnectionSettings::replica("shop", "data/shop-replica.db"),
/// ])
/// .unwrap();
/// assert_eq!(engine.database_names(), vec!["shop".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    targets: Vec<Target>,
    busy_timeout: Duration,
    create_missing: bool,
}

impl SqliteEngine {
    /// Groups connections by logical database, keeping configuration order.
    ///
    /// The first master entry of a database is its master. The first
    /// non-master entry is its read replica; a database with a single entry
    /// uses it for both roles.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidConnection`] for an entry with an empty
    /// database name or connection string.
    pub fn new(connections: Vec<ConnectionSettings>) -> Result<Self> {
        let mut targets: Vec<Target> = Vec::new();
        for connection in connections {
            if connection.database_name.trim().is_empty() || connection.connection_string.trim().is_empty() {
                return Err(SqliteError::InvalidConnection(format!(
                    "database '{}' at '{}'",
                    connection.database_name, connection.connection_string
                )));
            }
            let path = PathBuf::from(&connection.connection_string);
            let existing = targets
                .iter_mut()
                .find(|t| t.database.eq_ignore_ascii_case(&connection.database_name));
            match existing {
                None if connection.is_master => targets.push(Target {
                    database: connection.database_name,
                    master: path,
                    replica: None,
                }),
                None => targets.push(Target {
                    database: connection.database_name,
                    master: path.clone(),
                    replica: Some(path),
                }),
                Some(target) if connection.is_master => {
                    // A replica listed first stood in as master until now.
                    if target.replica.as_ref() == Some(&target.master) {
                        target.master = path;
                    }
                }
                Some(target) => {
                    if target.replica.is_none() {
                        target.replica = Some(path);
                    }
                }
            }
        }
        Ok(Self {
            targets,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            create_missing: true,
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(config.connections.clone())
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Whether opening a master file that does not exist creates it (the default).
    ///
    /// With `false`, any call touching a missing master file fails instead.
    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }

    /// Master file of a logical database.
    pub fn master_path(&self, database: &str) -> Result<&Path> {
        Ok(&self.target(database)?.master)
    }

    /// File reads without a transaction go to.
    pub fn read_path(&self, database: &str) -> Result<&Path> {
        let target = self.target(database)?;
        Ok(target.replica.as_deref().unwrap_or(&target.master))
    }

    fn target(&self, database: &str) -> Result<&Target> {
        self.targets
            .iter()
            .find(|t| t.database.eq_ignore_ascii_case(database))
            .ok_or_else(|| SqliteError::UnknownDatabase(database.to_string()))
    }

    fn open(&self, database: &str, use_master: bool) -> Result<Connection> {
        let target = self.target(database)?;
        let conn = match &target.replica {
            Some(replica) if !use_master && *replica != target.master => {
                debug!(database, path = %replica.display(), "opening replica");
                Connection::open_with_flags(
                    replica,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?
            }
            _ => {
                let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                if self.create_missing {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                Connection::open_with_flags(&target.master, flags)?
            }
        };
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

/// Transaction handle owning its connection. Rolls back on drop while still open.
pub struct SqliteTransaction {
    conn: Connection,
    database: String,
    active: bool,
}

impl SqliteTransaction {
    pub fn database(&self) -> &str {
        &self.database
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        self.conn.execute_batch(statement)?;
        self.active = false;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("database", &self.database)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(database = %self.database, error = %err, "rollback of abandoned transaction failed");
            } else {
                debug!(database = %self.database, "abandoned transaction rolled back");
            }
        }
    }
}

/// Runs every statement of `command` in order on one connection.
///
/// Returns the rows of the last statement that produced columns and the
/// change count of the last statement that did not.
fn run(conn: &Connection, command: &CompiledCommand) -> Result<(Vec<Row>, u64)> {
    let mut rows = Vec::new();
    let mut changes = 0;
    for statement in &command.statements {
        debug!(database = %command.database, sql = %statement.sql, "executing");
        let mut stmt = conn.prepare(&statement.sql)?;
        for param in &statement.params {
            let index = stmt
                .parameter_index(&param.name)?
                .ok_or_else(|| SqliteError::UnboundParameter(param.name.clone()))?;
            stmt.raw_bind_parameter(index, SqlValue(&param.value))?;
        }

        if stmt.column_count() == 0 {
            changes = stmt.raw_execute()? as u64;
            continue;
        }
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut result = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                values.push(from_value_ref(row.get_ref(index)?, column)?);
            }
            result.push(Row::new(columns.clone(), values));
        }
        rows = result;
    }
    Ok((rows, changes))
}

impl DatabaseEngine for SqliteEngine {
    type Transaction = SqliteTransaction;

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(SqliteDialect)
    }

    fn database_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.database.clone()).collect()
    }

    fn begin_transaction(
        &self,
        database: &str,
        isolation: IsolationLevel,
    ) -> dbmap_core::Result<SqliteTransaction> {
        let conn = self.open(database, true)?;
        let begin = match isolation {
            IsolationLevel::Serializable | IsolationLevel::RepeatableRead => "BEGIN IMMEDIATE",
            IsolationLevel::ReadCommitted => "BEGIN DEFERRED",
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1; BEGIN DEFERRED",
        };
        conn.execute_batch(begin).map_err(SqliteError::from)?;
        Ok(SqliteTransaction {
            conn,
            database: database.to_string(),
            active: true,
        })
    }

    fn commit(&self, mut transaction: SqliteTransaction) -> dbmap_core::Result<()> {
        Ok(transaction.finish("COMMIT")?)
    }

    fn rollback(&self, mut transaction: SqliteTransaction) -> dbmap_core::Result<()> {
        Ok(transaction.finish("ROLLBACK")?)
    }

    fn execute_non_query(
        &self,
        transaction: Option<&mut SqliteTransaction>,
        command: &CompiledCommand,
    ) -> dbmap_core::Result<u64> {
        let (_, changes) = match transaction {
            Some(tx) => run(&tx.conn, command)?,
            None => run(&self.open(&command.database, true)?, command)?,
        };
        Ok(changes)
    }

    fn execute_reader(
        &self,
        transaction: Option<&mut SqliteTransaction>,
        command: &CompiledCommand,
        use_master: bool,
    ) -> dbmap_core::Result<Vec<Row>> {
        let (rows, _) = match transaction {
            Some(tx) => run(&tx.conn, command)?,
            None => run(&self.open(&command.database, use_master)?, command)?,
        };
        Ok(rows)
    }
}
