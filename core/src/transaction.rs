//! Transaction context and its status state machine.
//!
//! ```text
//! InTransaction ──commit──▶ Committed
//!       │  └──────rollback──▶ RolledBack
//!       └── engine failure during commit/rollback ──▶ Failed
//! ```
//!
//! Terminal states are final. Committing a committed context, or rolling
//! back a rolled-back one, is a no-op; any other call on a terminal context
//! is a [`DatabaseError::TransactionError`].

use std::fmt;

use tracing::{debug, warn};

use crate::engine::{DatabaseEngine, IsolationLevel};
use crate::error::{DatabaseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    InTransaction,
    Committed,
    RolledBack,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InTransaction => "in transaction",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A native transaction bound to one logical database.
///
/// Single-owner; operations issued through it run in issue order on one
/// connection.
pub struct TransactionContext<E: DatabaseEngine> {
    database: String,
    isolation: IsolationLevel,
    status: TransactionStatus,
    handle: Option<E::Transaction>,
}

impl<E: DatabaseEngine> fmt::Debug for TransactionContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("database", &self.database)
            .field("isolation", &self.isolation)
            .field("status", &self.status)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Commit,
    Rollback,
}

impl<E: DatabaseEngine> TransactionContext<E> {
    /// Begins a transaction on `database`.
    pub fn begin(engine: &E, database: &str, isolation: IsolationLevel) -> Result<Self> {
        let handle = engine.begin_transaction(database, isolation)?;
        debug!(database, isolation = %isolation, "transaction started");
        Ok(Self {
            database: database.to_string(),
            isolation,
            status: TransactionStatus::InTransaction,
            handle: Some(handle),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::InTransaction
    }

    /// Native handle for running a command against `database`.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::TransactionError`] if the context is finished or
    /// bound to a different logical database.
    pub(crate) fn handle_for(&mut self, database: &str) -> Result<&mut E::Transaction> {
        if !self.database.eq_ignore_ascii_case(database) {
            return Err(DatabaseError::TransactionError(format!(
                "transaction is bound to database '{}', not '{database}'",
                self.database
            )));
        }
        let status = self.status;
        match self.handle.as_mut() {
            Some(handle) if status == TransactionStatus::InTransaction => Ok(handle),
            _ => Err(DatabaseError::TransactionError(format!(
                "transaction on '{}' is {status}",
                self.database
            ))),
        }
    }

    pub fn commit(&mut self, engine: &E) -> Result<()> {
        self.finish(engine, Finish::Commit)
    }

    pub fn rollback(&mut self, engine: &E) -> Result<()> {
        self.finish(engine, Finish::Rollback)
    }

    fn finish(&mut self, engine: &E, action: Finish) -> Result<()> {
        let target = match action {
            Finish::Commit => TransactionStatus::Committed,
            Finish::Rollback => TransactionStatus::RolledBack,
        };
        if self.status == target {
            return Ok(());
        }
        if self.status != TransactionStatus::InTransaction {
            return Err(DatabaseError::TransactionError(format!(
                "cannot {} a transaction that is {}",
                if action == Finish::Commit { "commit" } else { "roll back" },
                self.status
            )));
        }
        let Some(handle) = self.handle.take() else {
            self.status = TransactionStatus::Failed;
            return Err(DatabaseError::TransactionError(format!(
                "transaction on '{}' lost its native handle",
                self.database
            )));
        };

        let result = match action {
            Finish::Commit => engine.commit(handle),
            Finish::Rollback => engine.rollback(handle),
        };
        match result {
            Ok(()) => {
                self.status = target;
                debug!(database = %self.database, status = %self.status, "transaction finished");
                Ok(())
            }
            Err(err) => {
                self.status = TransactionStatus::Failed;
                warn!(database = %self.database, error = %err, "transaction failed to finish");
                Err(err)
            }
        }
    }
}
