//! Error types for the SQLite engine adapter.
//!
//! [`SqliteError`] is internal to the adapter. Every public engine call
//! converts it into [`DatabaseError`] so callers only ever see the shared
//! taxonomy; driver failures become [`DatabaseError::Engine`] carrying the
//! SQLite extended result code.

use dbmap_core::DatabaseError;
use thiserror::Error;

/// Errors raised by the SQLite adapter.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A stored value could not be converted to a column [`Value`](dbmap_core::Value).
    #[error("conversion error in column '{column}': {message}")]
    ConversionError { column: String, message: String },

    /// The command targets a logical database with no configured connection.
    #[error("no connection configured for logical database '{0}'")]
    UnknownDatabase(String),

    /// A connection entry is missing its database name or file path.
    #[error("invalid connection settings: {0}")]
    InvalidConnection(String),

    /// A compiled parameter does not appear in its statement.
    #[error("parameter '{0}' is not referenced by its statement")]
    UnboundParameter(String),
}

impl SqliteError {
    /// SQLite extended result code, when the driver reported one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::DatabaseError(rusqlite::Error::SqliteFailure(failure, _)) => {
                Some(failure.extended_code)
            }
            _ => None,
        }
    }
}

impl From<SqliteError> for DatabaseError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::DatabaseError(_) => DatabaseError::engine_with(err.code(), err),
            SqliteError::ConversionError { column, message } => {
                DatabaseError::Mapping { column, message }
            }
            SqliteError::UnknownDatabase(_)
            | SqliteError::InvalidConnection(_)
            | SqliteError::UnboundParameter(_) => {
                DatabaseError::ArgumentNotValid(err.to_string())
            }
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dbmap_core::ErrorKind;

    #[test]
    fn test_driver_failure_keeps_extended_code() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let failure = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();

        let err: DatabaseError = SqliteError::from(failure).into();

        assert_eq!(err.kind(), ErrorKind::Engine);
        match err {
            DatabaseError::Engine { code, ref message, .. } => {
                assert_eq!(code, Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE));
                assert!(message.contains("UNIQUE"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_adapter_failures_are_classified() {
        let err: DatabaseError = SqliteError::UnknownDatabase("audit".into()).into();
        assert_eq!(err.kind(), ErrorKind::ArgumentNotValid);

        let err: DatabaseError = SqliteError::ConversionError {
            column: "Title".into(),
            message: "invalid UTF-8".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Mapping);
    }
}
