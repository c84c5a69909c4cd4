//! Error taxonomy shared by the compiler, the orchestrator and the
//! bootstrap state machine.
//!
//! Every failure surfaces as a [`DatabaseError`]. Classified failures
//! (stale versions, cardinality violations, misuse of a finished
//! transaction) have their own variants; anything an engine adapter reports
//! that is not classified arrives as [`DatabaseError::Engine`] and is wrapped
//! into [`DatabaseError::DataAccess`] by the orchestrator together with the
//! entity, the attempted operation and a serialized payload.

use std::fmt;

use thiserror::Error;
use tracing::{error, warn};

/// Boxed cause reported by an engine adapter.
pub type EngineCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by data-access operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Zero rows were affected or returned where exactly one was expected.
    ///
    /// On an update or delete this is the optimistic-concurrency conflict
    /// signal: the stored version moved on, or the row is deleted or missing.
    #[error("{entity}: not found: {detail}")]
    NotFound { entity: String, detail: String },

    /// A scalar query returned more than one row, or a single-row write
    /// affected more than one row.
    #[error("{entity}: found too much: {detail}")]
    FoundTooMuch { entity: String, detail: String },

    /// Write attempted against an entity mapped as read-only.
    #[error("{entity} is mapped read-only and cannot be written")]
    NotWriteable { entity: String },

    /// The entity has no table mapping (unregistered or described as not a table model).
    #[error("{entity} is not a table model")]
    NotATableModel { entity: String },

    /// A batch returned a different number of results than items submitted.
    #[error("{entity}: expected {expected} results from batch, got {actual}")]
    NotMatch {
        entity: String,
        expected: usize,
        actual: usize,
    },

    /// Pre-flight validation failure.
    #[error("argument not valid: {0}")]
    ArgumentNotValid(String),

    /// Misuse of a finished, failed or mismatched transaction context.
    #[error("transaction error: {0}")]
    TransactionError(String),

    /// Creating the tables of a brand-new logical database failed.
    #[error("table create error in database '{database}': {message}")]
    TableCreateError {
        database: String,
        message: String,
        #[source]
        source: Option<Box<DatabaseError>>,
    },

    /// Migrating a logical database failed; nothing was applied.
    #[error("migrate error in database '{database}': {message}")]
    MigrateError {
        database: String,
        message: String,
        #[source]
        source: Option<Box<DatabaseError>>,
    },

    /// Unclassified engine failure with the operation context attached.
    #[error("{operation} on {entity} failed: {source}")]
    DataAccess {
        entity: String,
        operation: String,
        payload: String,
        #[source]
        source: Box<DatabaseError>,
    },

    /// Unclassified failure reported by an engine adapter.
    #[error("engine error: {message}")]
    Engine {
        code: Option<i32>,
        message: String,
        #[source]
        source: Option<EngineCause>,
    },

    /// A column value could not be converted to the requested type.
    #[error("cannot map column '{column}': {message}")]
    Mapping { column: String, message: String },

    /// File I/O failure while loading or saving configuration.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Flat classification of a [`DatabaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    FoundTooMuch,
    NotWriteable,
    NotATableModel,
    NotMatch,
    ArgumentNotValid,
    TransactionError,
    TableCreateError,
    MigrateError,
    DataAccess,
    Engine,
    Mapping,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::FoundTooMuch => "found_too_much",
            Self::NotWriteable => "not_writeable",
            Self::NotATableModel => "not_a_table_model",
            Self::NotMatch => "not_match",
            Self::ArgumentNotValid => "argument_not_valid",
            Self::TransactionError => "transaction_error",
            Self::TableCreateError => "table_create_error",
            Self::MigrateError => "migrate_error",
            Self::DataAccess => "data_access",
            Self::Engine => "engine",
            Self::Mapping => "mapping",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

impl DatabaseError {
    /// Builds an unclassified engine error from a message.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an unclassified engine error that keeps the driver error as its cause.
    pub fn engine_with(
        code: Option<i32>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Engine {
            code,
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn not_found(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    pub fn found_too_much(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::FoundTooMuch {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    /// Returns the flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::FoundTooMuch { .. } => ErrorKind::FoundTooMuch,
            Self::NotWriteable { .. } => ErrorKind::NotWriteable,
            Self::NotATableModel { .. } => ErrorKind::NotATableModel,
            Self::NotMatch { .. } => ErrorKind::NotMatch,
            Self::ArgumentNotValid(_) => ErrorKind::ArgumentNotValid,
            Self::TransactionError(_) => ErrorKind::TransactionError,
            Self::TableCreateError { .. } => ErrorKind::TableCreateError,
            Self::MigrateError { .. } => ErrorKind::MigrateError,
            Self::DataAccess { .. } => ErrorKind::DataAccess,
            Self::Engine { .. } => ErrorKind::Engine,
            Self::Mapping { .. } => ErrorKind::Mapping,
            Self::IoError(_) | Self::YamlError(_) => ErrorKind::Config,
        }
    }

    /// Wraps an unclassified engine error with the operation context.
    ///
    /// Already-classified errors are returned unchanged so that callers can
    /// still match on `NotFound`, `FoundTooMuch` and friends.
    pub fn into_data_access(
        self,
        entity: &str,
        operation: &str,
        payload: impl FnOnce() -> String,
    ) -> Self {
        match self {
            Self::Engine { .. } => {
                warn!(entity, operation, cause = %self, "data access failed");
                Self::DataAccess {
                    entity: entity.to_string(),
                    operation: operation.to_string(),
                    payload: payload(),
                    source: Box::new(self),
                }
            }
            other => other,
        }
    }

    /// Emits this error as a single structured `error!` event.
    pub fn log(&self) {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        match self {
            Self::DataAccess {
                entity,
                operation,
                payload,
                ..
            } => error!(
                kind = %self.kind(),
                entity = %entity,
                operation = %operation,
                payload = %payload,
                causes = ?causes,
                "{self}"
            ),
            _ => error!(kind = %self.kind(), causes = ?causes, "{self}"),
        }
    }
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` under a plain-text subscriber and returns what it logged.
    fn captured_logs(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_engine_error_is_wrapped() {
        let err = DatabaseError::engine("disk I/O error").into_data_access("Book", "add", || {
            "{\"name\":\"x\"}".to_string()
        });

        assert_eq!(err.kind(), ErrorKind::DataAccess);
        let source = std::error::Error::source(&err).expect("wrapped cause");
        assert!(source.to_string().contains("disk I/O error"));
        assert!(err.to_string().contains("add on Book failed"));
    }

    #[test]
    fn test_wrapping_warns_with_context() {
        let logs = captured_logs(|| {
            DatabaseError::engine("database is locked").into_data_access("Book", "update", String::new);
        });
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("data access failed"), "{logs}");
        assert!(logs.contains("entity=\"Book\""), "{logs}");
        assert!(logs.contains("operation=\"update\""), "{logs}");
        assert!(logs.contains("database is locked"), "{logs}");
    }

    #[test]
    fn test_log_emits_one_error_event_with_causes() {
        let err = DatabaseError::engine("disk I/O error").into_data_access("Book", "add", || {
            "{\"title\":\"Dune\"}".to_string()
        });
        let logs = captured_logs(|| err.log());

        let lines: Vec<&str> = logs.lines().filter(|l| l.contains("ERROR")).collect();
        assert_eq!(lines.len(), 1, "{logs}");
        assert!(lines[0].contains("add on Book failed"));
        assert!(lines[0].contains("kind=data_access"), "{logs}");
        assert!(lines[0].contains("disk I/O error"));
    }

    #[test]
    fn test_classified_error_passes_through() {
        let err = DatabaseError::not_found("Book", "stale version").into_data_access(
            "Book",
            "update",
            || unreachable!("payload is only built for engine errors"),
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_engine_with_keeps_cause_and_code() {
        let io = std::io::Error::other("locked");
        let err = DatabaseError::engine_with(Some(5), io);
        match &err {
            DatabaseError::Engine { code, message, .. } => {
                assert_eq!(*code, Some(5));
                assert_eq!(message, "locked");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_migrate_error_names_database() {
        let err = DatabaseError::MigrateError {
            database: "shop".to_string(),
            message: "missing step 2 -> 3".to_string(),
            source: None,
        };
        assert_eq!(err.kind(), ErrorKind::MigrateError);
        assert!(err.to_string().contains("'shop'"));
    }
}
