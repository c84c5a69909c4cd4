//! Backend-specific SQL syntax.
//!
//! The compiler never writes an identifier, a placeholder, a type name or a
//! backend function by itself; it asks the [`Dialect`] of the engine it
//! compiles for. [`SqliteDialect`] and [`MySqlDialect`] cover the two
//! supported backends.

mod mysql;
mod sqlite;

use std::fmt;

pub use mysql::MySqlDialect;
pub use sqlite::SqliteDialect;

use crate::registry::ColumnSchema;
use crate::value::Value;

/// Format used to render date-times as text literals and parameters.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Quoting, type mapping and backend functions of one SQL dialect.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short dialect name used in logs.
    fn name(&self) -> &'static str;

    /// Quotes an identifier, escaping embedded quote characters.
    fn quote(&self, identifier: &str) -> String;

    /// Placeholder text for the named parameter `name`.
    fn parameterize(&self, name: &str) -> String {
        format!("@{name}")
    }

    /// Concrete column type for a resolved column.
    fn map_type(&self, column: &ColumnSchema) -> String;

    /// Literal rendering of a value, used only for DDL defaults.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(s) => quote_string(s),
            Value::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            Value::DateTime(v) => quote_string(&v.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Full column clause of the auto-increment primary key.
    fn auto_increment_primary_key(&self, column: &str) -> String;

    /// Expression evaluating to the current timestamp.
    fn current_timestamp(&self) -> &'static str;

    /// Column-clause suffix that defaults a column to the current timestamp.
    fn timestamp_default(&self) -> String {
        format!("DEFAULT ({})", self.current_timestamp())
    }

    /// Expression returning the id generated by the last insert.
    fn last_insert_id(&self) -> &'static str;

    /// Expression returning the rows affected by the previous statement.
    fn affected_rows(&self) -> &'static str;

    /// Query counting tables named `table` in `database`; both arguments are placeholders.
    fn table_exists(&self, table: &str, database: &str) -> String;

    fn create_temp_table(&self, name: &str) -> String;

    fn drop_temp_table(&self, name: &str) -> String;

    fn supports_full_join(&self) -> bool;

    /// Pagination suffix; the numbers are inlined.
    fn limit(&self, offset: u64, count: u64) -> String {
        format!("LIMIT {count} OFFSET {offset}")
    }
}

/// Single-quoted string literal with embedded quotes doubled.
pub(crate) fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Shared text mapping: fixed-length text becomes CHAR, bounded text VARCHAR.
pub(crate) fn text_type(column: &ColumnSchema, unbounded: &str) -> String {
    match column.length {
        Some(n) if column.fixed_length && n <= 255 => format!("CHAR({n})"),
        Some(n) if n <= 16_383 => format!("VARCHAR({n})"),
        _ => unbounded.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_literals() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.literal(&Value::Null), "NULL");
        assert_eq!(dialect.literal(&Value::Bool(true)), "1");
        assert_eq!(dialect.literal(&Value::Text("it's".into())), "'it''s'");
        assert_eq!(dialect.literal(&Value::Blob(vec![0xAB, 0x01])), "X'AB01'");

        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(dialect.literal(&Value::DateTime(ts)), "'2024-01-02 03:04:05'");
    }

    #[test]
    fn test_default_parameterize_and_limit() {
        let dialect = MySqlDialect;
        assert_eq!(dialect.parameterize("p3"), "@p3");
        assert_eq!(dialect.limit(20, 10), "LIMIT 10 OFFSET 20");
    }
}
