//! Conversion between [`Value`] and SQLite storage classes.
//!
//! Booleans are stored as integers and date-times as text in
//! [`TIMESTAMP_FORMAT`], the same shape `strftime('%Y-%m-%d %H:%M:%f')`
//! produces for column defaults, so both sort and parse alike.

use dbmap_core::{TIMESTAMP_FORMAT, Value};
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};

use crate::error::{Result, SqliteError};

/// Borrowing [`ToSql`] adapter for a bound parameter.
pub(crate) struct SqlValue<'a>(pub(crate) &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Stored;

        let output = match self.0 {
            Value::Null => ToSqlOutput::Owned(Stored::Null),
            Value::Bool(v) => ToSqlOutput::Owned(Stored::Integer(i64::from(*v))),
            Value::Integer(v) => ToSqlOutput::Owned(Stored::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(Stored::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Value::DateTime(v) => {
                ToSqlOutput::Owned(Stored::Text(v.format(TIMESTAMP_FORMAT).to_string()))
            }
        };
        Ok(output)
    }
}

/// Reads one result column.
pub(crate) fn from_value_ref(value: ValueRef<'_>, column: &str) -> Result<Value> {
    let converted = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| SqliteError::ConversionError {
                column: column.to_string(),
                message: e.to_string(),
            })?;
            Value::Text(text.to_string())
        }
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    };
    Ok(converted)
}
