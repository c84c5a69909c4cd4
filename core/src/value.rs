//! Column values, typed extraction and result rows.
//!
//! [`Value`] is the dialect-neutral representation of a single column value,
//! used both for bound parameters and for values read back from an engine.
//! [`Row`] is one result row; [`FromValue`] converts a column into a Rust type.
//!
//! # Examples
//!
//! ```
//! use dbmap_core::{Row, Value};
//!
//! let row = Row::new(
//!     vec!["Id".to_string(), "Name".to_string(), "Price".to_string()],
//!     vec![Value::Integer(7), Value::from("Dune"), Value::Null],
//! );
//! assert_eq!(row.get::<i64>("Id").unwrap(), 7);
//! assert_eq!(row.get::<String>("Name").unwrap(), "Dune");
//! assert_eq!(row.get::<Option<f64>>("Price").unwrap(), None);
//! // NULL and absent columns fall back to the type's default.
//! assert_eq!(row.get::<f64>("Price").unwrap(), 0.0);
//! assert_eq!(row.get::<i64>("Missing").unwrap(), 0);
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{DatabaseError, Result};

/// Timestamp layouts accepted when a date-time arrives as text.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// A single column value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Interprets the value as an integer, accepting booleans and integral text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Short name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::DateTime(_) => "datetime",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a column [`Value`] into a Rust type.
///
/// `NULL` converts to the type's default; use `Option<T>` to observe it.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> std::result::Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, found {}", value.type_name())
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(v) => Ok(*v),
            Value::Integer(v) => Ok(*v != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" | "" => Ok(false),
                _ => Err(mismatch("bool", value)),
            },
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(0),
            _ => value.as_i64().ok_or_else(|| mismatch("integer", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| format!("integer {wide} out of range for i32"))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| format!("integer {wide} out of range for u32"))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let wide = i64::from_value(value)?;
        u64::try_from(wide).map_err(|_| format!("integer {wide} out of range for u64"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(0.0),
            Value::Real(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            Value::Text(s) => s.trim().parse().map_err(|_| mismatch("real", value)),
            _ => Err(mismatch("real", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(s) => Ok(s.clone()),
            Value::Integer(v) => Ok(v.to_string()),
            Value::Real(v) => Ok(v.to_string()),
            Value::Bool(v) => Ok(v.to_string()),
            Value::DateTime(v) => Ok(v.to_rfc3339()),
            Value::Blob(bytes) => String::from_utf8(bytes.clone()).map_err(|e| e.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Blob(bytes) => Ok(bytes.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            _ => Err(mismatch("blob", value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(DateTime::<Utc>::default()),
            Value::DateTime(v) => Ok(*v),
            Value::Integer(secs) => DateTime::from_timestamp(*secs, 0)
                .ok_or_else(|| format!("timestamp {secs} out of range")),
            Value::Text(s) => parse_timestamp(s),
            _ => Err(mismatch("datetime", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Parses the textual timestamp layouts engines return.
pub fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("unrecognised timestamp '{text}'"))
}

/// One result row: ordered column names and their values.
///
/// Joined queries return every participating table's columns side by side;
/// [`Row::slice`] cuts out one table's share.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Looks up a column by name, exact match first, then ignoring ASCII case.
    pub fn value(&self, column: &str) -> Option<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))?;
        self.values.get(index)
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Reads a column as `T`. An absent column reads as `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Mapping`] when the stored value cannot be
    /// converted to `T`.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.value(column).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|message| DatabaseError::Mapping {
            column: column.to_string(),
            message,
        })
    }

    /// Returns the sub-row of `len` columns starting at `start`.
    pub fn slice(&self, start: usize, len: usize) -> Row {
        let end = start.saturating_add(len).min(self.values.len());
        let start = start.min(end);
        Row {
            columns: self.columns[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
        }
    }
}
