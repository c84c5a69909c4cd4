//! Compiled commands: SQL text plus bound parameters.

use std::fmt;

use crate::dialect::Dialect;
use crate::value::Value;

/// A named bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Placeholder as it appears in the SQL text, e.g. `@p0`.
    pub name: String,
    pub value: Value,
}

/// One SQL statement and the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Dialect-specific statements targeting one logical database.
///
/// Executed in order within one round trip. Parameter names are unique
/// across the whole command.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCommand {
    pub database: String,
    pub statements: Vec<SqlStatement>,
}

impl CompiledCommand {
    /// The full script, statements separated by `;`.
    pub fn sql(&self) -> String {
        self.statements
            .iter()
            .map(|s| format!("{};", s.sql))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every parameter of every statement, in binding order.
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.statements.iter().flat_map(|s| s.params.iter())
    }
}

impl fmt::Display for CompiledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Accumulates statements while keeping parameter numbering command-wide.
pub(crate) struct CommandWriter<'d> {
    dialect: &'d dyn Dialect,
    database: String,
    statements: Vec<SqlStatement>,
    pending: Vec<Param>,
    counter: usize,
}

impl<'d> CommandWriter<'d> {
    pub(crate) fn new(dialect: &'d dyn Dialect, database: impl Into<String>) -> Self {
        Self {
            dialect,
            database: database.into(),
            statements: Vec::new(),
            pending: Vec::new(),
            counter: 0,
        }
    }

    pub(crate) fn quote(&self, identifier: &str) -> String {
        self.dialect.quote(identifier)
    }

    /// Binds `value` to the next statement and returns its placeholder.
    pub(crate) fn bind(&mut self, value: impl Into<Value>) -> String {
        let name = self.dialect.parameterize(&format!("p{}", self.counter));
        self.counter += 1;
        self.pending.push(Param {
            name: name.clone(),
            value: value.into(),
        });
        name
    }

    /// Closes a statement, attaching every parameter bound since the previous one.
    pub(crate) fn push(&mut self, sql: impl Into<String>) {
        self.statements.push(SqlStatement {
            sql: sql.into(),
            params: std::mem::take(&mut self.pending),
        });
    }

    /// Like [`Self::push`], but drops pending parameters the SQL never mentions.
    pub(crate) fn push_referenced(&mut self, sql: impl Into<String>) {
        let sql = sql.into();
        self.pending.retain(|p| references(&sql, &p.name));
        self.push(sql);
    }

    pub(crate) fn finish(self) -> CompiledCommand {
        CompiledCommand {
            database: self.database,
            statements: self.statements,
        }
    }
}

/// `true` if `placeholder` occurs in `sql` as a whole token (`@p1` but not inside `@p10`).
fn references(sql: &str, placeholder: &str) -> bool {
    sql.match_indices(placeholder).any(|(at, _)| {
        !sql[at + placeholder.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
