use crate::entity::SqlType;
use crate::registry::ColumnSchema;

use super::{Dialect, text_type};

/// Dialect of the embedded engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn map_type(&self, column: &ColumnSchema) -> String {
        match column.sql_type {
            SqlType::Bool => "BOOLEAN".to_string(),
            SqlType::Int | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Double => "REAL".to_string(),
            SqlType::Text => text_type(column, "TEXT"),
            SqlType::DateTime => "DATETIME".to_string(),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    fn auto_increment_primary_key(&self, column: &str) -> String {
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.quote(column))
    }

    fn current_timestamp(&self) -> &'static str {
        "strftime('%Y-%m-%d %H:%M:%f', 'now')"
    }

    fn last_insert_id(&self) -> &'static str {
        "last_insert_rowid()"
    }

    fn affected_rows(&self) -> &'static str {
        "changes()"
    }

    fn table_exists(&self, table: &str, _database: &str) -> String {
        format!("SELECT count(1) FROM sqlite_master WHERE type = 'table' AND name = {table}")
    }

    fn create_temp_table(&self, name: &str) -> String {
        format!(
            "CREATE TEMP TABLE {} (\"_seq\" INTEGER NOT NULL, \"_value\" INTEGER)",
            self.quote(name)
        )
    }

    fn drop_temp_table(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS temp.{}", self.quote(name))
    }

    fn supports_full_join(&self) -> bool {
        true
    }
}
