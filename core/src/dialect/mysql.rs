use crate::entity::SqlType;
use crate::registry::ColumnSchema;

use super::{Dialect, text_type};

/// Dialect of the client/server engine.
///
/// MySQL has no FULL OUTER JOIN; compiling one fails before any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn map_type(&self, column: &ColumnSchema) -> String {
        match column.sql_type {
            SqlType::Bool => "BOOL".to_string(),
            SqlType::Int => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
            SqlType::Text => text_type(column, "LONGTEXT"),
            SqlType::DateTime => "DATETIME(6)".to_string(),
            SqlType::Blob => "LONGBLOB".to_string(),
        }
    }

    fn auto_increment_primary_key(&self, column: &str) -> String {
        format!("{} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY", self.quote(column))
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP(6)"
    }

    fn timestamp_default(&self) -> String {
        "DEFAULT CURRENT_TIMESTAMP(6) ON UPDATE CURRENT_TIMESTAMP(6)".to_string()
    }

    fn last_insert_id(&self) -> &'static str {
        "LAST_INSERT_ID()"
    }

    fn affected_rows(&self) -> &'static str {
        "ROW_COUNT()"
    }

    fn table_exists(&self, table: &str, database: &str) -> String {
        format!(
            "SELECT count(1) FROM information_schema.TABLES WHERE TABLE_NAME = {table} AND TABLE_SCHEMA = {database}"
        )
    }

    fn create_temp_table(&self, name: &str) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} (`_seq` INT NOT NULL, `_value` BIGINT)",
            self.quote(name)
        )
    }

    fn drop_temp_table(&self, name: &str) -> String {
        format!("DROP TEMPORARY TABLE IF EXISTS {}", self.quote(name))
    }

    fn supports_full_join(&self) -> bool {
        false
    }
}
