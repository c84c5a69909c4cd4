//! Database settings and connection configuration.
//!
//! Settings override what entity descriptors declare in code, and name the
//! schema version the bootstrap brings every logical database to.
//!
//! # Example YAML
//!
//! ```yaml
//! settings:
//!   version: 3
//!   default_varchar_length: 200
//!   automatic_create_table: true
//!   entities:
//!     - entity: BookEntity
//!       table_name: tb_books
//!       read_only: false
//! connections:
//!   - database_name: shop
//!     connection_string: data/shop.db
//!     is_master: true
//!   - database_name: shop
//!     connection_string: data/shop-replica.db
//!     is_master: false
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_version() -> u32 {
    1
}

fn default_varchar_length() -> u32 {
    200
}

fn default_true() -> bool {
    true
}

/// Per-entity overrides of the code-level descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySettings {
    /// Entity type name as declared by its descriptor.
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

/// Schema-level settings shared by the registry, compiler and bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Target schema version for every logical database.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Length given to text columns that do not declare one.
    #[serde(default = "default_varchar_length")]
    pub default_varchar_length: u32,
    /// Create tables when a brand-new database is detected.
    #[serde(default = "default_true")]
    pub automatic_create_table: bool,
    #[serde(default)]
    pub entities: Vec<EntitySettings>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            default_varchar_length: default_varchar_length(),
            automatic_create_table: true,
            entities: Vec::new(),
        }
    }
}

impl DatabaseSettings {
    /// Overrides configured for `entity`, if any.
    pub fn entity(&self, entity: &str) -> Option<&EntitySettings> {
        self.entities.iter().find(|e| e.entity == entity)
    }
}

/// One connection of a logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub database_name: String,
    /// Engine-specific connection string; a file path for SQLite.
    pub connection_string: String,
    /// `false` marks a read replica.
    #[serde(default = "default_true")]
    pub is_master: bool,
}

impl ConnectionSettings {
    pub fn master(database_name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            connection_string: connection_string.into(),
            is_master: true,
        }
    }

    pub fn replica(
        database_name: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            is_master: false,
            ..Self::master(database_name, connection_string)
        }
    }
}

/// Complete configuration file: settings plus connections.
///
/// # Examples
///
/// ```no_run
/// use dbmap_core::DatabaseConfig;
///
/// let config = DatabaseConfig::load("dbmap.yml").unwrap();
/// println!("target version {}", config.settings.version);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub settings: DatabaseSettings,
    #[serde(default)]
    pub connections: Vec<ConnectionSettings>,
}

impl DatabaseConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DatabaseError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Distinct logical database names in configuration order.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for connection in &self.connections {
            if !names.contains(&connection.database_name) {
                names.push(connection.database_name.clone());
            }
        }
        names
    }
}
