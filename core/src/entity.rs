//! Ahead-of-time entity descriptions.
//!
//! An entity type implements [`Entity`] once: [`Entity::describe`] declares
//! its user columns, [`EntityMeta`] carries the implicit `Id`, `Version`,
//! `Deleted`, `LastUser` and `LastTime` columns every table has, and
//! [`Entity::value`] / [`Entity::from_row`] move data in and out of rows.
//!
//! # Examples
//!
//! ```
//! use dbmap_core::{ColumnDef, Entity, EntityDescriptor, EntityMeta, Result, Row, SqlType, Value};
//! use serde::Serialize;
//!
//! #[derive(Debug, Default, Serialize)]
//! struct BookEntity {
//!     #[serde(flatten)]
//!     meta: EntityMeta,
//!     title: String,
//!     pages: i64,
//! }
//!
//! impl Entity for BookEntity {
//!     fn describe() -> EntityDescriptor {
//!         EntityDescriptor::new("BookEntity")
//!             .column(ColumnDef::new("Title", SqlType::Text).not_null().length(100))
//!             .column(ColumnDef::new("Pages", SqlType::Int))
//!     }
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//!     fn value(&self, column: &str) -> Value {
//!         match column {
//!             "Title" => self.title.clone().into(),
//!             "Pages" => self.pages.into(),
//!             _ => Value::Null,
//!         }
//!     }
//!     fn from_row(row: &Row) -> Result<Self> {
//!         Ok(Self {
//!             meta: EntityMeta::from_row(row)?,
//!             title: row.get("Title")?,
//!             pages: row.get("Pages")?,
//!         })
//!     }
//! }
//!
//! let descriptor = BookEntity::describe();
//! assert_eq!(descriptor.columns.len(), 2);
//! ```

use std::any::TypeId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::{Row, Value};

pub const ID: &str = "Id";
pub const VERSION: &str = "Version";
pub const DELETED: &str = "Deleted";
pub const LAST_USER: &str = "LastUser";
pub const LAST_TIME: &str = "LastTime";

/// Implicit columns, in the order they appear in every table.
pub const IMPLICIT_COLUMNS: [&str; 5] = [ID, VERSION, DELETED, LAST_USER, LAST_TIME];

/// Declared SQL type of a column; each dialect maps it to a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    Int,
    BigInt,
    Double,
    Text,
    DateTime,
    Blob,
}

/// Declaration of one user column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub unique: bool,
    /// Maximum length for text columns; `None` uses the configured default.
    pub length: Option<u32>,
    pub fixed_length: bool,
    pub default: Option<Value>,
    pub foreign_key: bool,
    pub writable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            unique: false,
            length: None,
            fixed_length: false,
            default: None,
            foreign_key: false,
            writable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn fixed_length(mut self) -> Self {
        self.fixed_length = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the column as referencing another table's `Id`; it gets an index.
    pub fn foreign_key(mut self) -> Self {
        self.foreign_key = true;
        self
    }

    /// Excludes the column from INSERT and UPDATE value lists.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

/// Code-level description of an entity type.
///
/// Database and table names left unset are resolved by the
/// [`SchemaRegistry`](crate::SchemaRegistry).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub type_name: String,
    pub database: Option<String>,
    pub table: Option<String>,
    pub description: Option<String>,
    pub read_only: bool,
    pub table_model: bool,
    pub columns: Vec<ColumnDef>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            database: None,
            table: None,
            description: None,
            read_only: false,
            table_model: true,
            columns: Vec::new(),
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Describes a type that is mapped from rows but has no table of its own.
    pub fn not_table_model(mut self) -> Self {
        self.table_model = false;
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }
}

/// Values of the implicit columns carried by every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityMeta {
    pub id: i64,
    pub version: i64,
    pub deleted: bool,
    pub last_user: String,
    pub last_time: Option<DateTime<Utc>>,
}

impl EntityMeta {
    /// Reads the implicit columns from a row; absent columns keep their defaults.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get(ID)?,
            version: row.get(VERSION)?,
            deleted: row.get(DELETED)?,
            last_user: row.get(LAST_USER)?,
            last_time: row.get(LAST_TIME)?,
        })
    }

    /// Value of one implicit column, or `None` for any other name.
    pub fn value(&self, column: &str) -> Option<Value> {
        let value = match column {
            ID => self.id.into(),
            VERSION => self.version.into(),
            DELETED => self.deleted.into(),
            LAST_USER => self.last_user.clone().into(),
            LAST_TIME => self.last_time.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// An entity type persisted through the orchestrator.
pub trait Entity: Serialize + Send + Sync + Sized + 'static {
    /// Ahead-of-time description of the entity's table and user columns.
    fn describe() -> EntityDescriptor;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Current value of a user column, `Value::Null` for unknown names.
    fn value(&self, column: &str) -> Value;

    /// Materializes an entity from a row of its table.
    fn from_row(row: &Row) -> Result<Self>;

    /// Structural validation run before any write; `Err` carries the reason.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Identity of an entity type inside the registry and query expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl EntityKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully-qualified Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }
}
