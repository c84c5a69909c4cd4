//! Explicitly constructed, read-only schema registry.
//!
//! The registry turns every registered [`Entity`]'s descriptor into an
//! [`EntitySchema`], applying configuration overrides and the naming rules
//! for database and table names. It is built once, shared behind an `Arc`
//! and never mutated afterwards.
//!
//! # Examples
//!
//! ```ignore
//! let registry = SchemaRegistry::builder(settings, "shop")
//!     .register::<BookEntity>()
//!     .register::<AuthorEntity>()
//!     .build();
//! let schema = registry.schema::<BookEntity>()?;
//! assert_eq!(schema.table, "tb_book");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseSettings;
use crate::entity::{
    ColumnDef, DELETED, Entity, EntityDescriptor, EntityKey, ID, IMPLICIT_COLUMNS, LAST_TIME,
    LAST_USER, SqlType, VERSION,
};
use crate::error::{DatabaseError, Result};
use crate::value::Value;

/// Resolved column of an entity table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub unique: bool,
    pub length: Option<u32>,
    pub fixed_length: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
    pub foreign_key: bool,
    pub auto_increment: bool,
    pub writable: bool,
    /// One of the implicit `Id`/`Version`/`Deleted`/`LastUser`/`LastTime` columns.
    pub implicit: bool,
}

impl ColumnSchema {
    fn user(def: &ColumnDef, default_varchar_length: u32) -> Self {
        let length = match def.sql_type {
            SqlType::Text => Some(def.length.unwrap_or(default_varchar_length)),
            _ => def.length,
        };
        Self {
            name: def.name.clone(),
            sql_type: def.sql_type,
            nullable: def.nullable,
            unique: def.unique,
            length,
            fixed_length: def.fixed_length,
            default: def.default.clone(),
            primary_key: false,
            foreign_key: def.foreign_key,
            auto_increment: false,
            writable: def.writable,
            implicit: false,
        }
    }

    fn implicit(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            nullable: false,
            unique: false,
            length: None,
            fixed_length: false,
            default: None,
            primary_key: false,
            foreign_key: false,
            auto_increment: false,
            writable: true,
            implicit: true,
        }
    }
}

/// Resolved table mapping of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    pub key: EntityKey,
    pub entity_name: String,
    pub database: String,
    pub table: String,
    pub description: Option<String>,
    pub writable: bool,
    pub table_model: bool,
    /// `Id` first, then the user columns, then the remaining implicit columns.
    pub columns: Vec<ColumnSchema>,
}

impl EntitySchema {
    /// Finds a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn primary_key(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn user_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| !c.implicit)
    }

    /// Writable user columns, the ones carried by INSERT and UPDATE.
    pub fn writable_user_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.user_columns()
            .filter(|c| c.writable && !c.auto_increment && !c.primary_key)
    }

    fn from_descriptor(
        key: EntityKey,
        descriptor: EntityDescriptor,
        settings: &DatabaseSettings,
        default_database: &str,
    ) -> Self {
        let overrides = settings.entity(&descriptor.type_name);

        let database = overrides
            .and_then(|o| o.database_name.clone())
            .or(descriptor.database)
            .unwrap_or_else(|| default_database.to_string());
        let table = overrides
            .and_then(|o| o.table_name.clone())
            .or(descriptor.table)
            .unwrap_or_else(|| default_table_name(&descriptor.type_name));
        let description = overrides
            .and_then(|o| o.description.clone())
            .or(descriptor.description);
        let read_only = overrides
            .and_then(|o| o.read_only)
            .unwrap_or(descriptor.read_only);

        let mut id = ColumnSchema::implicit(ID, SqlType::BigInt);
        id.primary_key = true;
        id.auto_increment = true;
        id.writable = false;

        let mut columns = vec![id];
        columns.extend(
            descriptor
                .columns
                .iter()
                .filter(|c| !IMPLICIT_COLUMNS.iter().any(|n| c.name.eq_ignore_ascii_case(n)))
                .map(|c| ColumnSchema::user(c, settings.default_varchar_length)),
        );
        let mut deleted = ColumnSchema::implicit(DELETED, SqlType::Bool);
        deleted.default = Some(Value::Bool(false));
        let mut last_user = ColumnSchema::implicit(LAST_USER, SqlType::Text);
        last_user.length = Some(settings.default_varchar_length);
        columns.push(ColumnSchema::implicit(VERSION, SqlType::BigInt));
        columns.push(deleted);
        columns.push(last_user);
        columns.push(ColumnSchema::implicit(LAST_TIME, SqlType::DateTime));

        Self {
            key,
            entity_name: descriptor.type_name,
            database,
            table,
            description,
            writable: !read_only,
            table_model: descriptor.table_model,
            columns,
        }
    }
}

/// `tb_` + lower-cased type name without a trailing `Entity` suffix.
pub fn default_table_name(type_name: &str) -> String {
    let base = type_name.strip_suffix("Entity").unwrap_or(type_name);
    format!("tb_{}", base.to_lowercase())
}

/// Builder for [`SchemaRegistry`].
#[derive(Debug)]
pub struct SchemaRegistryBuilder {
    settings: DatabaseSettings,
    default_database: String,
    schemas: HashMap<EntityKey, Arc<EntitySchema>>,
    order: Vec<EntityKey>,
}

impl SchemaRegistryBuilder {
    /// Registers an entity type. Registering the same type twice keeps the first.
    pub fn register<T: Entity>(mut self) -> Self {
        let key = EntityKey::of::<T>();
        if self.schemas.contains_key(&key) {
            return self;
        }
        let schema =
            EntitySchema::from_descriptor(key, T::describe(), &self.settings, &self.default_database);
        self.schemas.insert(key, Arc::new(schema));
        self.order.push(key);
        self
    }

    pub fn build(self) -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry {
            schemas: self.schemas,
            order: self.order,
            default_database: self.default_database,
        })
    }
}

/// Read-only map from entity type to its resolved schema.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityKey, Arc<EntitySchema>>,
    order: Vec<EntityKey>,
    default_database: String,
}

impl SchemaRegistry {
    /// Starts a registry; entities without a database resolve to `default_database`.
    pub fn builder(
        settings: DatabaseSettings,
        default_database: impl Into<String>,
    ) -> SchemaRegistryBuilder {
        SchemaRegistryBuilder {
            settings,
            default_database: default_database.into(),
            schemas: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    /// Schema of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotATableModel`] if `T` was not registered or
    /// is described as not a table model.
    pub fn schema<T: Entity>(&self) -> Result<Arc<EntitySchema>> {
        self.schema_by_key(EntityKey::of::<T>())
    }

    /// Schema for a type identified at runtime; same rules as [`Self::schema`].
    pub fn schema_by_key(&self, key: EntityKey) -> Result<Arc<EntitySchema>> {
        match self.schemas.get(&key) {
            Some(schema) if schema.table_model => Ok(Arc::clone(schema)),
            Some(schema) => Err(DatabaseError::NotATableModel {
                entity: schema.entity_name.clone(),
            }),
            None => Err(DatabaseError::NotATableModel {
                entity: key.short_name().to_string(),
            }),
        }
    }

    /// Table-model schemas mapped to `database`, in registration order.
    pub fn schemas_in(&self, database: &str) -> Vec<Arc<EntitySchema>> {
        self.order
            .iter()
            .filter_map(|key| self.schemas.get(key))
            .filter(|s| s.table_model && s.database.eq_ignore_ascii_case(database))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
