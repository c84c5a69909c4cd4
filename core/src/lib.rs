//! Relational data mapping over pluggable SQL engines.
//!
//! This crate holds everything that does not touch a connection:
//!
//! - [`Entity`] and [`SchemaRegistry`]: ahead-of-time entity descriptions
//!   resolved against [`DatabaseSettings`] into table schemas with the
//!   implicit `Id`, `Version`, `Deleted`, `LastUser` and `LastTime` columns.
//! - [`SelectExpression`], [`FromExpression`], [`WhereExpression`]: typed
//!   query builders joining up to three entity types.
//! - [`SqlBuilder`]: compiles queries, writes and DDL into parameterized
//!   [`CompiledCommand`]s for a [`Dialect`] ([`SqliteDialect`],
//!   [`MySqlDialect`]), forcing the soft-delete filter on every read and the
//!   version check on every write.
//! - [`Database`]: the CRUD orchestrator over a [`DatabaseEngine`], with
//!   [`TransactionContext`] and the bootstrap/migration state machine
//!   ([`Database::initialize`]).
//!
//! Engine adapters live in their own crates and implement [`DatabaseEngine`].
//!
//! # Example
//!
//! ```
//! use dbmap_core::*;
//! use serde::Serialize;
//!
//! #[derive(Debug, Default, Serialize)]
//! struct BookEntity {
//!     meta: EntityMeta,
//!     title: String,
//! }
//!
//! impl Entity for BookEntity {
//!     fn describe() -> EntityDescriptor {
//!         EntityDescriptor::new("BookEntity")
//!             .column(ColumnDef::new("Title", SqlType::Text).not_null())
//!     }
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//!     fn value(&self, column: &str) -> Value {
//!         match column {
//!             "Title" => self.title.clone().into(),
//!             _ => Value::Null,
//!         }
//!     }
//!     fn from_row(row: &Row) -> Result<Self> {
//!         Ok(Self { meta: EntityMeta::from_row(row)?, title: row.get("Title")? })
//!     }
//! }
//!
//! let registry = SchemaRegistry::builder(DatabaseSettings::default(), "shop")
//!     .register::<BookEntity>()
//!     .build();
//! let builder = SqlBuilder::new(registry, std::sync::Arc::new(SqliteDialect));
//!
//! let filter = WhereExpression::<BookEntity>::new().and(|b| b.col("Title").like("Dune%"));
//! let command = builder.retrieve(None, None, Some(&filter)).unwrap();
//! assert!(command.sql().contains("FROM \"tb_book\""));
//! assert!(command.sql().contains("\"tb_book\".\"Deleted\" = @p1"));
//! ```

mod command;
mod compiler;
mod config;
mod database;
mod dialect;
mod engine;
mod entity;
mod error;
mod expression;
mod migration;
mod registry;
mod transaction;
mod value;

pub use command::{CompiledCommand, Param, SqlStatement};
pub use compiler::{MAX_PARTICIPANTS, SYSTEM_INFO_TABLE, SqlBuilder, split_script};
pub use config::{ConnectionSettings, DatabaseConfig, DatabaseSettings, EntitySettings};
pub use database::Database;
pub use dialect::{Dialect, MySqlDialect, SqliteDialect, TIMESTAMP_FORMAT};
pub use engine::{DatabaseEngine, IsolationLevel};
pub use entity::{
    ColumnDef, DELETED, Entity, EntityDescriptor, EntityKey, EntityMeta, ID, IMPLICIT_COLUMNS,
    LAST_TIME, LAST_USER, SqlType, VERSION,
};
pub use error::{DatabaseError, EngineCause, ErrorKind, Result};
pub use expression::{
    ColumnRef, CompareOp, FromExpression, Join, JoinKind, Operand, OrderBy, Predicate,
    SelectExpression, Table, WhereExpression,
};
pub use migration::{
    DatabaseReport, InitializeReport, Migration, SchemaState, SystemInfo, plan_migrations,
};
pub use registry::{ColumnSchema, EntitySchema, SchemaRegistry, SchemaRegistryBuilder, default_table_name};
pub use transaction::{TransactionContext, TransactionStatus};
pub use value::{FromValue, Row, Value, parse_timestamp};
