//! SQLite storage engine for dbmap.
//!
//! [`SqliteEngine`] implements [`DatabaseEngine`](dbmap_core::DatabaseEngine)
//! on top of `rusqlite`. A logical database is a master file plus an optional
//! read-only replica file; the connection string of each
//! [`ConnectionSettings`](dbmap_core::ConnectionSettings) entry is the file
//! path.
//!
//! # Architecture
//!
//! - **`engine`**: connection resolution, transactions, statement execution
//! - **`convert`**: [`Value`](dbmap_core::Value) ↔ SQLite storage classes
//! - **`error`**: adapter errors and their mapping into
//!   [`DatabaseError`](dbmap_core::DatabaseError)
//!
//! # Quick start
//!
//! ```no_run
//! use dbmap_core::{Database, DatabaseConfig, SchemaRegistry};
//! use dbmap_sqlite::SqliteEngine;
//!
//! let config = DatabaseConfig::load("dbmap.yaml").unwrap();
//! let engine = SqliteEngine::from_config(&config).unwrap();
//! let registry = SchemaRegistry::builder(config.settings.clone(), "shop").build();
//! let db = Database::new(engine, registry, config.settings.clone());
//!
//! let report = db.initialize(&[]).unwrap();
//! for database in &report.databases {
//!     println!("{}: version {}", database.database, database.version_after);
//! }
//! ```
//!
//! # Transactions
//!
//! `Serializable` and `RepeatableRead` start with `BEGIN IMMEDIATE`, taking
//! the write lock up front; the other levels use `BEGIN DEFERRED`. A
//! [`SqliteTransaction`] that is dropped while open rolls back.

mod convert;
mod engine;
mod error;

pub use engine::{SqliteEngine, SqliteTransaction};
pub use error::{Result, SqliteError};
