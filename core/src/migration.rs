//! Migration steps, the system info record and chain validation.
//!
//! A [`Migration`] advances one logical database by exactly one schema
//! version. [`plan_migrations`] selects and orders the steps for a database
//! and rejects any gap, overlap or missing step before a single statement
//! runs.
//!
//! # Examples
//!
//! ```
//! use dbmap_core::{Migration, plan_migrations};
//!
//! let steps = vec![
//!     Migration::new("shop", 2, 3, "ALTER TABLE tb_book ADD COLUMN Isbn TEXT").unwrap(),
//!     Migration::new("shop", 1, 2, "CREATE INDEX ix_title ON tb_book (Title)").unwrap(),
//! ];
//! let plan = plan_migrations("shop", 1, 3, &steps).unwrap();
//! assert_eq!(plan.iter().map(|m| m.old_version()).collect::<Vec<_>>(), vec![1, 2]);
//!
//! // A step may not skip versions.
//! assert!(Migration::new("shop", 1, 3, "").is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// One schema step: `old_version` → `old_version + 1` on `target_database`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    target_database: String,
    old_version: u32,
    new_version: u32,
    sql: String,
}

impl Migration {
    /// # Errors
    ///
    /// [`DatabaseError::ArgumentNotValid`] if `old_version < 1`, if
    /// `new_version != old_version + 1` or if the target database is empty.
    pub fn new(
        target_database: impl Into<String>,
        old_version: u32,
        new_version: u32,
        sql: impl Into<String>,
    ) -> Result<Self> {
        let target_database = target_database.into();
        if target_database.trim().is_empty() {
            return Err(DatabaseError::ArgumentNotValid(
                "migration target database cannot be empty".to_string(),
            ));
        }
        if old_version < 1 {
            return Err(DatabaseError::ArgumentNotValid(format!(
                "migration old version must be at least 1, got {old_version}"
            )));
        }
        if old_version.checked_add(1) != Some(new_version) {
            return Err(DatabaseError::ArgumentNotValid(format!(
                "migration must advance exactly one version, got {old_version} -> {new_version}"
            )));
        }
        Ok(Self {
            target_database,
            old_version,
            new_version,
            sql: sql.into(),
        })
    }

    pub fn target_database(&self) -> &str {
        &self.target_database
    }

    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Selects the steps for `database` and validates that they form one chain
/// from `current` to `target`.
///
/// Steps match the database name case-insensitively and may be supplied in
/// any order.
///
/// # Errors
///
/// [`DatabaseError::MigrateError`] naming the database when the chain does
/// not start at `current`, has a gap or a duplicate, or does not end at `target`.
pub fn plan_migrations<'a>(
    database: &str,
    current: u32,
    target: u32,
    migrations: &'a [Migration],
) -> Result<Vec<&'a Migration>> {
    let fail = |message: String| DatabaseError::MigrateError {
        database: database.to_string(),
        message,
        source: None,
    };

    let mut steps: Vec<&Migration> = migrations
        .iter()
        .filter(|m| m.target_database.eq_ignore_ascii_case(database))
        .collect();
    steps.sort_by_key(|m| m.old_version);

    if steps.is_empty() {
        return Err(fail(format!(
            "no migrations supplied to go from version {current} to {target}"
        )));
    }

    let mut expected = current;
    for step in &steps {
        if step.old_version != expected {
            return Err(fail(format!(
                "expected a migration starting at version {expected}, found {} -> {}",
                step.old_version, step.new_version
            )));
        }
        expected = step.new_version;
    }
    if expected != target {
        return Err(fail(format!(
            "migrations end at version {expected}, configured version is {target}"
        )));
    }
    Ok(steps)
}

/// Contents of the reserved system table of one logical database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    entries: BTreeMap<String, String>,
}

impl SystemInfo {
    pub const VERSION: &'static str = "Version";
    pub const DATABASE_NAME: &'static str = "DatabaseName";

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Stored schema version; 0 when the system table is absent.
    pub fn version(&self) -> u32 {
        self.get(Self::VERSION)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn database_name(&self) -> Option<&str> {
        self.get(Self::DATABASE_NAME)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Bootstrap state of one logical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaState {
    Unchecked,
    BrandNew,
    UpToDate,
    NeedsMigration,
    Ready,
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchecked => "unchecked",
            Self::BrandNew => "brand new",
            Self::UpToDate => "up to date",
            Self::NeedsMigration => "needs migration",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Outcome of bootstrapping one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseReport {
    pub database: String,
    /// State the database was found in.
    pub found: SchemaState,
    pub state: SchemaState,
    pub version_before: u32,
    pub version_after: u32,
    pub tables_created: usize,
    pub migrations_applied: usize,
}

/// Outcome of [`Database::initialize`](crate::Database::initialize).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeReport {
    pub databases: Vec<DatabaseReport>,
}

impl InitializeReport {
    pub fn database(&self, name: &str) -> Option<&DatabaseReport> {
        self.databases
            .iter()
            .find(|d| d.database.eq_ignore_ascii_case(name))
    }
}
