//! SQL compiler.
//!
//! [`SqlBuilder`] turns query expressions and entity instances into
//! [`CompiledCommand`]s for the dialect of the engine in use. It resolves
//! every table and column through the [`SchemaRegistry`], quotes every
//! identifier through the [`Dialect`], binds every value as a parameter and
//! injects the implicit soft-delete filters.
//!
//! Soft-delete placement per join kind:
//!
//! | Join      | Filter on the joined table | Filters of earlier tables |
//! |-----------|----------------------------|---------------------------|
//! | root      | `WHERE`                    |                           |
//! | `LEFT`    | its `ON` clause            | unchanged                 |
//! | `INNER`   | `WHERE`                    | unchanged                 |
//! | `CROSS`   | `WHERE`                    | unchanged                 |
//! | `RIGHT`   | `WHERE`                    | moved into this `ON`      |
//! | `FULL`    | none, for the whole query  | none                      |

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::{CommandWriter, CompiledCommand};
use crate::dialect::Dialect;
use crate::entity::{DELETED, Entity, EntityKey, ID, IMPLICIT_COLUMNS, LAST_TIME, LAST_USER, SqlType, VERSION};
use crate::error::{DatabaseError, Result};
use crate::expression::{
    ColumnRef, CompareOp, FromExpression, Join, JoinKind, Operand, OrderBy, Predicate,
    SelectExpression, WhereExpression,
};
use crate::registry::{ColumnSchema, EntitySchema, SchemaRegistry};
use crate::value::Value;

/// Reserved per-database table holding name/value pairs.
pub const SYSTEM_INFO_TABLE: &str = "tb_sys_info";

/// Maximum number of entity types in one query.
pub const MAX_PARTICIPANTS: usize = 3;

const TEMP_SEQ: &str = "_seq";
const TEMP_VALUE: &str = "_value";

static TEMP_TABLE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// What a SELECT returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    Rows,
    Count,
}

/// Generic-free view of a (Select?, From, Where?) triple.
struct QueryShape<'a> {
    root: EntityKey,
    joins: &'a [Join],
    predicates: &'a [Predicate],
    order: &'a [OrderBy],
    limit: Option<(u64, u64)>,
    columns: Option<&'a [ColumnRef]>,
}

impl<'a> QueryShape<'a> {
    fn new<T: Entity>(
        select: Option<&'a SelectExpression<T>>,
        from: Option<&'a FromExpression<T>>,
        filter: Option<&'a WhereExpression<T>>,
    ) -> Self {
        Self {
            root: EntityKey::of::<T>(),
            joins: from.map(|f| f.joins()).unwrap_or(&[]),
            predicates: filter.map(|w| w.predicates()).unwrap_or(&[]),
            order: filter.map(|w| w.ordering()).unwrap_or(&[]),
            limit: filter.and_then(|w| w.limit_range()),
            columns: select.map(|s| s.columns()).filter(|c| !c.is_empty()),
        }
    }

    fn participants(&self) -> Vec<EntityKey> {
        std::iter::once(self.root)
            .chain(self.joins.iter().map(|j| j.target))
            .collect()
    }
}

/// Resolved participants of one query.
struct Scope {
    keys: Vec<EntityKey>,
    schemas: Vec<Arc<EntitySchema>>,
}

impl Scope {
    fn index_of(&self, key: EntityKey) -> Result<usize> {
        self.keys.iter().position(|k| *k == key).ok_or_else(|| {
            DatabaseError::ArgumentNotValid(format!(
                "{} does not participate in the query",
                key.short_name()
            ))
        })
    }

    fn column(&self, column: &ColumnRef) -> Result<(usize, &ColumnSchema)> {
        let index = self.index_of(column.entity)?;
        let schema = &self.schemas[index];
        let resolved = schema.column(&column.column).ok_or_else(|| {
            DatabaseError::ArgumentNotValid(format!(
                "unknown column '{}' on {}",
                column.column, schema.entity_name
            ))
        })?;
        Ok((index, resolved))
    }
}

/// Compiles expressions and entity writes into dialect-specific commands.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    registry: Arc<SchemaRegistry>,
    dialect: Arc<dyn Dialect>,
}

impl SqlBuilder {
    pub fn new(registry: Arc<SchemaRegistry>, dialect: Arc<dyn Dialect>) -> Self {
        Self { registry, dialect }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn qualified(&self, table: &str, column: &str) -> String {
        format!("{}.{}", self.dialect.quote(table), self.dialect.quote(column))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// SELECT over the root type `T` and its joins.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::NotATableModel`] for an unmapped participant and
    /// [`DatabaseError::ArgumentNotValid`] for an invalid shape (too many or
    /// repeated types, unknown columns, FULL join on a dialect without one).
    pub fn retrieve<T: Entity>(
        &self,
        select: Option<&SelectExpression<T>>,
        from: Option<&FromExpression<T>>,
        filter: Option<&WhereExpression<T>>,
    ) -> Result<CompiledCommand> {
        self.compile_select(QueryShape::new(select, from, filter), Projection::Rows)
    }

    /// `SELECT COUNT(1)` with the same joins and filters as [`Self::retrieve`].
    pub fn count<T: Entity>(
        &self,
        from: Option<&FromExpression<T>>,
        filter: Option<&WhereExpression<T>>,
    ) -> Result<CompiledCommand> {
        self.compile_select(QueryShape::new(None, from, filter), Projection::Count)
    }

    /// Schemas of the participants, root first.
    pub fn participant_schemas<T: Entity>(
        &self,
        from: Option<&FromExpression<T>>,
    ) -> Result<Vec<Arc<EntitySchema>>> {
        Ok(self.scope(&QueryShape::new(None, from, None))?.schemas)
    }

    fn scope(&self, shape: &QueryShape<'_>) -> Result<Scope> {
        let keys = shape.participants();
        if keys.len() > MAX_PARTICIPANTS {
            return Err(DatabaseError::ArgumentNotValid(format!(
                "a query joins at most {MAX_PARTICIPANTS} entity types, got {}",
                keys.len()
            )));
        }
        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(*key) {
                return Err(DatabaseError::ArgumentNotValid(format!(
                    "{} participates in the query more than once",
                    key.short_name()
                )));
            }
        }
        let schemas = keys
            .iter()
            .map(|k| self.registry.schema_by_key(*k))
            .collect::<Result<Vec<_>>>()?;
        let database = &schemas[0].database;
        if let Some(other) = schemas.iter().find(|s| !s.database.eq_ignore_ascii_case(database)) {
            return Err(DatabaseError::ArgumentNotValid(format!(
                "cannot join {} in database '{}' with {} in database '{}'",
                other.entity_name, other.database, schemas[0].entity_name, database
            )));
        }
        Ok(Scope { keys, schemas })
    }

    fn compile_select(&self, shape: QueryShape<'_>, projection: Projection) -> Result<CompiledCommand> {
        let scope = self.scope(&shape)?;
        let filtered = !shape.joins.iter().any(|j| j.kind == JoinKind::Full);
        if !filtered && !self.dialect.supports_full_join() {
            return Err(DatabaseError::ArgumentNotValid(format!(
                "the {} dialect does not support FULL joins",
                self.dialect.name()
            )));
        }

        let root = &scope.schemas[0];
        let mut w = CommandWriter::new(self.dialect.as_ref(), root.database.clone());

        let mut sql = String::from("SELECT ");
        match projection {
            Projection::Count => sql.push_str("COUNT(1)"),
            Projection::Rows => sql.push_str(&self.projection(&scope, shape.columns)?.join(", ")),
        }
        sql.push_str(" FROM ");
        sql.push_str(&w.quote(&root.table));

        let mut where_filters: Vec<usize> = if filtered { vec![0] } else { Vec::new() };
        for (offset, join) in shape.joins.iter().enumerate() {
            let index = offset + 1;
            let table = w.quote(&scope.schemas[index].table);
            if join.kind == JoinKind::Cross {
                if filtered {
                    where_filters.push(index);
                }
                sql.push_str(&format!(" CROSS JOIN {table}"));
                continue;
            }
            let on = join.on.as_ref().ok_or_else(|| {
                DatabaseError::ArgumentNotValid(format!("{} requires a binding predicate", join.kind.as_sql()))
            })?;
            let mut conditions = vec![self.render_predicate(&mut w, &scope, on)?];
            if filtered {
                match join.kind {
                    JoinKind::Left => conditions.push(self.deleted_filter(&mut w, &scope, index)),
                    JoinKind::Inner => where_filters.push(index),
                    JoinKind::Right => {
                        for prior in std::mem::take(&mut where_filters) {
                            conditions.push(self.deleted_filter(&mut w, &scope, prior));
                        }
                        where_filters.push(index);
                    }
                    JoinKind::Full | JoinKind::Cross => {}
                }
            }
            sql.push_str(&format!(" {} {table} ON {}", join.kind.as_sql(), conditions.join(" AND ")));
        }

        let mut clauses = Vec::new();
        for predicate in shape.predicates {
            clauses.push(self.render_predicate(&mut w, &scope, predicate)?);
        }
        for index in where_filters {
            clauses.push(self.deleted_filter(&mut w, &scope, index));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if projection == Projection::Rows {
            let mut order = Vec::new();
            for item in shape.order {
                let (index, column) = scope.column(&item.column)?;
                let direction = if item.descending { "DESC" } else { "ASC" };
                order.push(format!(
                    "{} {direction}",
                    self.qualified(&scope.schemas[index].table, &column.name)
                ));
            }
            if order.is_empty() && shape.limit.is_some() {
                order.push(format!("{} ASC", self.qualified(&root.table, ID)));
            }
            if !order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.join(", "));
            }
            if let Some((offset, count)) = shape.limit {
                sql.push(' ');
                sql.push_str(&self.dialect.limit(offset, count));
            }
        }

        w.push(sql);
        Ok(w.finish())
    }

    fn projection(&self, scope: &Scope, columns: Option<&[ColumnRef]>) -> Result<Vec<String>> {
        let root = &scope.schemas[0];
        let Some(columns) = columns else {
            return Ok(scope
                .schemas
                .iter()
                .flat_map(|s| s.columns.iter().map(|c| self.qualified(&s.table, &c.name)))
                .collect());
        };

        let mut names: Vec<&str> = Vec::new();
        for column in columns {
            let (index, resolved) = scope.column(column)?;
            if index != 0 {
                return Err(DatabaseError::ArgumentNotValid(format!(
                    "select lists only columns of {}",
                    root.entity_name
                )));
            }
            if !names.contains(&resolved.name.as_str()) {
                names.push(&resolved.name);
            }
        }
        for implicit in IMPLICIT_COLUMNS {
            if !names.contains(&implicit) {
                names.push(implicit);
            }
        }
        Ok(names.iter().map(|n| self.qualified(&root.table, n)).collect())
    }

    fn deleted_filter(&self, w: &mut CommandWriter<'_>, scope: &Scope, index: usize) -> String {
        let column = self.qualified(&scope.schemas[index].table, DELETED);
        format!("{column} = {}", w.bind(false))
    }

    fn render_operand(&self, w: &mut CommandWriter<'_>, scope: &Scope, operand: &Operand) -> Result<String> {
        match operand {
            Operand::Column(column) => {
                let (index, resolved) = scope.column(column)?;
                Ok(self.qualified(&scope.schemas[index].table, &resolved.name))
            }
            Operand::Value(value) => Ok(w.bind(value.clone())),
        }
    }

    fn render_predicate(
        &self,
        w: &mut CommandWriter<'_>,
        scope: &Scope,
        predicate: &Predicate,
    ) -> Result<String> {
        let sql = match predicate {
            Predicate::Compare { left, op, right } => {
                let null_side = match (left, right) {
                    (_, Operand::Value(Value::Null)) => Some(left),
                    (Operand::Value(Value::Null), _) => Some(right),
                    _ => None,
                };
                match (null_side, op) {
                    (Some(side), CompareOp::Eq) => {
                        format!("{} IS NULL", self.render_operand(w, scope, side)?)
                    }
                    (Some(side), CompareOp::Ne) => {
                        format!("{} IS NOT NULL", self.render_operand(w, scope, side)?)
                    }
                    (Some(_), other) => {
                        return Err(DatabaseError::ArgumentNotValid(format!(
                            "NULL cannot be compared with '{}'",
                            other.as_sql()
                        )));
                    }
                    (None, _) => {
                        let l = self.render_operand(w, scope, left)?;
                        let r = self.render_operand(w, scope, right)?;
                        format!("{l} {} {r}", op.as_sql())
                    }
                }
            }
            Predicate::IsNull(column) => {
                format!("{} IS NULL", self.render_operand(w, scope, &Operand::Column(column.clone()))?)
            }
            Predicate::IsNotNull(column) => format!(
                "{} IS NOT NULL",
                self.render_operand(w, scope, &Operand::Column(column.clone()))?
            ),
            Predicate::In { column, values } => {
                let target = self.render_operand(w, scope, &Operand::Column(column.clone()))?;
                if values.is_empty() {
                    "1 = 0".to_string()
                } else {
                    let placeholders: Vec<String> = values.iter().map(|v| w.bind(v.clone())).collect();
                    format!("{target} IN ({})", placeholders.join(", "))
                }
            }
            Predicate::Like { column, pattern } => {
                let target = self.render_operand(w, scope, &Operand::Column(column.clone()))?;
                format!("{target} LIKE {}", w.bind(pattern.as_str()))
            }
            Predicate::And(a, b) => format!(
                "({} AND {})",
                self.render_predicate(w, scope, a)?,
                self.render_predicate(w, scope, b)?
            ),
            Predicate::Or(a, b) => format!(
                "({} OR {})",
                self.render_predicate(w, scope, a)?,
                self.render_predicate(w, scope, b)?
            ),
            Predicate::Not(inner) => format!("NOT ({})", self.render_predicate(w, scope, inner)?),
        };
        Ok(sql)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// INSERT followed by a reselect of the generated columns.
    pub fn add<T: Entity>(&self, schema: &EntitySchema, item: &T, last_user: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), schema.database.clone());
        let insert = self.insert_sql(&mut w, schema, item, last_user);
        w.push(insert);

        let generated: Vec<String> = IMPLICIT_COLUMNS.iter().map(|c| w.quote(c)).collect();
        w.push(format!(
            "SELECT {} FROM {} WHERE {} = {}",
            generated.join(", "),
            w.quote(&schema.table),
            w.quote(ID),
            self.dialect.last_insert_id()
        ));
        w.finish()
    }

    /// Version-gated UPDATE of every writable column.
    pub fn update<T: Entity>(&self, schema: &EntitySchema, item: &T, last_user: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), schema.database.clone());
        let sql = self.update_sql(&mut w, schema, item, last_user);
        w.push(sql);
        w.finish()
    }

    /// Version-gated soft delete.
    pub fn delete<T: Entity>(&self, schema: &EntitySchema, item: &T, last_user: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), schema.database.clone());
        let sql = self.delete_sql(&mut w, schema, item, last_user);
        w.push(sql);
        w.finish()
    }

    /// One INSERT per item; the last result set holds the generated columns
    /// (`Id`, `Version`, `Deleted`, `LastUser`, `LastTime`) of every item, in order.
    pub fn batch_add<T: Entity>(&self, schema: &EntitySchema, items: &[T], last_user: &str) -> CompiledCommand {
        self.batch(schema, items, self.dialect.last_insert_id(), true, |w, item| {
            self.insert_sql(w, schema, item, last_user)
        })
    }

    /// One UPDATE per item; the last result set holds one affected-row count per item.
    pub fn batch_update<T: Entity>(
        &self,
        schema: &EntitySchema,
        items: &[T],
        last_user: &str,
    ) -> CompiledCommand {
        self.batch(schema, items, self.dialect.affected_rows(), false, |w, item| {
            self.update_sql(w, schema, item, last_user)
        })
    }

    /// One soft delete per item; the last result set holds one affected-row count per item.
    pub fn batch_delete<T: Entity>(
        &self,
        schema: &EntitySchema,
        items: &[T],
        last_user: &str,
    ) -> CompiledCommand {
        self.batch(schema, items, self.dialect.affected_rows(), false, |w, item| {
            self.delete_sql(w, schema, item, last_user)
        })
    }

    /// Correlates per-item results through a temporary table so that one
    /// round trip reports them in submission order.
    ///
    /// With `reselect`, each correlated value is an `Id` and the final result
    /// set joins it back to the entity table for the generated columns.
    fn batch<T>(
        &self,
        schema: &EntitySchema,
        items: &[T],
        correlate: &str,
        reselect: bool,
        mut statement: impl FnMut(&mut CommandWriter<'_>, &T) -> String,
    ) -> CompiledCommand {
        let temp = format!("dbmap_batch_{}", TEMP_TABLE_SEQUENCE.fetch_add(1, Ordering::Relaxed));
        let mut w = CommandWriter::new(self.dialect.as_ref(), schema.database.clone());
        let (seq, value, quoted_temp) = (w.quote(TEMP_SEQ), w.quote(TEMP_VALUE), w.quote(&temp));

        w.push(self.dialect.drop_temp_table(&temp));
        w.push(self.dialect.create_temp_table(&temp));
        for (position, item) in items.iter().enumerate() {
            let sql = statement(&mut w, item);
            w.push(sql);
            w.push(format!(
                "INSERT INTO {quoted_temp} ({seq}, {value}) VALUES ({position}, {correlate})"
            ));
        }
        if reselect {
            let table = w.quote(&schema.table);
            let generated: Vec<String> = IMPLICIT_COLUMNS
                .iter()
                .map(|c| {
                    let column = w.quote(c);
                    format!("{table}.{column} AS {column}")
                })
                .collect();
            w.push(format!(
                "SELECT {quoted_temp}.{value} AS {value}, {} FROM {quoted_temp} \
                 LEFT JOIN {table} ON {table}.{} = {quoted_temp}.{value} ORDER BY {quoted_temp}.{seq}",
                generated.join(", "),
                w.quote(ID)
            ));
        } else {
            w.push(format!("SELECT {value} FROM {quoted_temp} ORDER BY {seq}"));
        }
        w.push(self.dialect.drop_temp_table(&temp));
        w.finish()
    }

    fn insert_sql<T: Entity>(
        &self,
        w: &mut CommandWriter<'_>,
        schema: &EntitySchema,
        item: &T,
        last_user: &str,
    ) -> String {
        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in schema.writable_user_columns() {
            names.push(w.quote(&column.name));
            values.push(w.bind(item.value(&column.name)));
        }
        for (column, value) in [
            (VERSION, Value::Integer(1)),
            (DELETED, Value::Bool(false)),
            (LAST_USER, Value::from(last_user)),
        ] {
            names.push(w.quote(column));
            values.push(w.bind(value));
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            w.quote(&schema.table),
            names.join(", "),
            values.join(", ")
        )
    }

    fn update_sql<T: Entity>(
        &self,
        w: &mut CommandWriter<'_>,
        schema: &EntitySchema,
        item: &T,
        last_user: &str,
    ) -> String {
        let mut assignments = Vec::new();
        for column in schema.writable_user_columns() {
            let placeholder = w.bind(item.value(&column.name));
            assignments.push(format!("{} = {placeholder}", w.quote(&column.name)));
        }
        assignments.push(format!("{} = {}", w.quote(LAST_USER), w.bind(last_user)));
        self.versioned_write(w, schema, item, assignments)
    }

    fn delete_sql<T: Entity>(
        &self,
        w: &mut CommandWriter<'_>,
        schema: &EntitySchema,
        item: &T,
        last_user: &str,
    ) -> String {
        let assignments = vec![
            format!("{} = {}", w.quote(DELETED), w.bind(true)),
            format!("{} = {}", w.quote(LAST_USER), w.bind(last_user)),
        ];
        self.versioned_write(w, schema, item, assignments)
    }

    /// Appends the version bump and audit time, then the optimistic-concurrency gate.
    fn versioned_write<T: Entity>(
        &self,
        w: &mut CommandWriter<'_>,
        schema: &EntitySchema,
        item: &T,
        mut assignments: Vec<String>,
    ) -> String {
        let version = w.quote(VERSION);
        assignments.push(format!("{version} = {version} + 1"));
        assignments.push(format!(
            "{} = {}",
            w.quote(LAST_TIME),
            self.dialect.current_timestamp()
        ));
        let meta = item.meta();
        format!(
            "UPDATE {} SET {} WHERE {} = {} AND {} = {} AND {version} = {}",
            w.quote(&schema.table),
            assignments.join(", "),
            w.quote(ID),
            w.bind(meta.id),
            w.quote(DELETED),
            w.bind(false),
            w.bind(meta.version)
        )
    }

    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    /// CREATE TABLE for an entity schema plus indexes on its foreign-key columns.
    pub fn create_table(&self, schema: &EntitySchema, add_drop_statement: bool) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), schema.database.clone());
        let table = w.quote(&schema.table);
        if add_drop_statement {
            w.push(format!("DROP TABLE IF EXISTS {table}"));
        }

        let definitions: Vec<String> = schema
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        w.push(format!("CREATE TABLE {table} (\n  {}\n)", definitions.join(",\n  ")));

        for column in schema.columns.iter().filter(|c| c.foreign_key) {
            w.push(format!(
                "CREATE INDEX {} ON {table} ({})",
                w.quote(&format!("{}_{}_index", schema.table, column.name)),
                w.quote(&column.name)
            ));
        }
        w.finish()
    }

    fn column_definition(&self, column: &ColumnSchema) -> String {
        if column.primary_key && column.auto_increment {
            return self.dialect.auto_increment_primary_key(&column.name);
        }
        let mut definition = format!(
            "{} {}",
            self.dialect.quote(&column.name),
            self.dialect.map_type(column)
        );
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if column.unique {
            definition.push_str(" UNIQUE");
        }
        if column.implicit && column.name == LAST_TIME {
            definition.push(' ');
            definition.push_str(&self.dialect.timestamp_default());
        } else if let Some(default) = &column.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(&self.dialect.literal(default));
        }
        definition
    }

    /// Scalar query counting tables named `table` in `database`.
    pub fn table_exists(&self, database: &str, table: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), database);
        let table_param = w.bind(table);
        let database_param = w.bind(database);
        let sql = self.dialect.table_exists(&table_param, &database_param);
        w.push_referenced(sql);
        w.finish()
    }

    pub fn system_info_exists(&self, database: &str) -> CompiledCommand {
        self.table_exists(database, SYSTEM_INFO_TABLE)
    }

    /// Creates the system table at version 1 and records the database name.
    pub fn system_info_create(&self, database: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), database);
        let table = w.quote(SYSTEM_INFO_TABLE);
        let text = |name: &str, length: u32, nullable: bool| ColumnSchema {
            name: name.to_string(),
            sql_type: SqlType::Text,
            nullable,
            unique: !nullable,
            length: Some(length),
            fixed_length: false,
            default: None,
            primary_key: false,
            foreign_key: false,
            auto_increment: false,
            writable: true,
            implicit: false,
        };
        w.push(format!(
            "CREATE TABLE {table} (\n  {},\n  {},\n  {}\n)",
            self.dialect.auto_increment_primary_key(ID),
            self.column_definition(&text("Name", 100, false)),
            self.column_definition(&text("Value", 1024, true)),
        ));
        for (name, value) in [("Version", "1".to_string()), ("DatabaseName", database.to_string())] {
            let (n, v) = (w.bind(name), w.bind(value));
            w.push(format!(
                "INSERT INTO {table} ({}, {}) VALUES ({n}, {v})",
                w.quote("Name"),
                w.quote("Value")
            ));
        }
        w.finish()
    }

    pub fn system_info_select(&self, database: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), database);
        w.push(format!(
            "SELECT {}, {} FROM {}",
            w.quote("Name"),
            w.quote("Value"),
            w.quote(SYSTEM_INFO_TABLE)
        ));
        w.finish()
    }

    pub fn system_info_update_version(&self, database: &str, version: u32) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), database);
        let (value, name) = (w.bind(version.to_string()), w.bind("Version"));
        w.push(format!(
            "UPDATE {} SET {} = {value} WHERE {} = {name}",
            w.quote(SYSTEM_INFO_TABLE),
            w.quote("Value"),
            w.quote("Name")
        ));
        w.finish()
    }

    /// Wraps a literal SQL script, one statement per `;`-terminated part.
    pub fn raw(&self, database: &str, script: &str) -> CompiledCommand {
        let mut w = CommandWriter::new(self.dialect.as_ref(), database);
        for statement in split_script(script) {
            w.push(statement);
        }
        w.finish()
    }
}

/// Nesting of `BEGIN`/`CASE` ... `END` blocks inside a `CREATE TRIGGER` statement.
#[derive(Debug, Default)]
struct TriggerBlocks {
    words: usize,
    create: bool,
    trigger: bool,
    depth: usize,
}

impl TriggerBlocks {
    fn word(&mut self, word: &str) {
        if word.is_empty() {
            return;
        }
        self.words += 1;
        match word.to_ascii_uppercase().as_str() {
            "CREATE" if self.words == 1 => self.create = true,
            "TRIGGER" if self.create => self.trigger = true,
            "BEGIN" | "CASE" if self.trigger => self.depth += 1,
            "END" if self.trigger => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn inside(&self) -> bool {
        self.depth > 0
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Splits a script on `;` outside quotes, comments and trigger bodies; empty
/// statements are dropped.
pub fn split_script(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut word = String::new();
    let mut blocks = TriggerBlocks::default();
    let mut chars = script.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if !is_word_char(c) {
            blocks.word(&std::mem::take(&mut word));
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
            }
            ';' if blocks.inside() => current.push(c),
            ';' => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
                blocks = TriggerBlocks::default();
            }
            c if is_word_char(c) => {
                word.push(c);
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}
