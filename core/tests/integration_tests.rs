//! Integration tests for the dbmap-core orchestrator, driven by a scripted engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dbmap_core::{
    ColumnDef, CompiledCommand, Database, DatabaseEngine, DatabaseError, DatabaseSettings, Dialect,
    Entity, EntityDescriptor, EntityMeta, FromExpression, IsolationLevel, Migration, Result, Row,
    SchemaRegistry, SchemaState, SqlType, SqliteDialect, TransactionStatus, Value, WhereExpression,
};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize)]
struct BookEntity {
    #[serde(flatten)]
    meta: EntityMeta,
    title: String,
    author_id: i64,
}

impl BookEntity {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    fn stored(id: i64, version: i64, title: &str) -> Self {
        let mut book = Self::new(title);
        book.meta.id = id;
        book.meta.version = version;
        book
    }
}

impl Entity for BookEntity {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("BookEntity")
            .column(ColumnDef::new("Title", SqlType::Text).not_null())
            .column(ColumnDef::new("AuthorId", SqlType::BigInt).foreign_key())
    }
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn value(&self, column: &str) -> Value {
        match column {
            "Title" => self.title.clone().into(),
            "AuthorId" => self.author_id.into(),
            _ => Value::Null,
        }
    }
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            meta: EntityMeta::from_row(row)?,
            title: row.get("Title")?,
            author_id: row.get("AuthorId")?,
        })
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Serialize)]
struct AuthorEntity {
    meta: EntityMeta,
    name: String,
}

impl Entity for AuthorEntity {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("AuthorEntity").column(ColumnDef::new("Name", SqlType::Text))
    }
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn value(&self, column: &str) -> Value {
        match column {
            "Name" => self.name.clone().into(),
            _ => Value::Null,
        }
    }
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            meta: EntityMeta::from_row(row)?,
            name: row.get("Name")?,
        })
    }
}

#[derive(Debug, Default, Clone, Serialize)]
struct ArchiveEntity {
    meta: EntityMeta,
}

impl Entity for ArchiveEntity {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("ArchiveEntity").read_only()
    }
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn value(&self, _column: &str) -> Value {
        Value::Null
    }
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            meta: EntityMeta::from_row(row)?,
        })
    }
}

#[derive(Debug, Default, Clone, Serialize)]
struct AuditEntity {
    meta: EntityMeta,
}

impl Entity for AuditEntity {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("AuditEntity").database("audit")
    }
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn value(&self, _column: &str) -> Value {
        Value::Null
    }
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            meta: EntityMeta::from_row(row)?,
        })
    }
}

#[derive(Debug, Default, Clone, Serialize)]
struct UnregisteredEntity {
    meta: EntityMeta,
}

impl Entity for UnregisteredEntity {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("UnregisteredEntity")
    }
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn value(&self, _column: &str) -> Value {
        Value::Null
    }
    fn from_row(_row: &Row) -> Result<Self> {
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Event {
    Begin(String, IsolationLevel),
    Commit(String),
    Rollback(String),
    Run {
        database: String,
        sql: String,
        in_transaction: bool,
        use_master: bool,
    },
}

#[derive(Default)]
struct Script {
    result_sets: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    failure: Option<String>,
    commit_failure: Option<String>,
}

struct MockEngine {
    databases: Vec<String>,
    script: Mutex<Script>,
    events: Mutex<Vec<Event>>,
}

struct MockTransaction {
    database: String,
}

impl MockEngine {
    fn new(databases: &[&str]) -> Self {
        Self {
            databases: databases.iter().map(|d| d.to_string()).collect(),
            script: Mutex::new(Script::default()),
            events: Mutex::new(Vec::new()),
        }
    }

    fn push_rows(&self, rows: Vec<Row>) {
        self.script.lock().unwrap().result_sets.push_back(rows);
    }

    fn push_affected(&self, count: u64) {
        self.script.lock().unwrap().affected.push_back(count);
    }

    fn fail_next(&self, message: &str) {
        self.script.lock().unwrap().failure = Some(message.to_string());
    }

    fn fail_next_commit(&self, message: &str) {
        self.script.lock().unwrap().commit_failure = Some(message.to_string());
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Run { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    fn record(&self, transaction: Option<&mut MockTransaction>, command: &CompiledCommand, use_master: bool) -> Result<()> {
        self.events.lock().unwrap().push(Event::Run {
            database: command.database.clone(),
            sql: command.sql(),
            in_transaction: transaction.is_some(),
            use_master,
        });
        match self.script.lock().unwrap().failure.take() {
            Some(message) => Err(DatabaseError::engine(message)),
            None => Ok(()),
        }
    }
}

impl DatabaseEngine for MockEngine {
    type Transaction = MockTransaction;

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(SqliteDialect)
    }

    fn database_names(&self) -> Vec<String> {
        self.databases.clone()
    }

    fn begin_transaction(&self, database: &str, isolation: IsolationLevel) -> Result<MockTransaction> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Begin(database.to_string(), isolation));
        Ok(MockTransaction {
            database: database.to_string(),
        })
    }

    fn commit(&self, transaction: MockTransaction) -> Result<()> {
        if let Some(message) = self.script.lock().unwrap().commit_failure.take() {
            return Err(DatabaseError::engine(message));
        }
        self.events.lock().unwrap().push(Event::Commit(transaction.database));
        Ok(())
    }

    fn rollback(&self, transaction: MockTransaction) -> Result<()> {
        self.events.lock().unwrap().push(Event::Rollback(transaction.database));
        Ok(())
    }

    fn execute_non_query(&self, transaction: Option<&mut MockTransaction>, command: &CompiledCommand) -> Result<u64> {
        self.record(transaction, command, true)?;
        Ok(self.script.lock().unwrap().affected.pop_front().unwrap_or(1))
    }

    fn execute_reader(
        &self,
        transaction: Option<&mut MockTransaction>,
        command: &CompiledCommand,
        use_master: bool,
    ) -> Result<Vec<Row>> {
        self.record(transaction, command, use_master)?;
        Ok(self.script.lock().unwrap().result_sets.pop_front().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row(cells: &[(&str, Value)]) -> Row {
    Row::new(
        cells.iter().map(|(c, _)| c.to_string()).collect(),
        cells.iter().map(|(_, v)| v.clone()).collect(),
    )
}

fn book_cells(id: i64, title: &str) -> Vec<(&'static str, Value)> {
    vec![
        ("Id", Value::Integer(id)),
        ("Title", Value::from(title)),
        ("AuthorId", Value::Integer(1)),
        ("Version", Value::Integer(1)),
        ("Deleted", Value::Bool(false)),
        ("LastUser", Value::from("alice")),
        ("LastTime", Value::from("2024-05-01 10:00:00.000")),
    ]
}

fn author_cells(id: Option<i64>, name: Option<&str>) -> Vec<(&'static str, Value)> {
    vec![
        ("Id", id.into()),
        ("Name", name.into()),
        ("Version", id.map(|_| 1i64).into()),
        ("Deleted", id.map(|_| false).into()),
        ("LastUser", Value::Null),
        ("LastTime", Value::Null),
    ]
}

/// Result row of a batch insert: the correlated id plus the generated columns.
fn batch_added_row(id: i64) -> Row {
    row(&[
        ("_value", Value::Integer(id)),
        ("Id", Value::Integer(id)),
        ("Version", Value::Integer(1)),
        ("Deleted", Value::Integer(0)),
        ("LastUser", Value::from("alice")),
        ("LastTime", Value::from("2024-05-01 10:00:00.250")),
    ])
}

fn count_row(count: i64) -> Row {
    row(&[("count(1)", Value::Integer(count))])
}

fn database_with(settings: DatabaseSettings, databases: &[&str]) -> Database<MockEngine> {
    let registry = SchemaRegistry::builder(settings.clone(), "shop")
        .register::<BookEntity>()
        .register::<AuthorEntity>()
        .register::<ArchiveEntity>()
        .register::<AuditEntity>()
        .build();
    Database::new(MockEngine::new(databases), registry, settings)
}

fn database() -> Database<MockEngine> {
    database_with(DatabaseSettings::default(), &["shop", "audit"])
}

// ---------------------------------------------------------------------------
// Single-row writes
// ---------------------------------------------------------------------------

#[test]
fn test_add_refreshes_generated_columns() {
    let db = database();
    db.engine().push_rows(vec![row(&[
        ("Id", Value::Integer(7)),
        ("Version", Value::Integer(1)),
        ("Deleted", Value::Integer(0)),
        ("LastUser", Value::from("alice")),
        ("LastTime", Value::from("2024-05-01 10:00:00.123")),
    ])]);

    let mut book = BookEntity::new("Dune");
    db.add(&mut book, "alice", None).unwrap();

    assert_eq!(book.meta.id, 7);
    assert_eq!(book.meta.version, 1);
    assert!(!book.meta.deleted);
    assert_eq!(book.meta.last_user, "alice");
    assert!(book.meta.last_time.is_some());

    let events = db.engine().events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Run {
            sql,
            use_master,
            in_transaction,
            ..
        } => {
            assert!(sql.starts_with("INSERT INTO \"tb_book\""));
            assert!(sql.contains("last_insert_rowid()"));
            assert!(*use_master);
            assert!(!*in_transaction);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_add_rejects_invalid_item_before_io() {
    let db = database();
    let mut book = BookEntity::new("  ");
    let err = db.add(&mut book, "alice", None).unwrap_err();
    assert!(matches!(err, DatabaseError::ArgumentNotValid(_)));
    assert!(db.engine().events().is_empty());
}

#[test]
fn test_write_to_read_only_entity_is_rejected_before_io() {
    let db = database();
    let mut archive = ArchiveEntity::default();
    let err = db.add(&mut archive, "alice", None).unwrap_err();
    assert!(matches!(err, DatabaseError::NotWriteable { ref entity } if entity == "ArchiveEntity"));

    let mut batch = vec![ArchiveEntity::default()];
    let err = db.batch_add(&mut batch, "alice", None).unwrap_err();
    assert!(matches!(err, DatabaseError::NotWriteable { .. }));
    assert!(db.engine().events().is_empty());
}

#[test]
fn test_unregistered_entity_is_not_a_table_model() {
    let db = database();
    let err = db.retrieve_all::<UnregisteredEntity>(None).unwrap_err();
    assert!(matches!(err, DatabaseError::NotATableModel { .. }));
}

#[test]
fn test_update_success_bumps_version() {
    let db = database();
    db.engine().push_affected(1);
    let mut book = BookEntity::stored(3, 4, "Dune");

    db.update(&mut book, "bob", None).unwrap();

    assert_eq!(book.meta.version, 5);
    assert_eq!(book.meta.last_user, "bob");
    let sql = &db.engine().statements()[0];
    assert!(sql.contains("\"Version\" = \"Version\" + 1"));
    assert!(sql.contains("WHERE \"Id\" = "));
}

#[test]
fn test_update_with_stale_version_is_not_found() {
    let db = database();
    db.engine().push_affected(0);
    let mut book = BookEntity::stored(3, 4, "Dune");

    let err = db.update(&mut book, "bob", None).unwrap_err();

    assert!(matches!(err, DatabaseError::NotFound { .. }));
    assert_eq!(book.meta.version, 4);
}

#[test]
fn test_update_affecting_many_rows_is_found_too_much() {
    let db = database();
    db.engine().push_affected(2);
    let mut book = BookEntity::stored(3, 1, "Dune");
    let err = db.update(&mut book, "bob", None).unwrap_err();
    assert!(matches!(err, DatabaseError::FoundTooMuch { .. }));
}

#[test]
fn test_update_requires_persisted_item() {
    let db = database();
    let mut book = BookEntity::new("Dune");
    let err = db.update(&mut book, "bob", None).unwrap_err();
    assert!(matches!(err, DatabaseError::ArgumentNotValid(_)));
    assert!(db.engine().events().is_empty());
}

#[test]
fn test_delete_marks_item_deleted() {
    let db = database();
    db.engine().push_affected(1);
    let mut book = BookEntity::stored(3, 2, "Dune");

    db.delete(&mut book, "carol", None).unwrap();

    assert!(book.meta.deleted);
    assert_eq!(book.meta.version, 3);
    let sql = &db.engine().statements()[0];
    assert!(sql.starts_with("UPDATE \"tb_book\" SET \"Deleted\" = "));
    assert!(!sql.contains("DELETE"));
}

#[test]
fn test_engine_failure_is_wrapped_with_payload() {
    let db = database();
    db.engine().fail_next("disk I/O error");
    let mut book = BookEntity::stored(3, 2, "Dune");

    let err = db.update(&mut book, "bob", None).unwrap_err();

    match &err {
        DatabaseError::DataAccess {
            entity,
            operation,
            payload,
            ..
        } => {
            assert_eq!(entity, "BookEntity");
            assert_eq!(operation, "update");
            assert!(payload.contains("\"title\":\"Dune\""));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(std::error::Error::source(&err).is_some());
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[test]
fn test_batch_on_empty_input_is_noop() {
    let db = database();
    let mut none: Vec<BookEntity> = Vec::new();
    assert!(db.batch_add(&mut none, "alice", None).unwrap().is_empty());
    db.batch_update(&mut none, "alice", None).unwrap();
    db.batch_delete(&mut none, "alice", None).unwrap();
    assert!(db.engine().events().is_empty());
}

#[test]
fn test_batch_add_assigns_ids_in_order() {
    let db = database();
    db.engine()
        .push_rows(vec![batch_added_row(10), batch_added_row(11), batch_added_row(12)]);
    let mut books = vec![BookEntity::new("A"), BookEntity::new("B"), BookEntity::new("C")];

    let ids = db.batch_add(&mut books, "alice", None).unwrap();

    assert_eq!(ids, vec![10, 11, 12]);
    assert_eq!(books[2].meta.id, 12);
    assert!(books.iter().all(|b| b.meta.version == 1 && b.meta.last_user == "alice"));
    assert!(books.iter().all(|b| !b.meta.deleted && b.meta.last_time.is_some()));

    let events = db.engine().events();
    assert!(matches!(events.first(), Some(Event::Begin(db, IsolationLevel::ReadCommitted)) if db == "shop"));
    assert!(matches!(events.last(), Some(Event::Commit(_))));
    match &events[1] {
        Event::Run { sql, in_transaction, .. } => {
            assert!(*in_transaction);
            assert_eq!(sql.matches("INSERT INTO \"tb_book\"").count(), 3);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_batch_add_count_mismatch_rolls_back() {
    let db = database();
    db.engine().push_rows(vec![row(&[("_value", Value::Integer(10))])]);
    let mut books = vec![BookEntity::new("A"), BookEntity::new("B")];

    let err = db.batch_add(&mut books, "alice", None).unwrap_err();

    assert!(matches!(err, DatabaseError::NotMatch { expected: 2, actual: 1, .. }));
    assert!(books.iter().all(|b| b.meta.id == 0));
    assert!(matches!(db.engine().events().last(), Some(Event::Rollback(_))));
}

#[test]
fn test_batch_update_requires_exactly_one_row_each() {
    let db = database();
    db.engine().push_rows(vec![
        row(&[("_value", Value::Integer(1))]),
        row(&[("_value", Value::Integer(0))]),
    ]);
    let mut books = vec![BookEntity::stored(1, 1, "A"), BookEntity::stored(2, 1, "B")];

    let err = db.batch_update(&mut books, "bob", None).unwrap_err();

    assert!(matches!(err, DatabaseError::NotFound { .. }));
    assert_eq!(books[0].meta.version, 1);
    assert!(matches!(db.engine().events().last(), Some(Event::Rollback(_))));
}

#[test]
fn test_batch_delete_inside_caller_transaction() {
    let db = database();
    let mut tx = db
        .begin_transaction_for::<BookEntity>(IsolationLevel::Serializable)
        .unwrap();
    db.engine().push_rows(vec![
        row(&[("_value", Value::Integer(1))]),
        row(&[("_value", Value::Integer(1))]),
    ]);
    let mut books = vec![BookEntity::stored(1, 1, "A"), BookEntity::stored(2, 3, "B")];

    db.batch_delete(&mut books, "bob", Some(&mut tx)).unwrap();
    db.commit(&mut tx).unwrap();

    assert!(books.iter().all(|b| b.meta.deleted));
    assert_eq!(books[1].meta.version, 4);
    let begins = db
        .engine()
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Begin(..)))
        .count();
    assert_eq!(begins, 1);
    assert_eq!(tx.status(), TransactionStatus::Committed);
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[test]
fn test_reads_without_transaction_prefer_replica() {
    let db = database();
    db.engine().push_rows(vec![row(&book_cells(1, "Dune"))]);

    let books = db.retrieve_all::<BookEntity>(None).unwrap();

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Dune");
    match &db.engine().events()[0] {
        Event::Run { use_master, sql, .. } => {
            assert!(!*use_master);
            assert!(sql.contains("WHERE \"tb_book\".\"Deleted\" = @p0"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_scalar_cardinality() {
    let db = database();
    let filter = WhereExpression::<BookEntity>::new().and(|b| b.col("Title").eq("Dune"));

    db.engine().push_rows(Vec::new());
    assert!(db.scalar(None, None, Some(&filter), None).unwrap().is_none());

    db.engine().push_rows(vec![row(&book_cells(1, "Dune"))]);
    assert_eq!(db.scalar(None, None, Some(&filter), None).unwrap().unwrap().meta.id, 1);

    db.engine()
        .push_rows(vec![row(&book_cells(1, "Dune")), row(&book_cells(2, "Dune"))]);
    let err = db.scalar(None, None, Some(&filter), None).unwrap_err();
    assert!(matches!(err, DatabaseError::FoundTooMuch { .. }));
}

#[test]
fn test_count_reads_scalar() {
    let db = database();
    db.engine().push_rows(vec![count_row(25)]);
    assert_eq!(db.count::<BookEntity>(None, None, None).unwrap(), 25);
    assert!(db.engine().statements()[0].starts_with("SELECT COUNT(1) FROM \"tb_book\""));
}

#[test]
fn test_page_compiles_limit_window() {
    let db = database();
    db.page::<BookEntity>(None, None, None, 2, 10, None).unwrap();
    let sql = &db.engine().statements()[0];
    assert!(sql.contains("ORDER BY \"tb_book\".\"Id\" ASC LIMIT 10 OFFSET 10"));

    let err = db.page::<BookEntity>(None, None, None, 0, 10, None).unwrap_err();
    assert!(matches!(err, DatabaseError::ArgumentNotValid(_)));
    let err = db.page::<BookEntity>(None, None, None, 1, 0, None).unwrap_err();
    assert!(matches!(err, DatabaseError::ArgumentNotValid(_)));
}

#[test]
fn test_retrieve2_splits_joined_rows() {
    let db = database();
    let mut with_author = book_cells(1, "Dune");
    with_author.extend(author_cells(Some(5), Some("Herbert")));
    let mut without_author = book_cells(2, "Anonymous");
    without_author.extend(author_cells(None, None));
    db.engine().push_rows(vec![row(&with_author), row(&without_author)]);

    let from = FromExpression::<BookEntity>::new()
        .left_join::<AuthorEntity>(|b, a| b.col("AuthorId").eq_col(a.id()));
    let rows = db.retrieve2::<BookEntity, AuthorEntity>(&from, None, None).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0.title, "Dune");
    assert_eq!(rows[0].1.as_ref().map(|a| a.name.as_str()), Some("Herbert"));
    assert_eq!(rows[0].1.as_ref().map(|a| a.meta.id), Some(5));
    assert_eq!(rows[1].0.meta.id, 2);
    assert!(rows[1].1.is_none());

    let sql = &db.engine().statements()[0];
    assert!(sql.contains("LEFT JOIN \"tb_author\" ON"));
}

#[test]
fn test_retrieve2_rejects_mismatched_participants() {
    let db = database();
    let from = FromExpression::<BookEntity>::new();
    let err = db
        .retrieve2::<BookEntity, AuthorEntity>(&from, None, None)
        .unwrap_err();
    assert!(matches!(err, DatabaseError::ArgumentNotValid(_)));
    assert!(db.engine().events().is_empty());
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[test]
fn test_transaction_bound_to_other_database() {
    let db = database();
    let mut tx = db.begin_transaction("shop", IsolationLevel::default()).unwrap();
    let mut audit = AuditEntity::default();
    audit.meta.id = 1;
    audit.meta.version = 1;

    let err = db.update(&mut audit, "alice", Some(&mut tx)).unwrap_err();

    assert!(matches!(err, DatabaseError::TransactionError(_)));
    assert!(db.engine().statements().is_empty());
    db.rollback(&mut tx).unwrap();
}

#[test]
fn test_finished_transaction_cannot_be_reused() {
    let db = database();
    let mut tx = db.begin_transaction("shop", IsolationLevel::default()).unwrap();
    db.commit(&mut tx).unwrap();

    let err = db.retrieve_all::<BookEntity>(Some(&mut tx)).unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionError(_)));
    assert!(matches!(db.rollback(&mut tx), Err(DatabaseError::TransactionError(_))));
}

#[test]
fn test_transactional_reads_use_master() {
    let db = database();
    let mut tx = db.begin_transaction("shop", IsolationLevel::default()).unwrap();
    db.retrieve_all::<BookEntity>(Some(&mut tx)).unwrap();
    match &db.engine().events()[1] {
        Event::Run {
            use_master,
            in_transaction,
            ..
        } => {
            assert!(*use_master);
            assert!(*in_transaction);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn system_rows(version: u32) -> Vec<Row> {
    vec![
        row(&[("Name", Value::from("Version")), ("Value", Value::from(version.to_string()))]),
        row(&[("Name", Value::from("DatabaseName")), ("Value", Value::from("shop"))]),
    ]
}

#[test]
fn test_initialize_brand_new_database() {
    let db = database_with(DatabaseSettings::default(), &["shop"]);
    db.engine().push_rows(vec![count_row(0)]);

    let report = db.initialize(&[]).unwrap();

    let shop = report.database("shop").unwrap();
    assert_eq!(shop.found, SchemaState::BrandNew);
    assert_eq!(shop.state, SchemaState::Ready);
    assert_eq!(shop.version_after, 1);
    // Book, Author, Archive; Audit lives in another database.
    assert_eq!(shop.tables_created, 3);

    let statements = db.engine().statements();
    assert!(statements.iter().any(|s| s.contains("CREATE TABLE \"tb_book\"")));
    assert!(!statements.iter().any(|s| s.contains("tb_audit")));
    assert!(statements.iter().any(|s| s.contains("CREATE TABLE \"tb_sys_info\"")));

    let events = db.engine().events();
    assert!(matches!(events.first(), Some(Event::Begin(_, IsolationLevel::Serializable))));
    assert!(matches!(events.last(), Some(Event::Commit(_))));
}

#[test]
fn test_initialize_brand_new_requires_version_one() {
    let settings = DatabaseSettings {
        version: 2,
        ..DatabaseSettings::default()
    };
    let db = database_with(settings, &["shop"]);
    db.engine().push_rows(vec![count_row(0)]);

    let err = db.initialize(&[]).unwrap_err();

    assert!(matches!(err, DatabaseError::TableCreateError { ref database, .. } if database == "shop"));
    assert!(matches!(db.engine().events().last(), Some(Event::Rollback(_))));
    assert!(!db.engine().statements().iter().any(|s| s.contains("CREATE TABLE")));
}

#[test]
fn test_initialize_applies_migrations_in_order() {
    let settings = DatabaseSettings {
        version: 3,
        ..DatabaseSettings::default()
    };
    let db = database_with(settings, &["shop"]);
    db.engine().push_rows(vec![count_row(1)]);
    db.engine().push_rows(system_rows(1));
    let migrations = vec![
        Migration::new("shop", 2, 3, "CREATE INDEX ix_two ON tb_book (AuthorId)").unwrap(),
        Migration::new("shop", 1, 2, "ALTER TABLE tb_book ADD COLUMN Isbn TEXT").unwrap(),
    ];

    let report = db.initialize(&migrations).unwrap();

    let shop = report.database("shop").unwrap();
    assert_eq!(shop.found, SchemaState::NeedsMigration);
    assert_eq!(shop.version_before, 1);
    assert_eq!(shop.version_after, 3);
    assert_eq!(shop.migrations_applied, 2);

    let statements = db.engine().statements();
    let first = statements.iter().position(|s| s.contains("ADD COLUMN Isbn")).unwrap();
    let second = statements.iter().position(|s| s.contains("ix_two")).unwrap();
    let version = statements
        .iter()
        .position(|s| s.starts_with("UPDATE \"tb_sys_info\""))
        .unwrap();
    assert!(first < second && second < version);
}

#[test]
fn test_initialize_incomplete_chain_applies_nothing() {
    let settings = DatabaseSettings {
        version: 4,
        ..DatabaseSettings::default()
    };
    let db = database_with(settings, &["shop"]);
    db.engine().push_rows(vec![count_row(1)]);
    db.engine().push_rows(system_rows(1));
    let migrations = vec![
        Migration::new("shop", 1, 2, "ALTER TABLE tb_book ADD COLUMN Isbn TEXT").unwrap(),
        Migration::new("shop", 3, 4, "DROP INDEX ix_two").unwrap(),
    ];

    let err = db.initialize(&migrations).unwrap_err();

    assert!(matches!(err, DatabaseError::MigrateError { ref database, .. } if database == "shop"));
    let statements = db.engine().statements();
    assert!(!statements.iter().any(|s| s.contains("Isbn") || s.contains("tb_sys_info\" SET")));
    assert!(matches!(db.engine().events().last(), Some(Event::Rollback(_))));
}

#[test]
fn test_initialize_up_to_date_and_newer_versions() {
    let db = database_with(DatabaseSettings::default(), &["shop"]);
    db.engine().push_rows(vec![count_row(1)]);
    db.engine().push_rows(system_rows(1));
    let report = db.initialize(&[]).unwrap();
    assert_eq!(report.database("shop").unwrap().found, SchemaState::UpToDate);

    let db = database_with(DatabaseSettings::default(), &["shop"]);
    db.engine().push_rows(vec![count_row(1)]);
    db.engine().push_rows(system_rows(5));
    let report = db.initialize(&[]).unwrap();
    let shop = report.database("shop").unwrap();
    assert_eq!(shop.found, SchemaState::UpToDate);
    assert_eq!(shop.version_after, 5);
    assert_eq!(db.engine().statements().len(), 2);
}

#[test]
fn test_initialize_names_database_when_system_table_read_fails() {
    let db = database_with(DatabaseSettings::default(), &["shop"]);
    db.engine().fail_next("database is locked");

    let err = db.initialize(&[]).unwrap_err();

    match &err {
        DatabaseError::MigrateError { database, source, .. } => {
            assert_eq!(database, "shop");
            assert!(matches!(source.as_deref(), Some(DatabaseError::Engine { .. })));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(db.engine().events().last(), Some(Event::Rollback(_))));
}

#[test]
fn test_initialize_names_database_when_commit_fails() {
    let db = database_with(DatabaseSettings::default(), &["shop"]);
    db.engine().push_rows(vec![count_row(0)]);
    db.engine().fail_next_commit("disk full");

    let err = db.initialize(&[]).unwrap_err();
    assert!(matches!(err, DatabaseError::TableCreateError { ref database, .. } if database == "shop"));

    let db = database_with(DatabaseSettings::default(), &["shop"]);
    db.engine().push_rows(vec![count_row(1)]);
    db.engine().push_rows(system_rows(1));
    db.engine().fail_next_commit("disk full");

    let err = db.initialize(&[]).unwrap_err();
    assert!(matches!(err, DatabaseError::MigrateError { ref database, .. } if database == "shop"));
}

#[test]
fn test_system_info_of_missing_table_is_version_zero() {
    let db = database();
    db.engine().push_rows(vec![count_row(0)]);
    let info = db.system_info("shop").unwrap();
    assert_eq!(info.version(), 0);
    assert_eq!(db.engine().statements().len(), 1);
}
