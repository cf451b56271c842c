//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use arbor_orm::{
    Capability, Connection, Db, Model, Primitive, Record, Registry, Relation, Row, Rule,
    SqliteEngine, ValidationErrors, Validator, Value, entity,
};
use arbor_sql::FutureResult;

// Common test entities used across multiple test files

entity! {
    table = "users",
    capabilities = [Capability::timestamps()],
    #[derive(Debug, Clone, PartialEq)]
    pub struct User {
        pub id: Option<i64>,
        pub name: String,
        pub email: Option<String>,
        pub active: bool,
    }
}

entity! {
    table = "posts",
    capabilities = [Capability::timestamps(), Capability::soft_deletes()],
    #[derive(Debug, Clone, PartialEq)]
    pub struct Post {
        pub id: Option<i64>,
        pub user_id: Option<i64>,
        pub title: String,
        pub published: bool,
    }
}

entity! {
    table = "comments",
    #[derive(Debug, Clone)]
    pub struct Comment {
        pub id: Option<i64>,
        pub post_id: i64,
        pub body: String,
    }
}

entity! {
    table = "profiles",
    #[derive(Debug, Clone)]
    pub struct Profile {
        pub id: Option<i64>,
        pub user_id: i64,
        pub bio: String,
    }
}

entity! {
    table = "roles",
    #[derive(Debug, Clone)]
    pub struct Role {
        pub id: Option<i64>,
        pub name: String,
    }
}

entity! {
    table = "products",
    primary_key = "sku",
    #[derive(Debug, Clone)]
    pub struct Product {
        pub sku: String,
        pub name: String,
        pub category: String,
        pub price: f64,
        pub active: bool,
    }
}

entity! {
    table = "nodes",
    capabilities = [Capability::soft_deletes()],
    #[derive(Debug, Clone)]
    pub struct Node {
        pub id: Option<i64>,
        pub parent_id: Option<i64>,
        pub name: String,
    }
}

/// Hand-written model with validation and an attribute transform.
#[derive(Debug)]
pub struct Member;

impl Model for Member {
    const TABLE: &'static str = "members";

    fn validate(record: &Record) -> ValidationErrors {
        let mut errors = Validator::new()
            .rule("name", Rule::Required)
            .rule("name", Rule::length(Some(2), Some(40)))
            .validate(record);
        if let Ok(rule) = Rule::range(Some(18.0), None) {
            errors.merge(Validator::new().rule("age", rule).validate(record));
        }
        errors
    }

    fn transform(column: &str, value: Value) -> Value {
        match (column, value) {
            ("email", Value::Text(email)) => Value::Text(email.trim().to_lowercase()),
            (_, value) => value,
        }
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT UNIQUE,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT,
        updated_at TEXT
    )",
    "CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        user_id INTEGER,
        title TEXT NOT NULL,
        published INTEGER NOT NULL DEFAULT 0,
        views INTEGER NOT NULL DEFAULT 0,
        created_at TEXT,
        updated_at TEXT,
        deleted_at TEXT
    )",
    "CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL, body TEXT NOT NULL)",
    "CREATE TABLE profiles (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, bio TEXT NOT NULL)",
    "CREATE TABLE roles (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE role_user (user_id INTEGER NOT NULL, role_id INTEGER NOT NULL)",
    "CREATE TABLE products (
        sku TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        price REAL NOT NULL,
        active INTEGER NOT NULL
    )",
    "CREATE TABLE nodes (
        id INTEGER PRIMARY KEY,
        parent_id INTEGER,
        name TEXT NOT NULL,
        deleted_at TEXT
    )",
    "CREATE TABLE members (
        id INTEGER PRIMARY KEY,
        name TEXT,
        email TEXT,
        age INTEGER
    )",
];

/// Relationships used by the integration tests.
pub fn registry() -> Registry {
    Registry::new()
        .model::<Member>()
        .model::<Product>()
        .relation::<User>("posts", Relation::has_many::<Post>("user_id", "id"))
        .relation::<User>("profile", Relation::has_one::<Profile>("user_id", "id"))
        .relation::<User>("roles", Relation::belongs_to_many::<Role>("role_user", "user_id", "role_id"))
        .relation::<Post>("author", Relation::belongs_to::<User>("user_id", "id"))
        .relation::<Post>("comments", Relation::has_many::<Comment>("post_id", "id"))
        .relation::<Node>("children", Relation::has_many::<Node>("parent_id", "id"))
        .relation::<Node>("parent", Relation::belongs_to::<Node>("parent_id", "id"))
}

/// Every statement sent to the engine, in order.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, sql: &str) {
        self.0.lock().unwrap().push(sql.to_string());
    }

    /// Forgets everything logged so far.
    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Logged SELECT statements.
    pub fn selects(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().filter(|sql| sql.starts_with("SELECT")).cloned().collect()
    }

    /// Every logged statement.
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Engine wrapper that records the SQL it is given.
#[derive(Debug)]
pub struct LoggingConnection {
    inner: SqliteEngine,
    log: Log,
}

impl Connection for LoggingConnection {
    fn query(&self, sql: String, params: Vec<Primitive>) -> FutureResult<Vec<Row>> {
        self.log.push(&sql);
        self.inner.query(sql, params)
    }

    fn exec(&self, sql: String, params: Vec<Primitive>) -> FutureResult<u64> {
        self.log.push(&sql);
        self.inner.exec(sql, params)
    }
}

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh in-memory database with the test tables, plus its statement log.
pub async fn setup() -> (Db, Log) {
    init_tracing();
    let log = Log::default();
    let conn = LoggingConnection {
        inner: SqliteEngine::in_memory().unwrap(),
        log: log.clone(),
    };
    let db = Db::new(conn, registry());
    for ddl in SCHEMA {
        db.execute(*ddl, Vec::new()).await.unwrap();
    }
    log.clear();
    (db, log)
}

/// A database handle for tests that only compile SQL.
pub fn offline() -> Db {
    Db::new(SqliteEngine::in_memory().unwrap(), registry())
}

/// Inserts a user and returns its id.
pub async fn user(db: &Db, name: &str) -> i64 {
    let mut record = Record::of::<User>();
    record.set("name", name);
    record.set("email", format!("{}@example.com", name.to_lowercase()));
    db.save(&mut record).await.unwrap();
    record.get_as("id").unwrap()
}

/// Inserts a post and returns its id.
pub async fn post(db: &Db, user_id: Option<i64>, title: &str, published: bool) -> i64 {
    let mut record = Record::of::<Post>();
    record.set("user_id", user_id);
    record.set("title", title);
    record.set("published", published);
    db.save(&mut record).await.unwrap();
    record.get_as("id").unwrap()
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' if !in_single_quote => {
                // Strip identifier quoting to avoid brittle comparisons.
            }
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
///
/// Strips identifier quotes, normalizes whitespace, and checks that
/// fragments appear sequentially in the generated SQL.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            panic!(
                "expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`"
            );
        }
    }
}
