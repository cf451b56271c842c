//! Default `SQLite` engine
//!
//! This is a lightweight implementation for development and tests.

#![allow(clippy::significant_drop_tightening)]

use std::sync::Arc;

use anyhow::{Context, Result};
use fromenv::FromEnv;
use futures::FutureExt;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection as SqliteConnection, params_from_iter};
use tracing::instrument;

use crate::connection::{Backend, Connection, FutureResult};
use crate::types::{Field, Primitive, Row};

/// Options used to connect to the SQL database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Path or URI of the database file.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,
}

impl crate::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// `SQLite` implementation of [`Connection`].
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Arc<parking_lot::Mutex<SqliteConnection>>,
}

impl SqliteEngine {
    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn in_memory() -> Result<Self> {
        let conn = SqliteConnection::open_in_memory().context("failed to open SQLite database")?;
        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }
}

impl Backend for SqliteEngine {
    type ConnectOptions = ConnectOptions;

    #[instrument]
    async fn connect_with(options: Self::ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn = SqliteConnection::open(&options.database)
            .context("failed to open SQLite database")?;

        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }
}

impl Connection for SqliteEngine {
    fn query(&self, sql: String, params: Vec<Primitive>) -> FutureResult<Vec<Row>> {
        tracing::debug!(sql = %sql, param_count = params.len(), "executing query");
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql).context("failed to prepare statement")?;

            let column_names: Vec<String> =
                stmt.column_names().iter().map(ToString::to_string).collect();

            let values: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
            let mut rows =
                stmt.query(params_from_iter(values.iter())).context("failed to execute query")?;

            let mut result = Vec::new();
            while let Some(row) = rows.next().context("failed to fetch row")? {
                let mut fields = Vec::with_capacity(column_names.len());
                for (i, name) in column_names.iter().enumerate() {
                    let value = row.get_ref(i).context("failed to get column value")?;
                    fields.push(Field {
                        name: name.clone(),
                        value: from_sqlite_value(value)?,
                    });
                }
                result.push(Row { fields });
            }

            Ok(result)
        }
        .boxed()
    }

    fn exec(&self, sql: String, params: Vec<Primitive>) -> FutureResult<u64> {
        tracing::debug!(sql = %sql, param_count = params.len(), "executing statement");
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql).context("failed to prepare statement")?;

            let values: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
            let affected = stmt
                .execute(params_from_iter(values.iter()))
                .context("failed to execute statement")?;

            Ok(affected as u64)
        }
        .boxed()
    }
}

fn to_sqlite_value(value: &Primitive) -> SqliteValue {
    match value {
        Primitive::Null => SqliteValue::Null,
        Primitive::Integer(v) => SqliteValue::Integer(*v),
        Primitive::Real(v) => SqliteValue::Real(*v),
        Primitive::Text(v) => SqliteValue::Text(v.clone()),
        Primitive::Blob(v) => SqliteValue::Blob(v.clone()),
    }
}

fn from_sqlite_value(value: ValueRef) -> Result<Primitive> {
    match value {
        ValueRef::Null => Ok(Primitive::Null),
        ValueRef::Integer(v) => Ok(Primitive::Integer(v)),
        ValueRef::Real(v) => Ok(Primitive::Real(v)),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(Primitive::Text(s.to_string()))
        }
        ValueRef::Blob(b) => Ok(Primitive::Blob(b.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_operations() {
        let engine = SqliteEngine::connect_with(ConnectOptions {
            database: ":memory:".to_string(),
        })
        .await
        .expect("connect");

        let affected = engine
            .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)".to_string(), vec![])
            .await
            .expect("create table");
        assert_eq!(affected, 0);

        let affected = engine
            .exec(
                "INSERT INTO users (name, age) VALUES (?, ?)".to_string(),
                vec![Primitive::from("Alice"), Primitive::Integer(30)],
            )
            .await
            .expect("insert");
        assert_eq!(affected, 1);

        engine
            .exec(
                "INSERT INTO users (name, age) VALUES (?, ?)".to_string(),
                vec![Primitive::from("Bob"), Primitive::Null],
            )
            .await
            .expect("insert");

        let rows = engine
            .query("SELECT id, name, age FROM users ORDER BY name".to_string(), vec![])
            .await
            .expect("query");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields[1].name, "name");
        assert_eq!(rows[0].get("name"), Some(&Primitive::Text("Alice".to_string())));
        assert_eq!(rows[1].get("age"), Some(&Primitive::Null));
    }

    #[tokio::test]
    async fn engine_errors_surface() {
        let engine = SqliteEngine::in_memory().expect("open");
        let err = engine.query("SELECT * FROM missing".to_string(), vec![]).await.unwrap_err();
        assert!(err.to_string().contains("failed to prepare statement"));
    }
}
