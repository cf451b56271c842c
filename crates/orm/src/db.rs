use std::sync::Arc;

use anyhow::Result;
use arbor_sql::{Connection, Primitive, Row};

use crate::builder::QueryBuilder;
use crate::entity::Model;
use crate::query::Statement;
use crate::relation::Registry;
use crate::schema::Schema;
use crate::transaction::TxState;

/// Handle to a database: the engine connection plus the relation registry.
///
/// Cheap to clone; clones share the connection and transaction state.
#[derive(Debug, Clone)]
pub struct Db {
    conn: Arc<dyn Connection>,
    registry: Arc<Registry>,
    pub(crate) tx: Arc<TxState>,
}

impl Db {
    /// Wraps an engine connection.
    pub fn new(conn: impl Connection, registry: Registry) -> Self {
        Self {
            conn: Arc::new(conn),
            registry: Arc::new(registry),
            tx: Arc::default(),
        }
    }

    /// The relation registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a query over model `M`.
    #[must_use]
    pub fn query<M: Model>(&self) -> QueryBuilder {
        let schema = self.registry.schema(M::TABLE).unwrap_or_else(|| Arc::new(M::schema()));
        QueryBuilder::new(self.clone(), schema)
    }

    /// Starts a query over a table by name.
    ///
    /// Registered tables keep their capabilities; unknown tables get a bare schema.
    #[must_use]
    pub fn table(&self, table: &'static str) -> QueryBuilder {
        let schema = self.registry.schema(table).unwrap_or_else(|| Arc::new(Schema::new(table)));
        QueryBuilder::new(self.clone(), schema)
    }

    /// Runs a statement that returns no rows, such as DDL.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn execute(&self, sql: impl Into<String>, params: Vec<Primitive>) -> Result<u64> {
        self.settle().await;
        self.conn.exec(sql.into(), params).await
    }

    /// Runs a raw query.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn select(&self, sql: impl Into<String>, params: Vec<Primitive>) -> Result<Vec<Row>> {
        self.settle().await;
        self.conn.query(sql.into(), params).await
    }

    pub(crate) async fn fetch(&self, statement: Statement) -> Result<Vec<Row>> {
        self.settle().await;
        self.conn.query(statement.sql, statement.params).await
    }

    pub(crate) async fn run(&self, statement: Statement) -> Result<u64> {
        self.settle().await;
        self.conn.exec(statement.sql, statement.params).await
    }

    // Sends rollbacks left behind by transactions dropped mid-scope.
    async fn settle(&self) {
        for sql in self.tx.take_owed() {
            if let Err(e) = self.conn.exec(sql, Vec::new()).await {
                tracing::warn!(error = %e, "deferred rollback failed");
            }
        }
    }
}
