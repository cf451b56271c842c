//! # Engine Traits
//!
//! Traits implemented by SQL engines so the ORM can execute statements
//! without knowing which database sits behind them.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;

use crate::types::{Primitive, Row};

/// Result type for asynchronous engine operations.
pub type FutureResult<T> = BoxFuture<'static, Result<T>>;

/// SQL engines implement the [`Connection`] trait to execute statements.
///
/// Both methods take SQL text with positional `?` placeholders and an ordered
/// parameter list whose length matches the placeholder count. Errors raised by
/// the engine are returned unchanged to callers of the ORM.
pub trait Connection: Debug + Send + Sync + 'static {
    /// Execute a query and return the resulting rows.
    fn query(&self, sql: String, params: Vec<Primitive>) -> FutureResult<Vec<Row>>;

    /// Execute a statement that does not return rows (e.g., an `INSERT`,
    /// `UPDATE`, `DELETE` or DDL) and return the number of affected rows.
    fn exec(&self, sql: String, params: Vec<Primitive>) -> FutureResult<u64>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn query(&self, sql: String, params: Vec<Primitive>) -> FutureResult<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn exec(&self, sql: String, params: Vec<Primitive>) -> FutureResult<u64> {
        (**self).exec(sql, params)
    }
}

/// Implemented by engines that can be constructed from connection options.
pub trait Backend: Sized + Sync + Send {
    /// The options used to connect to the backend.
    type ConnectOptions: FromEnv;

    /// Connect using options loaded from the environment.
    #[must_use]
    fn connect() -> impl Future<Output = Result<Self>> {
        async { Self::connect_with(Self::ConnectOptions::from_env()?).await }
    }

    /// Connect with the specified options.
    fn connect_with(options: Self::ConnectOptions) -> impl Future<Output = Result<Self>>;
}

/// Trait for creating connection options from environment variables.
pub trait FromEnv: Sized {
    /// Create connection options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}
