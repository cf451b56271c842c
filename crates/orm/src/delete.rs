use anyhow::Result;
use arbor_sql::Primitive;
use sea_query::{Alias, Expr, SimpleExpr};

use crate::query::{Dialect, Statement, to_sea_value, values_to_primitives};

/// Builder for constructing DELETE statements.
pub struct DeleteBuilder {
    table: &'static str,
    filters: Vec<SimpleExpr>,
}

impl DeleteBuilder {
    /// Creates a new DELETE statement builder.
    #[must_use]
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    /// Adds a WHERE fragment with `?` placeholders.
    #[must_use]
    pub fn filter(mut self, sql: impl Into<String>, bindings: Vec<Primitive>) -> Self {
        let values: Vec<_> = bindings.iter().map(to_sea_value).collect();
        self.filters.push(Expr::cust_with_values(sql.into(), values));
        self
    }

    /// Build the DELETE statement.
    ///
    /// # Errors
    ///
    /// Returns an error if any query values cannot be converted to primitives.
    pub fn build(self) -> Result<Statement> {
        let mut statement = sea_query::Query::delete();
        statement.from_table(Alias::new(self.table));

        for filter in self.filters {
            statement.and_where(filter);
        }

        let (sql, values) = statement.build(Dialect::default());
        let params = values_to_primitives(values)?;

        tracing::debug!(
            table = self.table,
            sql = %sql,
            param_count = params.len(),
            "DeleteBuilder generated SQL"
        );

        Ok(Statement { sql, params })
    }
}
