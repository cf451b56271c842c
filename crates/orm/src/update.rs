use anyhow::Result;
use arbor_sql::Primitive;
use sea_query::{Alias, Expr, SimpleExpr};

use crate::query::{Dialect, Statement, to_sea_value, values_to_primitives};

/// Builder for constructing UPDATE statements.
pub struct UpdateBuilder {
    table: &'static str,
    set_clauses: Vec<(String, Primitive)>,
    filters: Vec<SimpleExpr>,
}

impl UpdateBuilder {
    /// Creates a new UPDATE statement builder.
    #[must_use]
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            set_clauses: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Sets a column to a new value.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: Primitive) -> Self {
        self.set_clauses.push((column.into(), value));
        self
    }

    /// Adds a WHERE fragment with `?` placeholders.
    #[must_use]
    pub fn filter(mut self, sql: impl Into<String>, bindings: Vec<Primitive>) -> Self {
        let values: Vec<_> = bindings.iter().map(to_sea_value).collect();
        self.filters.push(Expr::cust_with_values(sql.into(), values));
        self
    }

    /// Build the UPDATE statement.
    ///
    /// # Errors
    ///
    /// Returns an error if query values cannot be converted to primitives.
    pub fn build(self) -> Result<Statement> {
        let mut statement = sea_query::Query::update();
        statement.table(Alias::new(self.table));

        for (column, value) in &self.set_clauses {
            statement.value(Alias::new(column), to_sea_value(value));
        }

        for expr in self.filters {
            statement.and_where(expr);
        }

        let (sql, values) = statement.build(Dialect::default());
        let params = values_to_primitives(values)?;

        tracing::debug!(
            table = self.table,
            sql = %sql,
            param_count = params.len(),
            "UpdateBuilder generated SQL"
        );

        Ok(Statement { sql, params })
    }
}
