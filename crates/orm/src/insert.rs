use anyhow::{Result, bail};
use arbor_sql::Primitive;
use indexmap::IndexSet;
use sea_query::{Alias, OnConflict, SimpleExpr};

use crate::query::{Dialect, Statement, to_sea_value, values_to_primitives};

/// Builder for constructing INSERT statements.
///
/// The column list is the union of every row's columns in first-seen order;
/// a row missing one of them binds `NULL` there.
pub struct InsertBuilder {
    table: &'static str,
    rows: Vec<Vec<(String, Primitive)>>,
    conflict: Option<ConflictStrategy>,
    returning: bool,
}

enum ConflictStrategy {
    DoNothing { target: Vec<String> },
    DoUpdate { target: Vec<String>, columns: Vec<String> },
}

impl InsertBuilder {
    /// Creates a new INSERT statement builder.
    #[must_use]
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            rows: Vec::new(),
            conflict: None,
            returning: false,
        }
    }

    /// Adds a row of `(column, value)` pairs.
    #[must_use]
    pub fn row<C: Into<String>>(mut self, values: impl IntoIterator<Item = (C, Primitive)>) -> Self {
        self.rows.push(values.into_iter().map(|(column, value)| (column.into(), value)).collect());
        self
    }

    /// Handle conflicts on specified columns. Call ``do_update()`` or ``do_nothing()`` after.
    #[must_use]
    pub fn on_conflict<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.conflict = Some(ConflictStrategy::DoNothing {
            target: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// On conflict, do nothing (ignore the insert)
    #[must_use]
    pub fn do_nothing(mut self) -> Self {
        if let Some(ConflictStrategy::DoUpdate { target, .. }) = self.conflict.take() {
            self.conflict = Some(ConflictStrategy::DoNothing { target });
        }
        self
    }

    /// On conflict, update the specified columns with excluded (new) values
    #[must_use]
    pub fn do_update<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        if let Some(conflict) = self.conflict.take() {
            let target = match conflict {
                ConflictStrategy::DoNothing { target }
                | ConflictStrategy::DoUpdate { target, .. } => target,
            };
            self.conflict = Some(ConflictStrategy::DoUpdate {
                target,
                columns: columns.into_iter().map(Into::into).collect(),
            });
        }
        self
    }

    /// Return every column of the inserted rows.
    #[must_use]
    pub const fn returning_all(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Build the INSERT statement.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no rows or values cannot be converted to primitives.
    pub fn build(self) -> Result<Statement> {
        if self.rows.is_empty() {
            bail!("insert into `{}` has no rows", self.table);
        }
        let columns: IndexSet<&str> =
            self.rows.iter().flatten().map(|(column, _)| column.as_str()).collect();

        let mut statement = sea_query::Query::insert();
        statement.into_table(Alias::new(self.table));

        if columns.is_empty() {
            statement.or_default_values();
        } else {
            statement.columns(columns.iter().copied().map(Alias::new));
            for row in &self.rows {
                let values: Vec<SimpleExpr> = columns
                    .iter()
                    .map(|column| {
                        let value = row.iter().find(|(c, _)| c == column).map(|(_, v)| v);
                        SimpleExpr::Value(to_sea_value(value.unwrap_or(&Primitive::Null)))
                    })
                    .collect();
                statement.values_panic(values);
            }
        }

        // Handle ON CONFLICT clause
        if let Some(conflict) = self.conflict {
            let on_conflict = match conflict {
                ConflictStrategy::DoNothing { target } => {
                    OnConflict::columns(target.into_iter().map(Alias::new)).do_nothing().to_owned()
                }
                ConflictStrategy::DoUpdate { target, columns } => {
                    OnConflict::columns(target.into_iter().map(Alias::new))
                        .update_columns(columns.into_iter().map(Alias::new))
                        .to_owned()
                }
            };

            statement.on_conflict(on_conflict);
        }

        if self.returning {
            statement.returning_all();
        }

        let (sql, values) = statement.build(Dialect::default());
        let params = values_to_primitives(values)?;

        tracing::debug!(
            table = self.table,
            sql = %sql,
            param_count = params.len(),
            "InsertBuilder generated SQL"
        );

        Ok(Statement { sql, params })
    }
}
