//! The fluent SELECT builder and its terminal operations.

use std::sync::Arc;

use anyhow::Result;
use arbor_sql::{Primitive, Row};

use crate::condition::{Condition, Joiner, Operator, Subquery, where_clause};
use crate::db::Db;
use crate::error::NotFound;
use crate::join::Join;
use crate::loader;
use crate::paginate::Page;
use crate::query::Statement;
use crate::record::Record;
use crate::schema::Schema;
use crate::scope::Trashed;
use crate::value::{Value, encode};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    /// Column or raw expression.
    pub expression: String,
    /// Sort direction; ignored for raw expressions.
    pub direction: Direction,
    /// Whether `expression` is emitted verbatim.
    pub raw: bool,
}

impl OrderSpec {
    fn render(&self) -> String {
        if self.raw {
            return self.expression.clone();
        }
        let direction = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        format!("{} {direction}", self.expression)
    }
}

#[derive(Debug, Clone)]
enum Projection {
    Column(String),
    Raw { sql: String, bindings: Vec<Primitive> },
}

// Which clauses a compiled statement carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Full,
    Grouped,
    Aggregate,
}

/// Builder for SELECT queries over one model's table.
///
/// Every method consumes and returns the builder. Nothing touches the
/// database until a terminal operation (`fetch_all`, `count`, `paginate`,
/// ...) runs.
///
/// ```ignore
/// let products = db
///     .query::<Product>()
///     .r#where("active", true)
///     .where_in("category", ["A", "B"])
///     .where_between("price", 10, 50)
///     .order_by_desc("price")
///     .fetch_all()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    db: Db,
    schema: Arc<Schema>,
    projection: Vec<Projection>,
    joins: Vec<Join>,
    pub(crate) wheres: Vec<(Condition, Joiner)>,
    groups: Vec<String>,
    orders: Vec<OrderSpec>,
    limit: Option<u64>,
    offset: Option<u64>,
    includes: Vec<String>,
    pub(crate) trashed: Trashed,
    // name the table goes by inside an enclosing existence subquery
    reference: Option<String>,
}

impl QueryBuilder {
    /// Creates a builder over `schema`'s table.
    #[must_use]
    pub const fn new(db: Db, schema: Arc<Schema>) -> Self {
        Self {
            db,
            schema,
            projection: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            includes: Vec::new(),
            trashed: Trashed::Exclude,
            reference: None,
        }
    }

    /// The model being queried.
    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // --- Projection ---

    /// Adds columns to the select list.
    #[must_use]
    pub fn select<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.projection.extend(columns.into_iter().map(|c| Projection::Column(c.into())));
        self
    }

    /// Adds a raw select-list expression with its own bindings.
    #[must_use]
    pub fn select_raw<V: Into<Value>>(
        mut self, sql: impl Into<String>, bindings: impl IntoIterator<Item = V>,
    ) -> Self {
        self.projection.push(Projection::Raw {
            sql: sql.into(),
            bindings: bindings.into_iter().map(|v| encode(&v.into())).collect(),
        });
        self
    }

    /// Adds a JOIN clause to the query.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    // --- Conditions ---

    /// Appends a condition with the given connector.
    ///
    /// An empty group is dropped.
    #[must_use]
    pub fn push(mut self, condition: Condition, joiner: Joiner) -> Self {
        if matches!(&condition, Condition::Group(ledger) if ledger.is_empty()) {
            return self;
        }
        self.wheres.push((condition, joiner));
        self
    }

    /// `AND column = value`
    #[must_use]
    pub fn r#where(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Condition::eq(column, value), Joiner::And)
    }

    /// `OR column = value`
    #[must_use]
    pub fn or_where(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Condition::eq(column, value), Joiner::Or)
    }

    /// `AND column op value`
    #[must_use]
    pub fn where_op(self, column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.push(Condition::compare(column, op, value), Joiner::And)
    }

    /// `OR column op value`
    #[must_use]
    pub fn or_where_op(
        self, column: impl Into<String>, op: Operator, value: impl Into<Value>,
    ) -> Self {
        self.push(Condition::compare(column, op, value), Joiner::Or)
    }

    /// `AND column IN (values)`
    #[must_use]
    pub fn where_in<V: Into<Value>>(
        self, column: impl Into<String>, values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Condition::is_in(column, values), Joiner::And)
    }

    /// `OR column IN (values)`
    #[must_use]
    pub fn or_where_in<V: Into<Value>>(
        self, column: impl Into<String>, values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Condition::is_in(column, values), Joiner::Or)
    }

    /// `AND column NOT IN (values)`
    #[must_use]
    pub fn where_not_in<V: Into<Value>>(
        self, column: impl Into<String>, values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Condition::not_in(column, values), Joiner::And)
    }

    /// `OR column NOT IN (values)`
    #[must_use]
    pub fn or_where_not_in<V: Into<Value>>(
        self, column: impl Into<String>, values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Condition::not_in(column, values), Joiner::Or)
    }

    /// `AND column IS NULL`
    #[must_use]
    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push(Condition::null(column), Joiner::And)
    }

    /// `OR column IS NULL`
    #[must_use]
    pub fn or_where_null(self, column: impl Into<String>) -> Self {
        self.push(Condition::null(column), Joiner::Or)
    }

    /// `AND column IS NOT NULL`
    #[must_use]
    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push(Condition::not_null(column), Joiner::And)
    }

    /// `OR column IS NOT NULL`
    #[must_use]
    pub fn or_where_not_null(self, column: impl Into<String>) -> Self {
        self.push(Condition::not_null(column), Joiner::Or)
    }

    /// `AND column BETWEEN low AND high`
    #[must_use]
    pub fn where_between(
        self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        self.push(Condition::between(column, low, high), Joiner::And)
    }

    /// `OR column BETWEEN low AND high`
    #[must_use]
    pub fn or_where_between(
        self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        self.push(Condition::between(column, low, high), Joiner::Or)
    }

    /// `AND column NOT BETWEEN low AND high`
    #[must_use]
    pub fn where_not_between(
        self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        self.push(Condition::not_between(column, low, high), Joiner::And)
    }

    /// `OR column NOT BETWEEN low AND high`
    #[must_use]
    pub fn or_where_not_between(
        self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        self.push(Condition::not_between(column, low, high), Joiner::Or)
    }

    /// `AND (raw sql)`; placeholders must match `bindings`.
    #[must_use]
    pub fn where_raw<V: Into<Value>>(
        self, sql: impl Into<String>, bindings: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Condition::raw(sql, bindings), Joiner::And)
    }

    /// `OR (raw sql)`
    #[must_use]
    pub fn or_where_raw<V: Into<Value>>(
        self, sql: impl Into<String>, bindings: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Condition::raw(sql, bindings), Joiner::Or)
    }

    /// `AND ( ... )` built by `group` on a fresh builder.
    #[must_use]
    pub fn where_group(self, group: impl FnOnce(Self) -> Self) -> Self {
        let condition = self.group(group);
        self.push(condition, Joiner::And)
    }

    /// `OR ( ... )`
    #[must_use]
    pub fn or_where_group(self, group: impl FnOnce(Self) -> Self) -> Self {
        let condition = self.group(group);
        self.push(condition, Joiner::Or)
    }

    fn group(&self, group: impl FnOnce(Self) -> Self) -> Condition {
        let mut inner = Self::new(self.db.clone(), Arc::clone(&self.schema));
        inner.reference.clone_from(&self.reference);
        Condition::Group(group(inner).wheres)
    }

    // --- Relationship existence ---

    /// Keeps rows with at least one related row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] if `relation` is not registered.
    pub fn has(self, relation: &str) -> Result<Self> {
        self.where_has(relation, |q| q)
    }

    /// Keeps rows with no related rows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] if `relation` is not registered.
    pub fn doesnt_have(self, relation: &str) -> Result<Self> {
        self.where_doesnt_have(relation, |q| q)
    }

    /// Keeps rows with at least one related row matching `constrain`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] if `relation` is not registered.
    pub fn where_has(self, relation: &str, constrain: impl FnOnce(Self) -> Self) -> Result<Self> {
        let subquery = self.subquery(relation, constrain)?;
        Ok(self.push(Condition::Exists { subquery, negated: false }, Joiner::And))
    }

    /// Keeps rows with no related row matching `constrain`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] if `relation` is not registered.
    pub fn where_doesnt_have(
        self, relation: &str, constrain: impl FnOnce(Self) -> Self,
    ) -> Result<Self> {
        let subquery = self.subquery(relation, constrain)?;
        Ok(self.push(Condition::Exists { subquery, negated: true }, Joiner::And))
    }

    /// Keeps rows whose related row count satisfies `op count`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] if `relation` is not registered.
    pub fn has_count(self, relation: &str, op: Operator, count: i64) -> Result<Self> {
        self.where_has_count(relation, op, count, |q| q)
    }

    /// As [`QueryBuilder::has_count`], counting only rows matching `constrain`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] if `relation` is not registered.
    pub fn where_has_count(
        self, relation: &str, op: Operator, count: i64, constrain: impl FnOnce(Self) -> Self,
    ) -> Result<Self> {
        let subquery = self.subquery(relation, constrain)?;
        Ok(self.push(Condition::Count { subquery, op, count }, Joiner::And))
    }

    fn subquery(&self, name: &str, constrain: impl FnOnce(Self) -> Self) -> Result<Box<Subquery>> {
        let relation = self.db.registry().resolve(self.schema.table, name)?.clone();
        let owner = self.reference.clone().unwrap_or_else(|| self.schema.table.to_string());
        // a related table named like its owner would hide the outer row
        let alias = (relation.related.table == owner).then(|| format!("related_{owner}"));

        let mut inner = Self::new(self.db.clone(), Arc::clone(&relation.related));
        inner.reference.clone_from(&alias);
        let inner = constrain(inner);
        Ok(Box::new(Subquery {
            relation,
            owner,
            alias,
            wheres: inner.wheres,
            trashed: inner.trashed,
        }))
    }

    // --- Grouping, ordering and paging ---

    /// Adds GROUP BY columns.
    #[must_use]
    pub fn group_by<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds a raw GROUP BY expression.
    #[must_use]
    pub fn group_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.groups.push(sql.into());
        self
    }

    /// Adds an ORDER BY clause.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(OrderSpec {
            expression: column.into(),
            direction,
            raw: false,
        });
        self
    }

    /// Adds ascending ORDER BY clause.
    #[must_use]
    pub fn order_by_asc(self, column: impl Into<String>) -> Self {
        self.order_by(column, Direction::Asc)
    }

    /// Adds descending ORDER BY clause.
    #[must_use]
    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Adds a raw ORDER BY expression.
    #[must_use]
    pub fn order_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.orders.push(OrderSpec {
            expression: sql.into(),
            direction: Direction::Asc,
            raw: true,
        });
        self
    }

    /// Sets the maximum number of rows to return.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Alias for [`QueryBuilder::limit`].
    #[must_use]
    pub const fn take(self, count: u64) -> Self {
        self.limit(count)
    }

    /// Alias for [`QueryBuilder::offset`].
    #[must_use]
    pub const fn skip(self, count: u64) -> Self {
        self.offset(count)
    }

    // --- Relations to eager load ---

    /// Eager-loads a relation (dotted paths load nested relations).
    #[must_use]
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.includes.push(relation.into());
        self
    }

    /// Eager-loads several relations.
    #[must_use]
    pub fn with_relations<R: Into<String>>(mut self, relations: impl IntoIterator<Item = R>) -> Self {
        self.includes.extend(relations.into_iter().map(Into::into));
        self
    }

    // --- Soft-delete visibility; last call wins ---

    /// Shows soft-deleted rows alongside live ones.
    #[must_use]
    pub const fn with_trashed(mut self) -> Self {
        self.trashed = Trashed::Include;
        self
    }

    /// Alias for [`QueryBuilder::with_trashed`].
    #[must_use]
    pub const fn include_trashed(self) -> Self {
        self.with_trashed()
    }

    /// Shows only soft-deleted rows.
    #[must_use]
    pub const fn only_trashed(mut self) -> Self {
        self.trashed = Trashed::Only;
        self
    }

    /// Hides soft-deleted rows (the default).
    #[must_use]
    pub const fn without_trashed(mut self) -> Self {
        self.trashed = Trashed::Exclude;
        self
    }

    // --- Compilation ---

    /// Compiles the query.
    #[must_use]
    pub fn compile(&self) -> Statement {
        self.render(None, Shape::Full)
    }

    /// SQL text of the compiled query.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.compile().sql
    }

    /// Bindings of the compiled query, in placeholder order.
    #[must_use]
    pub fn get_bindings(&self) -> Vec<Primitive> {
        self.compile().params
    }

    fn render(&self, projection: Option<&str>, shape: Shape) -> Statement {
        let table = self.schema.table;
        let mut params = Vec::new();

        let select_list = projection.map_or_else(|| self.render_projection(&mut params), str::to_string);
        let mut sql = format!("SELECT {select_list} FROM {table}");

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render());
        }

        if let Some((clause, bindings)) = self.filter() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
            params.extend(bindings);
        }

        if shape != Shape::Aggregate && !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if shape == Shape::Full {
            if !self.orders.is_empty() {
                let orders: Vec<String> = self.orders.iter().map(OrderSpec::render).collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&orders.join(", "));
            }
            // the engine reads LIMIT and OFFSET as signed 64-bit
            let clamp = |n: u64| n.min(i64::MAX.unsigned_abs());
            match (self.limit.map(clamp), self.offset.map(clamp)) {
                (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
                (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
                // engine requires LIMIT before OFFSET
                (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                (None, None) => {}
            }
        }

        Statement { sql, params }
    }

    fn render_projection(&self, params: &mut Vec<Primitive>) -> String {
        if self.projection.is_empty() {
            return "*".to_string();
        }
        let parts: Vec<&str> = self
            .projection
            .iter()
            .map(|projection| match projection {
                Projection::Column(column) => column.as_str(),
                Projection::Raw { sql, bindings } => {
                    params.extend(bindings.iter().cloned());
                    sql.as_str()
                }
            })
            .collect();
        parts.join(", ")
    }

    /// The WHERE body: the caller's conditions, then the soft-delete scope.
    pub(crate) fn filter(&self) -> Option<(String, Vec<Primitive>)> {
        where_clause(&[], &self.wheres, &self.schema.scope(self.trashed))
    }

    pub(crate) const fn db(&self) -> &Db {
        &self.db
    }

    // --- Terminal operations ---

    pub(crate) async fn fetch_rows(&self) -> Result<Vec<Row>> {
        let statement = self.compile();
        tracing::debug!(
            table = self.schema.table,
            sql = %statement.sql,
            param_count = statement.params.len(),
            "QueryBuilder generated SQL"
        );
        self.db.fetch(statement).await
    }

    /// Runs the query, hydrating records and eager-loading includes.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged, or an error from loading a relation.
    pub async fn fetch_all(&self) -> Result<Vec<Record>> {
        let rows = self.fetch_rows().await?;
        let mut records: Vec<Record> =
            rows.into_iter().map(|row| Record::hydrate(Arc::clone(&self.schema), row)).collect();
        for include in &self.includes {
            loader::eager_load(&self.db, &mut records, include).await?;
        }
        Ok(records)
    }

    /// First matching record.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn fetch_one(&self) -> Result<Option<Record>> {
        let records = self.clone().limit(1).fetch_all().await?;
        Ok(records.into_iter().next())
    }

    /// First matching record, or [`NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`NotFound`] when nothing matches.
    pub async fn first_or_fail(&self) -> Result<Record> {
        self.fetch_one().await?.ok_or_else(|| {
            NotFound {
                table: self.schema.table.to_string(),
            }
            .into()
        })
    }

    /// The record with primary key `id`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Record>> {
        let key = format!("{}.{}", self.schema.table, self.schema.primary_key);
        self.clone().r#where(key, id).fetch_one().await
    }

    /// One column from every matching row.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn pluck(&self, column: &str) -> Result<Vec<Primitive>> {
        let statement = self.render(Some(column), Shape::Full);
        let rows = self.db.fetch(statement).await?;
        Ok(rows.into_iter().filter_map(|row| row.fields.into_iter().next().map(|f| f.value)).collect())
    }

    /// Number of matching rows. ORDER BY, LIMIT and OFFSET are ignored.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn count(&self) -> Result<u64> {
        let statement = if self.groups.is_empty() {
            self.render(Some("COUNT(*) AS aggregate"), Shape::Aggregate)
        } else {
            let inner = self.render(None, Shape::Grouped);
            Statement {
                sql: format!("SELECT COUNT(*) AS aggregate FROM ({}) AS aggregate_table", inner.sql),
                params: inner.params,
            }
        };
        let count = self.scalar(statement).await?.and_then(|v| v.as_i64()).unwrap_or_default();
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Whether any row matches.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// `SUM(column)`, or `None` over no rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn sum(&self, column: &str) -> Result<Option<Primitive>> {
        self.aggregate("SUM", column).await
    }

    /// `AVG(column)`, or `None` over no rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn avg(&self, column: &str) -> Result<Option<Primitive>> {
        self.aggregate("AVG", column).await
    }

    /// `MIN(column)`, or `None` over no rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn min(&self, column: &str) -> Result<Option<Primitive>> {
        self.aggregate("MIN", column).await
    }

    /// `MAX(column)`, or `None` over no rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn max(&self, column: &str) -> Result<Option<Primitive>> {
        self.aggregate("MAX", column).await
    }

    async fn aggregate(&self, function: &str, column: &str) -> Result<Option<Primitive>> {
        let projection = format!("{function}({column}) AS aggregate");
        self.scalar(self.render(Some(&projection), Shape::Aggregate)).await
    }

    async fn scalar(&self, statement: Statement) -> Result<Option<Primitive>> {
        tracing::debug!(
            table = self.schema.table,
            sql = %statement.sql,
            param_count = statement.params.len(),
            "QueryBuilder generated SQL"
        );
        let rows = self.db.fetch(statement).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.fields.into_iter().next())
            .map(|field| field.value)
            .filter(|value| !value.is_null()))
    }

    /// One page of results plus totals.
    ///
    /// `page` and `per_page` below 1 are treated as 1. The total comes from
    /// an independent count; the page itself reuses this query with the
    /// computed LIMIT and OFFSET. A page past the last one is empty and
    /// skips the fetch.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn paginate(&self, page: u64, per_page: u64) -> Result<Page<Record>> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = self.count().await?;
        let offset = (page - 1).saturating_mul(per_page);
        let data = if offset < total {
            self.clone().limit(per_page).offset(offset).fetch_all().await?
        } else {
            Vec::new()
        };
        Ok(Page::new(data, total, page, per_page))
    }
}
