//! WHERE predicates and their rendering.

use arbor_sql::Primitive;

use crate::relation::Relation;
use crate::scope::Trashed;
use crate::value::{Value, encode};

/// How a condition attaches to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl Joiner {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
}

impl Operator {
    /// SQL spelling of the operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

/// A single predicate.
///
/// Each variant renders to a SQL fragment with `?` placeholders and yields
/// exactly as many bindings as it has placeholders, in textual order.
/// Values are encoded when the condition is built.
#[derive(Debug, Clone)]
pub enum Condition {
    /// column op value
    Compare { column: String, op: Operator, value: Primitive },
    /// column [NOT] IN (values)
    In { column: String, values: Vec<Primitive>, negated: bool },
    /// column IS [NOT] NULL
    Null { column: String, negated: bool },
    /// column [NOT] BETWEEN low AND high
    Between { column: String, low: Primitive, high: Primitive, negated: bool },
    /// Caller-supplied SQL with its own bindings
    Raw { sql: String, bindings: Vec<Primitive> },
    /// [NOT] EXISTS over a related table
    Exists { subquery: Box<Subquery>, negated: bool },
    /// related row count compared to a threshold
    Count { subquery: Box<Subquery>, op: Operator, count: i64 },
    /// Parenthesized group of conditions
    Group(Vec<(Self, Joiner)>),
}

impl Condition {
    /// `column op value`
    pub fn compare(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: encode(&value.into()),
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    /// `column != value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Ne, value)
    }

    /// `column LIKE pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, Operator::Like, pattern.into())
    }

    /// `column IN (values)`
    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>, values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(|v| encode(&v.into())).collect(),
            negated: false,
        }
    }

    /// `column NOT IN (values)`
    pub fn not_in<V: Into<Value>>(
        column: impl Into<String>, values: impl IntoIterator<Item = V>,
    ) -> Self {
        match Self::is_in(column, values) {
            Self::In { column, values, .. } => Self::In {
                column,
                values,
                negated: true,
            },
            other => other,
        }
    }

    /// `column IS NULL`
    pub fn null(column: impl Into<String>) -> Self {
        Self::Null {
            column: column.into(),
            negated: false,
        }
    }

    /// `column IS NOT NULL`
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::Null {
            column: column.into(),
            negated: true,
        }
    }

    /// `column BETWEEN low AND high`
    pub fn between(
        column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        Self::Between {
            column: column.into(),
            low: encode(&low.into()),
            high: encode(&high.into()),
            negated: false,
        }
    }

    /// `column NOT BETWEEN low AND high`
    pub fn not_between(
        column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>,
    ) -> Self {
        Self::Between {
            column: column.into(),
            low: encode(&low.into()),
            high: encode(&high.into()),
            negated: true,
        }
    }

    /// Raw SQL. Its `?` placeholders must match `bindings`.
    pub fn raw<V: Into<Value>>(sql: impl Into<String>, bindings: impl IntoIterator<Item = V>) -> Self {
        Self::Raw {
            sql: sql.into(),
            bindings: bindings.into_iter().map(|v| encode(&v.into())).collect(),
        }
    }

    /// SQL fragment with `?` placeholders.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Compare { column, op, .. } => format!("{column} {} ?", op.as_sql()),
            Self::In {
                column,
                values,
                negated,
            } => {
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("{column} {}IN ({placeholders})", not(*negated))
            }
            Self::Null { column, negated } => {
                format!("{column} IS {}NULL", not(*negated))
            }
            Self::Between { column, negated, .. } => {
                format!("{column} {}BETWEEN ? AND ?", not(*negated))
            }
            Self::Raw { sql, .. } => sql.clone(),
            Self::Exists { subquery, negated } => {
                format!("{}EXISTS ({})", not(*negated), subquery.compile("*").0)
            }
            Self::Count { subquery, op, .. } => {
                format!("({}) {} ?", subquery.compile("COUNT(*)").0, op.as_sql())
            }
            Self::Group(ledger) => format!("({})", render_ledger(ledger).0),
        }
    }

    /// Bindings for [`Condition::render`]'s placeholders, in order.
    #[must_use]
    pub fn bindings(&self) -> Vec<Primitive> {
        match self {
            Self::Compare { value, .. } => vec![value.clone()],
            Self::In { values, .. } => values.clone(),
            Self::Null { .. } => Vec::new(),
            Self::Between { low, high, .. } => vec![low.clone(), high.clone()],
            Self::Raw { bindings, .. } => bindings.clone(),
            Self::Exists { subquery, .. } => subquery.compile("*").1,
            Self::Count { subquery, count, .. } => {
                let mut bindings = subquery.compile("COUNT(*)").1;
                bindings.push(Primitive::Integer(*count));
                bindings
            }
            Self::Group(ledger) => render_ledger(ledger).1,
        }
    }
}

const fn not(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

/// A correlated query over a relation's related table.
#[derive(Debug, Clone)]
pub struct Subquery {
    pub(crate) relation: Relation,
    // name of the outer row's table where the subquery is placed
    pub(crate) owner: String,
    // set when the related table would otherwise shadow the owner
    pub(crate) alias: Option<String>,
    pub(crate) wheres: Vec<(Condition, Joiner)>,
    pub(crate) trashed: Trashed,
}

impl Subquery {
    fn compile(&self, projection: &str) -> (String, Vec<Primitive>) {
        let related = &self.relation.related;
        let mut sql = format!("SELECT {projection} FROM {}", related.table);
        let reference = match &self.alias {
            Some(alias) => {
                sql.push_str(" AS ");
                sql.push_str(alias);
                alias.as_str()
            }
            None => related.table,
        };

        let (join, correlation) = self.relation.correlation(&self.owner, reference);
        if let Some(join) = join {
            sql.push(' ');
            sql.push_str(&join.render());
        }

        let leading = [Condition::Raw {
            sql: correlation,
            bindings: Vec::new(),
        }];
        let scope = related.scope_as(reference, self.trashed);
        let mut bindings = Vec::new();
        if let Some((clause, params)) = where_clause(&leading, &self.wheres, &scope) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
            bindings = params;
        }
        (sql, bindings)
    }
}

/// Renders conditions joined by their connectors. The first connector is dropped.
pub(crate) fn render_ledger(ledger: &[(Condition, Joiner)]) -> (String, Vec<Primitive>) {
    let mut sql = String::new();
    let mut bindings = Vec::new();
    for (i, (condition, joiner)) in ledger.iter().enumerate() {
        if i > 0 {
            sql.push(' ');
            sql.push_str(joiner.as_sql());
            sql.push(' ');
        }
        sql.push_str(&condition.render());
        bindings.extend(condition.bindings());
    }
    (sql, bindings)
}

/// AND-combines fixed conditions around a caller's ledger.
///
/// The ledger is parenthesized when it contains an `OR` and anything else
/// is AND-ed with it, so the fixed conditions constrain every branch.
pub(crate) fn where_clause(
    leading: &[Condition], ledger: &[(Condition, Joiner)], trailing: &[Condition],
) -> Option<(String, Vec<Primitive>)> {
    let mut parts = Vec::new();
    let mut bindings = Vec::new();

    for condition in leading {
        parts.push(condition.render());
        bindings.extend(condition.bindings());
    }

    if !ledger.is_empty() {
        let (sql, params) = render_ledger(ledger);
        let has_or = ledger.iter().skip(1).any(|(_, joiner)| *joiner == Joiner::Or);
        if has_or && (!leading.is_empty() || !trailing.is_empty()) {
            parts.push(format!("({sql})"));
        } else {
            parts.push(sql);
        }
        bindings.extend(params);
    }

    for condition in trailing {
        parts.push(condition.render());
        bindings.extend(condition.bindings());
    }

    if parts.is_empty() { None } else { Some((parts.join(" AND "), bindings)) }
}
