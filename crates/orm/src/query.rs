use anyhow::{Result, bail};
use arbor_sql::Primitive;
use chrono::{DateTime, Utc};
use sea_query::backend::{
    EscapeBuilder, OperLeftAssocDecider, PrecedenceDecider, QuotedBuilder, TableRefBuilder,
};
use sea_query::prepare::SqlWriter;
use sea_query::{BinOper, Oper, Quote, SimpleExpr, SubQueryStatement, Value, Values};

/// Compiled SQL text and its ordered bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL with positional `?` placeholders.
    pub sql: String,
    /// One binding per placeholder, in textual order.
    pub params: Vec<Primitive>,
}

/// `SQLite` dialect for sea-query's write statements.
pub struct Dialect {
    pub quote: Quote,
    pub placeholder: &'static str, // "?" or "$"
    pub numbered: bool,            // false for "?", true for "$1, $2, ..."
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            quote: Quote::new(b'"'),
            placeholder: "?",
            numbered: false,
        }
    }
}

impl QuotedBuilder for Dialect {
    fn quote(&self) -> Quote {
        self.quote
    }
}

impl EscapeBuilder for Dialect {}

impl TableRefBuilder for Dialect {}

impl OperLeftAssocDecider for Dialect {
    fn well_known_left_associative(&self, op: &BinOper) -> bool {
        // Copied from sea-query 0.32.7 backend/query_builder.rs `common_well_known_left_associative`
        matches!(
            op,
            BinOper::And | BinOper::Or | BinOper::Add | BinOper::Sub | BinOper::Mul | BinOper::Mod
        )
    }
}

impl PrecedenceDecider for Dialect {
    fn inner_expr_well_known_greater_precedence(
        &self, _inner: &SimpleExpr, _outer_oper: &Oper,
    ) -> bool {
        // Conservative approach that forces parentheses
        false
    }
}

impl sea_query::backend::QueryBuilder for Dialect {
    fn prepare_query_statement(&self, query: &SubQueryStatement, sql: &mut dyn SqlWriter) {
        match query {
            SubQueryStatement::SelectStatement(s) => self.prepare_select_statement(s, sql),
            SubQueryStatement::InsertStatement(s) => self.prepare_insert_statement(s, sql),
            SubQueryStatement::UpdateStatement(s) => self.prepare_update_statement(s, sql),
            SubQueryStatement::DeleteStatement(s) => self.prepare_delete_statement(s, sql),
            SubQueryStatement::WithStatement(s) => self.prepare_with_query(s, sql),
        }
    }

    fn prepare_value(&self, value: &Value, sql: &mut dyn SqlWriter) {
        sql.push_param(value.clone(), self);
    }

    fn placeholder(&self) -> (&str, bool) {
        (self.placeholder, self.numbered)
    }
}

// Outbound conversion (internal use only)
pub(crate) fn to_sea_value(value: &Primitive) -> Value {
    match value {
        Primitive::Null => Value::String(None),
        Primitive::Integer(v) => Value::BigInt(Some(*v)),
        Primitive::Real(v) => Value::Double(Some(*v)),
        Primitive::Text(v) => Value::String(Some(Box::new(v.clone()))),
        Primitive::Blob(v) => Value::Bytes(Some(Box::new(v.clone()))),
    }
}

pub(crate) fn values_to_primitives(values: Values) -> Result<Vec<Primitive>> {
    values.into_iter().map(value_to_primitive).collect()
}

fn value_to_primitive(value: Value) -> Result<Primitive> {
    let primitive = match value {
        Value::Bool(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::TinyInt(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::SmallInt(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::Int(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::BigInt(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::TinyUnsigned(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::SmallUnsigned(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::Unsigned(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::BigUnsigned(v) => match v {
            None => Primitive::Null,
            Some(v) => {
                i64::try_from(v).map_or_else(|_| Primitive::Text(v.to_string()), Primitive::Integer)
            }
        },
        Value::Float(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::Double(v) => v.map_or(Primitive::Null, Primitive::from),
        Value::String(v) => v.map_or(Primitive::Null, |value| Primitive::Text(*value)),
        Value::Char(v) => v.map_or(Primitive::Null, |ch| Primitive::Text(ch.to_string())),
        Value::Bytes(v) => v.map_or(Primitive::Null, |bytes| Primitive::Blob(*bytes)),
        Value::ChronoDate(v) => v.map_or(Primitive::Null, |date| {
            Primitive::Text(date.format("%Y-%m-%d").to_string())
        }),
        Value::ChronoDateTimeUtc(v) => v.map_or(Primitive::Null, |dt| {
            let dt: DateTime<Utc> = *dt;
            Primitive::Text(dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
        }),
        _ => {
            bail!("unsupported values require explicit conversion before building the query")
        }
    };
    Ok(primitive)
}
