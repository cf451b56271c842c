use crate::condition::Condition;
use crate::record::Record;
use crate::scope::{Capability, Trashed};
use crate::validation::ValidationErrors;
use crate::value::Value;

/// Runtime description of a model: where it lives and how it behaves.
///
/// Built once from a [`crate::Model`] implementation and shared (behind an
/// `Arc`) by every record and query for that model.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Table name.
    pub table: &'static str,
    /// Primary key column.
    pub primary_key: &'static str,
    /// Attached behaviors.
    pub capabilities: Vec<Capability>,
    validate: fn(&Record) -> ValidationErrors,
    transform: fn(&str, Value) -> Value,
}

impl Schema {
    /// Describes a table with an `id` primary key and no capabilities.
    #[must_use]
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            primary_key: "id",
            capabilities: Vec::new(),
            validate: |_| ValidationErrors::default(),
            transform: |_, value| value,
        }
    }

    /// Sets the primary key column.
    #[must_use]
    pub const fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = column;
        self
    }

    /// Attaches capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the pre-save validation hook.
    #[must_use]
    pub const fn validator(mut self, validate: fn(&Record) -> ValidationErrors) -> Self {
        self.validate = validate;
        self
    }

    /// Sets the attribute transform applied on assignment.
    #[must_use]
    pub const fn transformer(mut self, transform: fn(&str, Value) -> Value) -> Self {
        self.transform = transform;
        self
    }

    /// The soft-delete column, when the model soft-deletes.
    #[must_use]
    pub fn soft_delete_column(&self) -> Option<&'static str> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::SoftDeletes { column } => Some(*column),
            Capability::Timestamps { .. } => None,
        })
    }

    pub(crate) fn validate(&self, record: &Record) -> ValidationErrors {
        (self.validate)(record)
    }

    pub(crate) fn transform(&self, column: &str, value: Value) -> Value {
        (self.transform)(column, value)
    }

    /// Conditions every query against this table carries.
    pub(crate) fn scope(&self, trashed: Trashed) -> Vec<Condition> {
        self.scope_as(self.table, trashed)
    }

    /// As [`Schema::scope`], qualified by `reference` when the table is aliased.
    pub(crate) fn scope_as(&self, reference: &str, trashed: Trashed) -> Vec<Condition> {
        self.capabilities
            .iter()
            .filter_map(|capability| capability.query_scope(reference, trashed))
            .collect()
    }
}
