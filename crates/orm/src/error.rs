//! Errors

use thiserror::Error;

/// Misuse of the ORM, raised at the call site that caused it.
///
/// Engine failures are not wrapped in this type: they propagate unchanged
/// through the `anyhow` chain so callers can downcast to the engine's error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// A relationship name that is not registered for the model.
    #[error("relation `{relation}` is not registered on `{table}`")]
    UnknownRelation {
        /// Table the lookup started from.
        table: String,
        /// Name that was looked up.
        relation: String,
    },

    /// A range validation rule with neither a lower nor an upper bound.
    #[error("range rule needs at least one bound")]
    EmptyRange,

    /// An update or delete against a record with no primary key value.
    #[error("`{table}` record has no value for primary key `{key}`")]
    MissingPrimaryKey {
        /// Table of the record.
        table: String,
        /// Primary key column with no value.
        key: String,
    },

    /// Restore or trash called on a model without soft deletes.
    #[error("`{table}` does not use soft deletes")]
    NotSoftDeletable {
        /// Table of the model.
        table: String,
    },
}

/// No row matched a query that required one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no `{table}` record matched the query")]
pub struct NotFound {
    /// Table that was queried.
    pub table: String,
}
