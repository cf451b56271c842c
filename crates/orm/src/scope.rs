//! Model capabilities: timestamps and soft deletes.

use chrono::{DateTime, Utc};

use crate::condition::Condition;
use crate::record::Record;

/// Which soft-deleted rows a query sees.
///
/// Builder calls that change it are last-write-wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trashed {
    /// Hide soft-deleted rows.
    #[default]
    Exclude,
    /// Show every row.
    Include,
    /// Show only soft-deleted rows.
    Only,
}

/// Optional behavior attached to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Maintain creation and last-update instants on save.
    Timestamps {
        created_at: &'static str,
        updated_at: &'static str,
    },
    /// Mark rows deleted instead of removing them, and hide them from queries.
    SoftDeletes { column: &'static str },
}

impl Capability {
    /// Timestamps on `created_at` and `updated_at`.
    #[must_use]
    pub const fn timestamps() -> Self {
        Self::Timestamps {
            created_at: "created_at",
            updated_at: "updated_at",
        }
    }

    /// Soft deletes on `deleted_at`.
    #[must_use]
    pub const fn soft_deletes() -> Self {
        Self::SoftDeletes {
            column: "deleted_at",
        }
    }

    /// Runs just before a record is written.
    pub(crate) fn before_save(&self, record: &mut Record, now: DateTime<Utc>) {
        if let Self::Timestamps {
            created_at,
            updated_at,
        } = self
        {
            if !record.exists() && record.get(created_at).is_none_or(|v| v.is_null()) {
                record.set(created_at, now);
            }
            record.set(updated_at, now);
        }
    }

    /// The condition a query on `table` gets for this capability.
    pub(crate) fn query_scope(&self, table: &str, trashed: Trashed) -> Option<Condition> {
        let Self::SoftDeletes { column } = self else {
            return None;
        };
        let qualified = format!("{table}.{column}");
        match trashed {
            Trashed::Exclude => Some(Condition::null(qualified)),
            Trashed::Only => Some(Condition::not_null(qualified)),
            Trashed::Include => None,
        }
    }
}
