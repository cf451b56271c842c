//! Relationship descriptors and the registry that names them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::QueryBuilder;
use crate::db::Db;
use crate::entity::Model;
use crate::error::UsageError;
use crate::join::Join;
use crate::record::{Loaded, Record};
use crate::schema::Schema;
use crate::value::Value;

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pivot {
    /// Pivot table name.
    pub table: &'static str,
    /// Pivot column referencing the owning model.
    pub owner_key: &'static str,
    /// Pivot column referencing the related model.
    pub related_key: &'static str,
}

impl Pivot {
    /// Alias the owner key is selected under when loading through the pivot.
    #[must_use]
    pub fn alias(&self) -> String {
        format!("pivot_{}", self.owner_key)
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// The related table holds a key pointing at one owner row.
    HasOne,
    /// As `HasOne`, with many related rows per owner.
    HasMany,
    /// The owner holds a key pointing at one related row.
    BelongsTo,
    /// Owner and related rows are linked through a pivot table.
    BelongsToMany(Pivot),
}

/// A named relationship from an owning model to a related model.
///
/// Key roles depend on the kind:
///
/// | kind | `foreign_key` | `local_key` |
/// |------|---------------|-------------|
/// | `HasOne` / `HasMany` | on the related table | on the owner |
/// | `BelongsTo` | on the owner | on the related table |
/// | `BelongsToMany` | related key matched by the pivot | owner key matched by the pivot |
#[derive(Debug, Clone)]
pub struct Relation {
    pub(crate) kind: RelationKind,
    pub(crate) owner: &'static str,
    pub(crate) related: Arc<Schema>,
    pub(crate) foreign_key: &'static str,
    pub(crate) local_key: &'static str,
}

impl Relation {
    fn new<R: Model>(kind: RelationKind, foreign_key: &'static str, local_key: &'static str) -> Self {
        Self {
            kind,
            owner: "",
            related: Arc::new(R::schema()),
            foreign_key,
            local_key,
        }
    }

    /// One related `R` row whose `foreign_key` matches the owner's `local_key`.
    #[must_use]
    pub fn has_one<R: Model>(foreign_key: &'static str, local_key: &'static str) -> Self {
        Self::new::<R>(RelationKind::HasOne, foreign_key, local_key)
    }

    /// Every related `R` row whose `foreign_key` matches the owner's `local_key`.
    #[must_use]
    pub fn has_many<R: Model>(foreign_key: &'static str, local_key: &'static str) -> Self {
        Self::new::<R>(RelationKind::HasMany, foreign_key, local_key)
    }

    /// The `R` row whose `owner_key` matches the owner's `foreign_key`.
    #[must_use]
    pub fn belongs_to<R: Model>(foreign_key: &'static str, owner_key: &'static str) -> Self {
        Self::new::<R>(RelationKind::BelongsTo, foreign_key, owner_key)
    }

    /// Every `R` row linked to the owner through `pivot`.
    ///
    /// The owner is matched on its primary key `id` and the related rows on
    /// `R::PRIMARY_KEY`. Use [`Relation::keys`] to override either.
    #[must_use]
    pub fn belongs_to_many<R: Model>(
        pivot: &'static str, owner_key: &'static str, related_key: &'static str,
    ) -> Self {
        let pivot = Pivot {
            table: pivot,
            owner_key,
            related_key,
        };
        Self::new::<R>(RelationKind::BelongsToMany(pivot), R::PRIMARY_KEY, "id")
    }

    /// Overrides both key columns.
    #[must_use]
    pub const fn keys(mut self, foreign_key: &'static str, local_key: &'static str) -> Self {
        self.foreign_key = foreign_key;
        self.local_key = local_key;
        self
    }

    /// Relationship kind.
    #[must_use]
    pub const fn kind(&self) -> &RelationKind {
        &self.kind
    }

    /// Owning table, set on registration.
    #[must_use]
    pub const fn owner_table(&self) -> &'static str {
        self.owner
    }

    /// Related model.
    #[must_use]
    pub const fn related(&self) -> &Arc<Schema> {
        &self.related
    }

    /// Foreign key column.
    #[must_use]
    pub const fn foreign_key(&self) -> &'static str {
        self.foreign_key
    }

    /// Local key column.
    #[must_use]
    pub const fn local_key(&self) -> &'static str {
        self.local_key
    }

    /// Whether the relation resolves to many records.
    #[must_use]
    pub const fn is_many(&self) -> bool {
        matches!(self.kind, RelationKind::HasMany | RelationKind::BelongsToMany(_))
    }

    /// Owner column whose value selects related rows.
    pub(crate) const fn owner_key(&self) -> &'static str {
        match self.kind {
            RelationKind::BelongsTo => self.foreign_key,
            _ => self.local_key,
        }
    }

    /// Qualified column on the related side matched against owner keys.
    pub(crate) fn match_column(&self) -> String {
        match &self.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                format!("{}.{}", self.related.table, self.foreign_key)
            }
            RelationKind::BelongsTo => format!("{}.{}", self.related.table, self.local_key),
            RelationKind::BelongsToMany(pivot) => format!("{}.{}", pivot.table, pivot.owner_key),
        }
    }

    /// Result column holding the owner key of each related row.
    pub(crate) fn match_field(&self) -> String {
        match &self.kind {
            RelationKind::HasOne | RelationKind::HasMany => self.foreign_key.to_string(),
            RelationKind::BelongsTo => self.local_key.to_string(),
            RelationKind::BelongsToMany(pivot) => pivot.alias(),
        }
    }

    /// Correlates a related-side subquery with the outer owner query, naming
    /// each side as it appears in the SQL.
    pub(crate) fn correlation(&self, owner: &str, related: &str) -> (Option<Join>, String) {
        match &self.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                (None, format!("{related}.{} = {owner}.{}", self.foreign_key, self.local_key))
            }
            RelationKind::BelongsTo => {
                (None, format!("{related}.{} = {owner}.{}", self.local_key, self.foreign_key))
            }
            RelationKind::BelongsToMany(pivot) => (
                Some(self.pivot_join(pivot, related)),
                format!("{}.{} = {owner}.{}", pivot.table, pivot.owner_key, self.local_key),
            ),
        }
    }

    fn pivot_join(&self, pivot: &Pivot, related: &str) -> Join {
        Join::inner(
            pivot.table,
            format!("{}.{}", pivot.table, pivot.related_key),
            format!("{related}.{}", self.foreign_key),
        )
    }

    /// Base query over the related table, before owner keys are applied.
    pub(crate) fn query(&self, db: &Db) -> QueryBuilder {
        let query = QueryBuilder::new(db.clone(), Arc::clone(&self.related));
        match &self.kind {
            RelationKind::BelongsToMany(pivot) => query
                .select([format!("{}.*", self.related.table)])
                .select_raw(
                    format!("{}.{} AS {}", pivot.table, pivot.owner_key, pivot.alias()),
                    Vec::<Value>::new(),
                )
                .join(self.pivot_join(pivot, self.related.table)),
            _ => query,
        }
    }

    pub(crate) fn empty(&self) -> Loaded {
        if self.is_many() { Loaded::Many(Vec::new()) } else { Loaded::One(None) }
    }

    pub(crate) fn wrap(&self, records: Vec<Record>) -> Loaded {
        if self.is_many() {
            Loaded::Many(records)
        } else {
            Loaded::One(records.into_iter().next().map(Box::new))
        }
    }
}

/// Relations by owning table and name, plus the schemas of every registered model.
///
/// ```ignore
/// let registry = Registry::new()
///     .relation::<User>("posts", Relation::has_many::<Post>("user_id", "id"))
///     .relation::<Post>("author", Relation::belongs_to::<User>("user_id", "id"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    schemas: HashMap<&'static str, Arc<Schema>>,
    relations: HashMap<&'static str, HashMap<&'static str, Relation>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model's schema.
    #[must_use]
    pub fn model<M: Model>(mut self) -> Self {
        self.schemas.entry(M::TABLE).or_insert_with(|| Arc::new(M::schema()));
        self
    }

    /// Registers a named relation on model `M`.
    #[must_use]
    pub fn relation<M: Model>(mut self, name: &'static str, mut relation: Relation) -> Self {
        relation.owner = M::TABLE;
        self = self.model::<M>();
        self.schemas
            .entry(relation.related.table)
            .or_insert_with(|| Arc::clone(&relation.related));
        self.relations.entry(M::TABLE).or_default().insert(name, relation);
        self
    }

    /// The registered schema for a table.
    #[must_use]
    pub fn schema(&self, table: &str) -> Option<Arc<Schema>> {
        self.schemas.get(table).map(Arc::clone)
    }

    /// Looks up a relation, if registered.
    #[must_use]
    pub fn find(&self, table: &str, name: &str) -> Option<&Relation> {
        self.relations.get(table)?.get(name)
    }

    /// Looks up a relation that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::UnknownRelation`] when nothing is registered under `name`.
    pub fn resolve(&self, table: &str, name: &str) -> Result<&Relation> {
        self.find(table, name).ok_or_else(|| {
            UsageError::UnknownRelation {
                table: table.to_string(),
                relation: name.to_string(),
            }
            .into()
        })
    }
}
