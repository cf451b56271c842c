//! Model instances with change tracking and a relation cache.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use arbor_sql::{Primitive, Row};
use indexmap::{IndexMap, IndexSet};

use crate::entity::{Entity, FetchValue, Model};
use crate::schema::Schema;
use crate::value::{Value, encode};

/// A loaded relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// `HasOne` or `BelongsTo`: at most one record.
    One(Option<Box<Record>>),
    /// `HasMany` or `BelongsToMany`: zero or more records.
    Many(Vec<Record>),
}

impl Loaded {
    /// The loaded records, whatever the cardinality.
    #[must_use]
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Self::One(one) => one.as_deref().into_iter().collect(),
            Self::Many(many) => many.iter().collect(),
        }
    }

    /// The single record of a to-one relation.
    #[must_use]
    pub fn one(&self) -> Option<&Record> {
        match self {
            Self::One(one) => one.as_deref(),
            Self::Many(many) => many.first(),
        }
    }

    pub(crate) fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            Self::One(one) => one.as_deref_mut().into_iter().collect(),
            Self::Many(many) => many.iter_mut().collect(),
        }
    }
}

/// One row of a model's table.
///
/// Attributes are held already encoded, so what is stored is exactly what
/// the engine will be sent. `exists` tells whether the row has been
/// persisted and `changed` lists the columns assigned since the last sync.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    attributes: IndexMap<String, Primitive>,
    changed: IndexSet<String>,
    exists: bool,
    relations: HashMap<String, Loaded>,
}

impl Record {
    /// Creates an unsaved record.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            attributes: IndexMap::new(),
            changed: IndexSet::new(),
            exists: false,
            relations: HashMap::new(),
        }
    }

    /// Creates an unsaved record of model `M`.
    #[must_use]
    pub fn of<M: Model>() -> Self {
        Self::new(Arc::new(M::schema()))
    }

    /// Creates an unsaved record carrying every field of `entity`.
    #[must_use]
    pub fn from_entity<E: Entity>(entity: &E) -> Self {
        let mut record = Self::of::<E>();
        for (column, value) in entity.to_values() {
            record.set(column, value);
        }
        record
    }

    /// Builds a persisted, clean record from a result row.
    #[must_use]
    pub fn hydrate(schema: Arc<Schema>, row: Row) -> Self {
        let mut record = Self::new(schema);
        record.attributes = row.into_iter().map(|field| (field.name, field.value)).collect();
        record.exists = true;
        record
    }

    /// The model description.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The model's table.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.schema.table
    }

    /// Whether the record has been persisted.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// The encoded value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Primitive> {
        self.attributes.get(column)
    }

    /// Decodes a column into a host type.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or cannot be decoded as `T`.
    pub fn get_as<T: FetchValue>(&self, column: &str) -> Result<T> {
        T::fetch(self, column)
    }

    /// Assigns a column.
    ///
    /// The model's transform runs first, then the value is encoded. The
    /// column is marked changed only when the encoded value differs from
    /// the current one.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        let value = self.schema.transform(column, value.into());
        let encoded = encode(&value);
        if self.attributes.get(column) == Some(&encoded) {
            return;
        }
        self.attributes.insert(column.to_string(), encoded);
        self.changed.insert(column.to_string());
    }

    /// Every attribute, in assignment or select-list order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Primitive)> {
        self.attributes.iter().map(|(column, value)| (column.as_str(), value))
    }

    /// Whether any column changed since the last sync.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Columns changed since the last sync.
    pub fn dirty_columns(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    /// The primary key value, when set and not null.
    #[must_use]
    pub fn key(&self) -> Option<&Primitive> {
        self.get(self.schema.primary_key).filter(|v| !v.is_null())
    }

    /// Whether the record is soft-deleted.
    #[must_use]
    pub fn trashed(&self) -> bool {
        self.schema
            .soft_delete_column()
            .and_then(|column| self.get(column))
            .is_some_and(|v| !v.is_null())
    }

    /// Decodes the record into a typed entity.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is missing or cannot be decoded.
    pub fn decode<E: Entity>(&self) -> Result<E> {
        E::from_record(self)
    }

    /// A cached relation.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Loaded> {
        self.relations.get(name)
    }

    /// Whether a relation has been loaded.
    #[must_use]
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Caches a relation.
    pub fn set_relation(&mut self, name: impl Into<String>, loaded: Loaded) {
        self.relations.insert(name.into(), loaded);
    }

    /// Drops a cached relation so the next access reloads it.
    pub fn unset_relation(&mut self, name: &str) -> Option<Loaded> {
        self.relations.remove(name)
    }

    pub(crate) fn relation_mut(&mut self, name: &str) -> Option<&mut Loaded> {
        self.relations.get_mut(name)
    }

    pub(crate) fn cached(&self, name: &str) -> Result<&Loaded> {
        self.relations
            .get(name)
            .ok_or_else(|| anyhow!("relation `{name}` is not loaded on `{}`", self.table()))
    }

    /// Marks the record persisted and clean.
    pub(crate) fn sync(&mut self) {
        self.changed.clear();
        self.exists = true;
    }

    /// Replaces attributes with the row the engine returned, then syncs.
    pub(crate) fn absorb(&mut self, row: Row) {
        for field in row {
            self.attributes.insert(field.name, field.value);
        }
        self.sync();
    }

    pub(crate) const fn forget(&mut self) {
        self.exists = false;
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.table == other.schema.table
            && self.exists == other.exists
            && self.attributes == other.attributes
            && self.relations == other.relations
    }
}
