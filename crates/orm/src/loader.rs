//! Lazy and eager relationship loading.
//!
//! Eager loading issues one `IN (...)` query per relation regardless of how
//! many owners are loaded, then partitions the results back onto each owner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use arbor_sql::{Primitive, Row};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::db::Db;
use crate::record::{Loaded, Record};
use crate::relation::{Relation, RelationKind};

impl Record {
    /// Returns the named relation, loading it on first access.
    ///
    /// Later calls return the cached result without querying, until the
    /// relation is unset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::UsageError::UnknownRelation`] for unregistered names,
    /// or the engine's error unchanged.
    pub async fn related(&mut self, db: &Db, name: &str) -> Result<&Loaded> {
        if !self.relation_loaded(name) {
            let relation = db.registry().resolve(self.table(), name)?.clone();
            let loaded = load_one(db, &relation, self).await?;
            self.set_relation(name, loaded);
        }
        self.cached(name)
    }
}

// Join keys compare by text so integer and text keys of the same value meet.
fn join_key(value: &Primitive) -> Option<String> {
    match value {
        Primitive::Null => None,
        Primitive::Integer(v) => Some(v.to_string()),
        Primitive::Real(v) => Some(v.to_string()),
        Primitive::Text(v) => Some(v.clone()),
        Primitive::Blob(v) => Some(format!("{v:?}")),
    }
}

fn hydrate(relation: &Relation, mut row: Row) -> (Option<String>, Record) {
    let key = match relation.kind() {
        RelationKind::BelongsToMany(pivot) => row.remove(&pivot.alias()),
        _ => row.get(&relation.match_field()).cloned(),
    };
    let record = Record::hydrate(Arc::clone(relation.related()), row);
    (key.as_ref().and_then(join_key), record)
}

async fn load_one(db: &Db, relation: &Relation, owner: &Record) -> Result<Loaded> {
    let Some(key) = owner.get(relation.owner_key()).filter(|v| !v.is_null()).cloned() else {
        return Ok(relation.empty());
    };

    let query = relation.query(db).r#where(relation.match_column(), key);
    let query = if relation.is_many() { query } else { query.limit(1) };

    let rows = query.fetch_rows().await?;
    let records = rows.into_iter().map(|row| hydrate(relation, row).1).collect();
    Ok(relation.wrap(records))
}

/// Loads `path` onto every record in `owners`.
pub(crate) async fn eager_load(db: &Db, owners: &mut [Record], path: &str) -> Result<()> {
    load_path(db, owners.iter_mut().collect(), path).await
}

fn load_path<'a>(
    db: &'a Db, mut owners: Vec<&'a mut Record>, path: &'a str,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let (name, rest) = match path.split_once('.') {
            Some((name, rest)) => (name, Some(rest)),
            None => (path, None),
        };
        let Some(table) = owners.first().map(|owner| owner.table()) else {
            return Ok(());
        };
        let Some(relation) = db.registry().find(table, name).cloned() else {
            tracing::warn!(table, relation = name, "skipping unregistered relation");
            return Ok(());
        };

        load_batch(db, &relation, name, &mut owners).await?;

        if let Some(rest) = rest {
            let children: Vec<&mut Record> = owners
                .into_iter()
                .filter_map(|owner| owner.relation_mut(name))
                .flat_map(Loaded::records_mut)
                .collect();
            load_path(db, children, rest).await?;
        }
        Ok(())
    }
    .boxed()
}

async fn load_batch(
    db: &Db, relation: &Relation, name: &str, owners: &mut [&mut Record],
) -> Result<()> {
    let pending: Vec<usize> =
        (0..owners.len()).filter(|&i| !owners[i].relation_loaded(name)).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for &i in &pending {
        if let Some(value) = owners[i].get(relation.owner_key())
            && let Some(key) = join_key(value)
            && seen.insert(key)
        {
            keys.push(value.clone());
        }
    }

    let mut buckets: HashMap<String, Vec<Record>> = HashMap::new();
    if !keys.is_empty() {
        let rows = relation.query(db).where_in(relation.match_column(), keys).fetch_rows().await?;
        for row in rows {
            if let (Some(key), record) = hydrate(relation, row) {
                buckets.entry(key).or_default().push(record);
            }
        }
    }

    tracing::debug!(
        table = relation.owner_table(),
        relation = name,
        owners = pending.len(),
        related = buckets.values().map(Vec::len).sum::<usize>(),
        "eager loaded relation"
    );

    for i in pending {
        let owner = &mut owners[i];
        let records = owner
            .get(relation.owner_key())
            .and_then(join_key)
            .and_then(|key| buckets.get(&key))
            .cloned()
            .unwrap_or_default();
        owner.set_relation(name, relation.wrap(records));
    }
    Ok(())
}
