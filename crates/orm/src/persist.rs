//! Writes: record lifecycle and query-level mutations.

use std::sync::Arc;

use anyhow::Result;
use arbor_sql::Primitive;
use chrono::Utc;

use crate::builder::QueryBuilder;
use crate::db::Db;
use crate::delete::DeleteBuilder;
use crate::entity::{Entity, Model};
use crate::error::UsageError;
use crate::insert::InsertBuilder;
use crate::record::Record;
use crate::scope::{Capability, Trashed};
use crate::update::UpdateBuilder;
use crate::value::{Value, encode};

impl Db {
    /// Saves a record.
    ///
    /// New records are inserted and take back the stored row (including a
    /// generated primary key). Persisted records update only their changed
    /// columns; a clean persisted record is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ValidationErrors`] when the model rejects the record,
    /// [`UsageError::MissingPrimaryKey`] when updating a record without a key,
    /// or the engine's error unchanged.
    pub async fn save(&self, record: &mut Record) -> Result<()> {
        if record.exists() && !record.is_dirty() {
            return Ok(());
        }

        let schema = Arc::clone(record.schema());
        let errors = schema.validate(record);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let now = Utc::now();
        for capability in &schema.capabilities {
            capability.before_save(record, now);
        }

        if record.exists() { self.perform_update(record).await } else { self.perform_insert(record).await }
    }

    async fn perform_insert(&self, record: &mut Record) -> Result<()> {
        let values: Vec<(String, Primitive)> =
            record.attributes().map(|(column, value)| (column.to_string(), value.clone())).collect();
        let statement = InsertBuilder::new(record.table()).row(values).returning_all().build()?;

        let rows = self.fetch(statement).await?;
        match rows.into_iter().next() {
            Some(row) => record.absorb(row),
            None => record.sync(),
        }
        Ok(())
    }

    async fn perform_update(&self, record: &mut Record) -> Result<()> {
        let (column, key) = primary_key(record)?;
        let mut update = UpdateBuilder::new(record.table());
        for column in record.dirty_columns() {
            if let Some(value) = record.get(column) {
                update = update.set(column, value.clone());
            }
        }
        let statement = update.filter(format!("{column} = ?"), vec![key]).build()?;

        self.run(statement).await?;
        record.sync();
        Ok(())
    }

    /// Saves several records in one transaction.
    ///
    /// # Errors
    ///
    /// Returns the first failure; nothing is written when any save fails.
    pub async fn save_many(&self, records: &mut [Record]) -> Result<()> {
        self.transaction(|db| async move {
            for record in records.iter_mut() {
                db.save(record).await?;
            }
            Ok(())
        })
        .await
    }

    /// Deletes a record; soft-deleting models only set their deletion instant.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::MissingPrimaryKey`] or the engine's error unchanged.
    pub async fn delete(&self, record: &mut Record) -> Result<()> {
        let Some(column) = record.schema().soft_delete_column() else {
            return self.force_delete(record).await;
        };
        let (key_column, key) = primary_key(record)?;
        let now = encode(&Utc::now().into());
        let statement = UpdateBuilder::new(record.table())
            .set(column, now.clone())
            .filter(format!("{key_column} = ?"), vec![key])
            .build()?;

        self.run(statement).await?;
        record.set(column, Value::from(now));
        record.sync();
        Ok(())
    }

    /// Removes a record's row, ignoring soft deletes.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::MissingPrimaryKey`] or the engine's error unchanged.
    pub async fn force_delete(&self, record: &mut Record) -> Result<()> {
        let (column, key) = primary_key(record)?;
        let statement =
            DeleteBuilder::new(record.table()).filter(format!("{column} = ?"), vec![key]).build()?;

        self.run(statement).await?;
        record.forget();
        Ok(())
    }

    /// Clears a soft-deleted record's deletion instant and saves it.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NotSoftDeletable`] for models without soft deletes,
    /// or any error from [`Db::save`].
    pub async fn restore(&self, record: &mut Record) -> Result<()> {
        let Some(column) = record.schema().soft_delete_column() else {
            return Err(UsageError::NotSoftDeletable {
                table: record.table().to_string(),
            }
            .into());
        };
        record.set(column, Value::Null);
        self.save(record).await
    }

    /// The `M` record with primary key `id`, soft-deleted rows excluded.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn find<M: Model>(&self, id: impl Into<Value>) -> Result<Option<Record>> {
        self.query::<M>().find(id).await
    }

    /// Inserts a typed entity and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Db::save`].
    pub async fn create<E: Entity>(&self, entity: &E) -> Result<Record> {
        let mut record = Record::from_entity(entity);
        self.save(&mut record).await?;
        Ok(record)
    }

    /// The first `M` record matching `attributes`, or a new one created from
    /// `attributes` plus `values`.
    ///
    /// Lookup and insert run in one transaction.
    ///
    /// # Errors
    ///
    /// Returns any error from the lookup or [`Db::save`].
    pub async fn find_or_create<M: Model>(
        &self, attributes: Vec<(&str, Value)>, values: Vec<(&str, Value)>,
    ) -> Result<Record> {
        self.transaction(|db| async move {
            let mut query = db.query::<M>();
            for (column, value) in &attributes {
                query = query.r#where(*column, value.clone());
            }
            if let Some(found) = query.fetch_one().await? {
                return Ok(found);
            }

            let mut record = Record::new(Arc::clone(query.schema()));
            for (column, value) in attributes.into_iter().chain(values) {
                record.set(column, value);
            }
            db.save(&mut record).await?;
            Ok(record)
        })
        .await
    }

    /// Inserts many `M` rows in one statement, inside a transaction.
    ///
    /// Timestamps are filled in; validation does not run.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn insert_many<M: Model>(&self, rows: Vec<Vec<(&str, Value)>>) -> Result<u64> {
        self.bulk_insert::<M>(rows, None).await
    }

    /// Inserts many `M` rows, updating `update` columns where `conflict`
    /// columns already match a row.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn upsert_many<M: Model>(
        &self, rows: Vec<Vec<(&str, Value)>>, conflict: &[&str], update: &[&str],
    ) -> Result<u64> {
        self.bulk_insert::<M>(rows, Some((conflict, update))).await
    }

    async fn bulk_insert<M: Model>(
        &self, rows: Vec<Vec<(&str, Value)>>, upsert: Option<(&[&str], &[&str])>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let schema = self.registry().schema(M::TABLE).unwrap_or_else(|| Arc::new(M::schema()));
        let now = Utc::now();

        let mut insert = InsertBuilder::new(M::TABLE);
        for row in rows {
            let mut record = Record::new(Arc::clone(&schema));
            for (column, value) in row {
                record.set(column, value);
            }
            for capability in &schema.capabilities {
                capability.before_save(&mut record, now);
            }
            let values: Vec<(String, Primitive)> =
                record.attributes().map(|(c, v)| (c.to_string(), v.clone())).collect();
            insert = insert.row(values);
        }

        if let Some((conflict, update)) = upsert {
            let mut columns: Vec<&str> = update.to_vec();
            for capability in &schema.capabilities {
                if let Capability::Timestamps { updated_at, .. } = capability
                    && !columns.contains(updated_at)
                {
                    columns.push(*updated_at);
                }
            }
            insert = insert.on_conflict(conflict.iter().copied()).do_update(columns);
        }

        let statement = insert.build()?;
        self.transaction(|db| async move { db.run(statement).await }).await
    }
}

impl QueryBuilder {
    /// Updates every matching row.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn update(&self, values: Vec<(&str, Value)>) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut update = UpdateBuilder::new(self.schema().table);
        for (column, value) in values {
            update = update.set(column, encode(&value));
        }
        self.write(update, Trashed::Exclude).await
    }

    /// Deletes every matching row; soft-deleting models only set their
    /// deletion instant.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn delete(&self) -> Result<u64> {
        let Some(column) = self.schema().soft_delete_column() else {
            return self.force_delete().await;
        };
        let update =
            UpdateBuilder::new(self.schema().table).set(column, encode(&Utc::now().into()));
        self.write(update, self.trashed).await
    }

    /// Removes every matching row, ignoring soft deletes.
    ///
    /// # Errors
    ///
    /// Returns the engine's error unchanged.
    pub async fn force_delete(&self) -> Result<u64> {
        let mut delete = DeleteBuilder::new(self.schema().table);
        if let Some((clause, bindings)) = self.filter() {
            delete = delete.filter(clause, bindings);
        }
        self.db().run(delete.build()?).await
    }

    /// Clears the deletion instant of every matching soft-deleted row.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NotSoftDeletable`] for models without soft deletes,
    /// or the engine's error unchanged.
    pub async fn restore(&self) -> Result<u64> {
        let Some(column) = self.schema().soft_delete_column() else {
            return Err(UsageError::NotSoftDeletable {
                table: self.schema().table.to_string(),
            }
            .into());
        };
        let update = UpdateBuilder::new(self.schema().table).set(column, Primitive::Null);
        self.write(update, Trashed::Only).await
    }

    async fn write(&self, update: UpdateBuilder, trashed: Trashed) -> Result<u64> {
        let mut scoped = self.clone();
        scoped.trashed = if self.trashed == Trashed::Exclude { trashed } else { self.trashed };
        let update = match scoped.filter() {
            Some((clause, bindings)) => update.filter(clause, bindings),
            None => update,
        };
        self.db().run(update.build()?).await
    }
}

fn primary_key(record: &Record) -> Result<(&'static str, Primitive)> {
    let column = record.schema().primary_key;
    let key = record.key().cloned().ok_or_else(|| UsageError::MissingPrimaryKey {
        table: record.table().to_string(),
        key: column.to_string(),
    })?;
    Ok((column, key))
}
