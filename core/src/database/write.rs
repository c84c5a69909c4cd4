use std::sync::Arc;

use tracing::debug;

use crate::engine::DatabaseEngine;
use crate::entity::{Entity, EntityMeta};
use crate::error::{DatabaseError, Result};
use crate::registry::EntitySchema;
use crate::transaction::TransactionContext;
use crate::value::Row;

use super::{Database, payload, validate_all};

/// Affected-row rule for single-row writes: 0 is a stale or missing row, above 1 is corruption.
fn expect_single_row(schema: &EntitySchema, operation: &str, affected: u64, meta: &EntityMeta) -> Result<()> {
    match affected {
        1 => Ok(()),
        0 => Err(DatabaseError::not_found(
            &schema.entity_name,
            format!(
                "{operation} matched no row with Id {} at Version {}; it is stale, deleted or missing",
                meta.id, meta.version
            ),
        )),
        n => Err(DatabaseError::found_too_much(
            &schema.entity_name,
            format!("{operation} of Id {} affected {n} rows", meta.id),
        )),
    }
}

fn batch_value(schema: &EntitySchema, row: &Row) -> Result<i64> {
    row.value_at(0)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DatabaseError::Mapping {
            column: "_value".to_string(),
            message: format!("batch on {} returned a non-integer result", schema.entity_name),
        })
}

impl<E: DatabaseEngine> Database<E> {
    /// Schema for a write: table-mapped, items valid, not read-only. No I/O.
    fn schema_for_write<T: Entity>(&self, items: &[T]) -> Result<Arc<EntitySchema>> {
        let schema = self.registry.schema::<T>()?;
        validate_all(&schema.entity_name, items)?;
        if !schema.writable {
            return Err(DatabaseError::NotWriteable {
                entity: schema.entity_name.clone(),
            });
        }
        Ok(schema)
    }

    fn ensure_persisted<T: Entity>(schema: &EntitySchema, items: &[T]) -> Result<()> {
        if let Some(item) = items.iter().find(|i| i.meta().id < 1) {
            return Err(DatabaseError::ArgumentNotValid(format!(
                "{} must be retrieved before it is written, Id is {}",
                schema.entity_name,
                item.meta().id
            )));
        }
        Ok(())
    }

    /// Inserts `item` and refreshes its id, version and audit columns in place.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::ArgumentNotValid`] if [`Entity::validate`] rejects the item
    /// - [`DatabaseError::NotWriteable`] if `T` is mapped read-only
    /// - [`DatabaseError::DataAccess`] on an engine failure
    pub fn add<T: Entity>(
        &self,
        item: &mut T,
        last_user: &str,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<()> {
        let schema = self.schema_for_write(std::slice::from_ref(&*item))?;
        let command = self.builder.add(&schema, &*item, last_user);
        let rows = self
            .reader(transaction, &command, true)
            .map_err(|e| e.into_data_access(&schema.entity_name, "add", || payload(&*item)))?;
        let row = rows.first().ok_or_else(|| {
            DatabaseError::not_found(&schema.entity_name, "inserted row could not be read back")
        })?;
        *item.meta_mut() = EntityMeta::from_row(row)?;
        debug!(entity = %schema.entity_name, id = item.meta().id, "added");
        Ok(())
    }

    /// Version-gated update; bumps the in-memory version on success.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::NotFound`] when the stored version no longer matches
    /// (the optimistic-concurrency conflict), or the row is deleted or missing.
    pub fn update<T: Entity>(
        &self,
        item: &mut T,
        last_user: &str,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<()> {
        let schema = self.schema_for_write(std::slice::from_ref(&*item))?;
        Self::ensure_persisted(&schema, std::slice::from_ref(&*item))?;
        let command = self.builder.update(&schema, &*item, last_user);
        let affected = self
            .non_query(transaction, &command)
            .map_err(|e| e.into_data_access(&schema.entity_name, "update", || payload(&*item)))?;
        expect_single_row(&schema, "update", affected, item.meta())?;

        let meta = item.meta_mut();
        meta.version += 1;
        meta.last_user = last_user.to_string();
        Ok(())
    }

    /// Version-gated soft delete; the row stays in the table with `Deleted = true`.
    pub fn delete<T: Entity>(
        &self,
        item: &mut T,
        last_user: &str,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<()> {
        let schema = self.schema_for_write(std::slice::from_ref(&*item))?;
        Self::ensure_persisted(&schema, std::slice::from_ref(&*item))?;
        let command = self.builder.delete(&schema, &*item, last_user);
        let affected = self
            .non_query(transaction, &command)
            .map_err(|e| e.into_data_access(&schema.entity_name, "delete", || payload(&*item)))?;
        expect_single_row(&schema, "delete", affected, item.meta())?;

        let meta = item.meta_mut();
        meta.version += 1;
        meta.deleted = true;
        meta.last_user = last_user.to_string();
        Ok(())
    }

    /// Inserts every item in one round trip and returns the generated ids in input order.
    ///
    /// Each item's id, version and audit columns are refreshed in place, as with [`Self::add`].
    ///
    /// # Errors
    ///
    /// [`DatabaseError::NotMatch`] if the engine reports a different number of
    /// ids than items; the batch is rolled back when it runs in its own transaction.
    pub fn batch_add<T: Entity>(
        &self,
        items: &mut [T],
        last_user: &str,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<i64>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.schema_for_write(items)?;
        let command = self.builder.batch_add(&schema, items, last_user);
        let submitted: &[T] = items;
        let generated = self.with_transaction(&schema.database, transaction, |ctx| {
            let rows = self
                .reader(Some(ctx), &command, true)
                .map_err(|e| e.into_data_access(&schema.entity_name, "batch_add", || payload(submitted)))?;
            if rows.len() != submitted.len() {
                return Err(DatabaseError::NotMatch {
                    entity: schema.entity_name.clone(),
                    expected: submitted.len(),
                    actual: rows.len(),
                });
            }
            rows.iter().map(EntityMeta::from_row).collect::<Result<Vec<_>>>()
        })?;

        let ids: Vec<i64> = generated.iter().map(|meta| meta.id).collect();
        for (item, meta) in items.iter_mut().zip(generated) {
            *item.meta_mut() = meta;
        }
        debug!(entity = %schema.entity_name, count = ids.len(), "batch added");
        Ok(ids)
    }

    /// Updates every item in one round trip; each must affect exactly one row.
    pub fn batch_update<T: Entity>(
        &self,
        items: &mut [T],
        last_user: &str,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let schema = self.schema_for_write(items)?;
        Self::ensure_persisted(&schema, items)?;
        let command = self.builder.batch_update(&schema, items, last_user);
        self.run_counted_batch(&schema, "batch_update", &command, items, transaction)?;

        for item in items.iter_mut() {
            let meta = item.meta_mut();
            meta.version += 1;
            meta.last_user = last_user.to_string();
        }
        Ok(())
    }

    /// Soft-deletes every item in one round trip; each must affect exactly one row.
    pub fn batch_delete<T: Entity>(
        &self,
        items: &mut [T],
        last_user: &str,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let schema = self.schema_for_write(items)?;
        Self::ensure_persisted(&schema, items)?;
        let command = self.builder.batch_delete(&schema, items, last_user);
        self.run_counted_batch(&schema, "batch_delete", &command, items, transaction)?;

        for item in items.iter_mut() {
            let meta = item.meta_mut();
            meta.version += 1;
            meta.deleted = true;
            meta.last_user = last_user.to_string();
        }
        Ok(())
    }

    fn run_counted_batch<T: Entity>(
        &self,
        schema: &EntitySchema,
        operation: &str,
        command: &crate::command::CompiledCommand,
        items: &[T],
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<()> {
        self.with_transaction(&schema.database, transaction, |ctx| {
            let rows = self
                .reader(Some(ctx), command, true)
                .map_err(|e| e.into_data_access(&schema.entity_name, operation, || payload(items)))?;
            if rows.len() != items.len() {
                return Err(DatabaseError::NotMatch {
                    entity: schema.entity_name.clone(),
                    expected: items.len(),
                    actual: rows.len(),
                });
            }
            for (row, item) in rows.iter().zip(items) {
                let affected = batch_value(schema, row)?;
                if affected != 1 {
                    return Err(DatabaseError::not_found(
                        &schema.entity_name,
                        format!(
                            "{operation} affected {affected} rows for Id {} at Version {}",
                            item.meta().id,
                            item.meta().version
                        ),
                    ));
                }
            }
            debug!(entity = %schema.entity_name, operation, count = items.len(), "batch verified");
            Ok(())
        })
    }
}
