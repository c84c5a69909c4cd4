use std::sync::Arc;

use tracing::debug;

use crate::command::CompiledCommand;
use crate::engine::DatabaseEngine;
use crate::entity::{Entity, EntityKey, ID};
use crate::error::{DatabaseError, Result};
use crate::expression::{FromExpression, SelectExpression, WhereExpression};
use crate::registry::EntitySchema;
use crate::transaction::TransactionContext;
use crate::value::{FromValue, Row};

use super::Database;

/// Limit window of a 1-based page.
fn page_window(page_number: u64, per_page_count: u64) -> Result<(u64, u64)> {
    if page_number < 1 || per_page_count < 1 {
        return Err(DatabaseError::ArgumentNotValid(format!(
            "page number and page size start at 1, got page {page_number} of size {per_page_count}"
        )));
    }
    let offset = (page_number - 1)
        .checked_mul(per_page_count)
        .ok_or_else(|| DatabaseError::ArgumentNotValid(format!("page {page_number} is out of range")))?;
    Ok((offset, per_page_count))
}

fn paged<T: Entity>(filter: Option<&WhereExpression<T>>, window: (u64, u64)) -> WhereExpression<T> {
    filter.cloned().unwrap_or_default().limit(window.0, window.1)
}

fn at_most_one<R>(entity: &str, mut rows: Vec<R>) -> Result<Option<R>> {
    if rows.len() > 1 {
        return Err(DatabaseError::found_too_much(
            entity,
            format!("scalar query matched {} rows", rows.len()),
        ));
    }
    Ok(rows.pop())
}

/// Joined side of a row; `None` when the outer join found nothing (its `Id` is NULL).
fn joined<T: Entity>(row: &Row) -> Result<Option<T>> {
    match row.value(ID) {
        Some(id) if !id.is_null() => T::from_row(row).map(Some),
        _ => Ok(None),
    }
}

impl<E: DatabaseEngine> Database<E> {
    fn query(
        &self,
        entity: &str,
        operation: &str,
        command: &CompiledCommand,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<Row>> {
        let rows = self
            .reader(transaction, command, false)
            .map_err(|e| e.into_data_access(entity, operation, || command.sql()))?;
        debug!(entity, operation, rows = rows.len(), "query finished");
        Ok(rows)
    }

    /// Participants of `from`, checked against the tuple the caller asked for.
    fn tuple_schemas<A: Entity>(
        &self,
        from: &FromExpression<A>,
        expected: &[EntityKey],
    ) -> Result<Vec<Arc<EntitySchema>>> {
        let participants = from.participants();
        if participants != expected {
            let names = |keys: &[EntityKey]| {
                keys.iter().map(|k| k.short_name()).collect::<Vec<_>>().join(", ")
            };
            return Err(DatabaseError::ArgumentNotValid(format!(
                "query joins ({}) but the result asks for ({})",
                names(&participants),
                names(expected)
            )));
        }
        self.builder.participant_schemas(Some(from))
    }

    /// Splits joined rows into per-participant rows.
    fn split(rows: &[Row], schemas: &[Arc<EntitySchema>]) -> Vec<Vec<Row>> {
        rows.iter()
            .map(|row| {
                let mut start = 0;
                schemas
                    .iter()
                    .map(|schema| {
                        let part = row.slice(start, schema.columns.len());
                        start += schema.columns.len();
                        part
                    })
                    .collect()
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Single type
    // ------------------------------------------------------------------

    /// Rows of `T` that are not soft-deleted and match `filter`.
    ///
    /// With joins and no select list, the leading columns of each row belong
    /// to `T`; joined types only narrow the result.
    pub fn retrieve<T: Entity>(
        &self,
        select: Option<&SelectExpression<T>>,
        from: Option<&FromExpression<T>>,
        filter: Option<&WhereExpression<T>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<T>> {
        let schema = self.registry.schema::<T>()?;
        let command = self.builder.retrieve(select, from, filter)?;
        let rows = self.query(&schema.entity_name, "retrieve", &command, transaction)?;
        let width = if select.is_some() { usize::MAX } else { schema.columns.len() };
        rows.iter().map(|row| T::from_row(&row.slice(0, width))).collect()
    }

    pub fn retrieve_all<T: Entity>(&self, transaction: Option<&mut TransactionContext<E>>) -> Result<Vec<T>> {
        self.retrieve::<T>(None, None, None, transaction)
    }

    /// The single matching row, `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::FoundTooMuch`] when more than one row matches.
    pub fn scalar<T: Entity>(
        &self,
        select: Option<&SelectExpression<T>>,
        from: Option<&FromExpression<T>>,
        filter: Option<&WhereExpression<T>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Option<T>> {
        let rows = self.retrieve(select, from, filter, transaction)?;
        at_most_one(&self.registry.schema::<T>()?.entity_name, rows)
    }

    pub fn scalar_by_id<T: Entity>(
        &self,
        id: i64,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Option<T>> {
        let filter = WhereExpression::<T>::new().and(|t| t.id().eq(id));
        self.scalar(None, None, Some(&filter), transaction)
    }

    /// One 1-based page; unordered queries are ordered by `Id`.
    pub fn page<T: Entity>(
        &self,
        select: Option<&SelectExpression<T>>,
        from: Option<&FromExpression<T>>,
        filter: Option<&WhereExpression<T>>,
        page_number: u64,
        per_page_count: u64,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<T>> {
        let filter = paged(filter, page_window(page_number, per_page_count)?);
        self.retrieve(select, from, Some(&filter), transaction)
    }

    pub fn count<T: Entity>(
        &self,
        from: Option<&FromExpression<T>>,
        filter: Option<&WhereExpression<T>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<u64> {
        let schema = self.registry.schema::<T>()?;
        let command = self.builder.count(from, filter)?;
        let value = self
            .scalar_value(transaction, &command, false)
            .map_err(|e| e.into_data_access(&schema.entity_name, "count", || command.sql()))?;
        u64::from_value(&value).map_err(|message| DatabaseError::Mapping {
            column: "COUNT(1)".to_string(),
            message,
        })
    }

    // ------------------------------------------------------------------
    // Joined tuples
    // ------------------------------------------------------------------

    /// Rows of a two-type join; `B` is `None` where an outer join found no match.
    pub fn retrieve2<A: Entity, B: Entity>(
        &self,
        from: &FromExpression<A>,
        filter: Option<&WhereExpression<A>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<(A, Option<B>)>> {
        let schemas = self.tuple_schemas(from, &[EntityKey::of::<A>(), EntityKey::of::<B>()])?;
        let command = self.builder.retrieve(None, Some(from), filter)?;
        let rows = self.query(&schemas[0].entity_name, "retrieve", &command, transaction)?;
        Self::split(&rows, &schemas)
            .iter()
            .map(|parts| Ok((A::from_row(&parts[0])?, joined::<B>(&parts[1])?)))
            .collect()
    }

    pub fn scalar2<A: Entity, B: Entity>(
        &self,
        from: &FromExpression<A>,
        filter: Option<&WhereExpression<A>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Option<(A, Option<B>)>> {
        let rows = self.retrieve2(from, filter, transaction)?;
        at_most_one(&self.registry.schema::<A>()?.entity_name, rows)
    }

    pub fn page2<A: Entity, B: Entity>(
        &self,
        from: &FromExpression<A>,
        filter: Option<&WhereExpression<A>>,
        page_number: u64,
        per_page_count: u64,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<(A, Option<B>)>> {
        let filter = paged(filter, page_window(page_number, per_page_count)?);
        self.retrieve2(from, Some(&filter), transaction)
    }

    pub fn retrieve3<A: Entity, B: Entity, C: Entity>(
        &self,
        from: &FromExpression<A>,
        filter: Option<&WhereExpression<A>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<(A, Option<B>, Option<C>)>> {
        let keys = [EntityKey::of::<A>(), EntityKey::of::<B>(), EntityKey::of::<C>()];
        let schemas = self.tuple_schemas(from, &keys)?;
        let command = self.builder.retrieve(None, Some(from), filter)?;
        let rows = self.query(&schemas[0].entity_name, "retrieve", &command, transaction)?;
        Self::split(&rows, &schemas)
            .iter()
            .map(|parts| {
                Ok((
                    A::from_row(&parts[0])?,
                    joined::<B>(&parts[1])?,
                    joined::<C>(&parts[2])?,
                ))
            })
            .collect()
    }

    pub fn scalar3<A: Entity, B: Entity, C: Entity>(
        &self,
        from: &FromExpression<A>,
        filter: Option<&WhereExpression<A>>,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Option<(A, Option<B>, Option<C>)>> {
        let rows = self.retrieve3(from, filter, transaction)?;
        at_most_one(&self.registry.schema::<A>()?.entity_name, rows)
    }

    pub fn page3<A: Entity, B: Entity, C: Entity>(
        &self,
        from: &FromExpression<A>,
        filter: Option<&WhereExpression<A>>,
        page_number: u64,
        per_page_count: u64,
        transaction: Option<&mut TransactionContext<E>>,
    ) -> Result<Vec<(A, Option<B>, Option<C>)>> {
        let filter = paged(filter, page_window(page_number, per_page_count)?);
        self.retrieve3(from, Some(&filter), transaction)
    }
}
