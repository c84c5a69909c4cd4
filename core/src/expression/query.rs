//! Select, From and Where builders.

use std::fmt;
use std::marker::PhantomData;

use crate::entity::{Entity, EntityKey};

use super::predicate::{ColumnRef, Predicate, Table};

/// Join kind between two participating tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Inner => "INNER JOIN",
            Self::Full => "FULL OUTER JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// One join of a [`FromExpression`].
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub target: EntityKey,
    /// Binding predicate; `None` only for cross joins.
    pub on: Option<Predicate>,
}

/// Projected columns of a single-type query.
///
/// The implicit `Id`, `Version`, `Deleted`, `LastUser` and `LastTime`
/// columns are always added by the compiler.
pub struct SelectExpression<T> {
    columns: Vec<ColumnRef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> SelectExpression<T> {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn select(mut self, f: impl FnOnce(&Table<T>) -> ColumnRef) -> Self {
        self.columns.push(f(&Table::new()));
        self
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }
}

impl<T: Entity> Default for SelectExpression<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SelectExpression<T> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SelectExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectExpression")
            .field("columns", &self.columns)
            .finish()
    }
}

/// Root table of type `T` plus up to two joined tables.
///
/// # Examples
///
/// ```ignore
/// let from = FromExpression::<BookEntity>::new()
///     .left_join::<AuthorEntity>(|book, author| book.col("AuthorId").eq_col(author.id()));
/// ```
pub struct FromExpression<T> {
    joins: Vec<Join>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> FromExpression<T> {
    pub fn new() -> Self {
        Self {
            joins: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn push<U: Entity>(mut self, kind: JoinKind, on: Option<Predicate>) -> Self {
        self.joins.push(Join {
            kind,
            target: EntityKey::of::<U>(),
            on,
        });
        self
    }

    /// Joins `U` with a predicate binding it to a participant `L` (root or earlier join).
    pub fn join_from<L: Entity, U: Entity>(
        self,
        kind: JoinKind,
        on: impl FnOnce(&Table<L>, &Table<U>) -> Predicate,
    ) -> Self {
        let predicate = on(&Table::new(), &Table::new());
        self.push::<U>(kind, Some(predicate))
    }

    pub fn left_join<U: Entity>(self, on: impl FnOnce(&Table<T>, &Table<U>) -> Predicate) -> Self {
        self.join_from::<T, U>(JoinKind::Left, on)
    }

    pub fn right_join<U: Entity>(self, on: impl FnOnce(&Table<T>, &Table<U>) -> Predicate) -> Self {
        self.join_from::<T, U>(JoinKind::Right, on)
    }

    pub fn inner_join<U: Entity>(self, on: impl FnOnce(&Table<T>, &Table<U>) -> Predicate) -> Self {
        self.join_from::<T, U>(JoinKind::Inner, on)
    }

    pub fn full_join<U: Entity>(self, on: impl FnOnce(&Table<T>, &Table<U>) -> Predicate) -> Self {
        self.join_from::<T, U>(JoinKind::Full, on)
    }

    pub fn left_join_from<L: Entity, U: Entity>(
        self,
        on: impl FnOnce(&Table<L>, &Table<U>) -> Predicate,
    ) -> Self {
        self.join_from::<L, U>(JoinKind::Left, on)
    }

    pub fn right_join_from<L: Entity, U: Entity>(
        self,
        on: impl FnOnce(&Table<L>, &Table<U>) -> Predicate,
    ) -> Self {
        self.join_from::<L, U>(JoinKind::Right, on)
    }

    pub fn inner_join_from<L: Entity, U: Entity>(
        self,
        on: impl FnOnce(&Table<L>, &Table<U>) -> Predicate,
    ) -> Self {
        self.join_from::<L, U>(JoinKind::Inner, on)
    }

    pub fn full_join_from<L: Entity, U: Entity>(
        self,
        on: impl FnOnce(&Table<L>, &Table<U>) -> Predicate,
    ) -> Self {
        self.join_from::<L, U>(JoinKind::Full, on)
    }

    pub fn cross_join<U: Entity>(self) -> Self {
        self.push::<U>(JoinKind::Cross, None)
    }

    pub fn root(&self) -> EntityKey {
        EntityKey::of::<T>()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Participating types, root first, in join order.
    pub fn participants(&self) -> Vec<EntityKey> {
        std::iter::once(self.root())
            .chain(self.joins.iter().map(|j| j.target))
            .collect()
    }
}

impl<T: Entity> Default for FromExpression<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FromExpression<T> {
    fn clone(&self) -> Self {
        Self {
            joins: self.joins.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for FromExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromExpression")
            .field("root", &std::any::type_name::<T>())
            .field("joins", &self.joins)
            .finish()
    }
}

/// Sort key of a [`WhereExpression`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub descending: bool,
}

/// Conjunction of predicates, ordering and pagination, scoped to root type `T`.
///
/// # Examples
///
/// ```ignore
/// let filter = WhereExpression::<BookEntity>::new()
///     .and(|b| b.col("Pages").gt(100))
///     .and_for::<AuthorEntity>(|a| a.col("Name").like("A%"))
///     .order_by(|b| b.col("Title"))
///     .limit(0, 20);
/// ```
pub struct WhereExpression<T> {
    predicates: Vec<Predicate>,
    order: Vec<OrderBy>,
    limit: Option<(u64, u64)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> WhereExpression<T> {
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            _marker: PhantomData,
        }
    }

    pub fn and(self, f: impl FnOnce(&Table<T>) -> Predicate) -> Self {
        let predicate = f(&Table::new());
        self.and_predicate(predicate)
    }

    /// Adds a predicate over another participating type `U`.
    pub fn and_for<U: Entity>(self, f: impl FnOnce(&Table<U>) -> Predicate) -> Self {
        let predicate = f(&Table::new());
        self.and_predicate(predicate)
    }

    pub fn and_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, f: impl FnOnce(&Table<T>) -> ColumnRef) -> Self {
        self.order.push(OrderBy {
            column: f(&Table::new()),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, f: impl FnOnce(&Table<T>) -> ColumnRef) -> Self {
        self.order.push(OrderBy {
            column: f(&Table::new()),
            descending: true,
        });
        self
    }

    /// Orders by a column of another participating type `U`.
    pub fn order_by_for<U: Entity>(
        mut self,
        f: impl FnOnce(&Table<U>) -> ColumnRef,
        descending: bool,
    ) -> Self {
        self.order.push(OrderBy {
            column: f(&Table::new()),
            descending,
        });
        self
    }

    /// Skips `offset` rows and returns at most `count`.
    pub fn limit(mut self, offset: u64, count: u64) -> Self {
        self.limit = Some((offset, count));
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn limit_range(&self) -> Option<(u64, u64)> {
        self.limit
    }
}

impl<T: Entity> Default for WhereExpression<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WhereExpression<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
            order: self.order.clone(),
            limit: self.limit,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for WhereExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhereExpression")
            .field("predicates", &self.predicates)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .finish()
    }
}
