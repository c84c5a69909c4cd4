//! Query expression model.
//!
//! Pure value objects, no I/O: [`SelectExpression`], [`FromExpression`] and
//! [`WhereExpression`] describe a query over up to three entity types, and
//! [`Predicate`] is the boolean AST the compiler walks. Builders are consumed
//! by reference, so one shape can compile into several commands (the same
//! filter for a `count` and a `retrieve`, say).
//!
//! # Examples
//!
//! ```ignore
//! use dbmap_core::{FromExpression, WhereExpression};
//!
//! let from = FromExpression::<BookEntity>::new()
//!     .inner_join::<AuthorEntity>(|b, a| b.col("AuthorId").eq_col(a.id()));
//! let filter = WhereExpression::<BookEntity>::new()
//!     .and(|b| b.col("Title").like("%Rust%").or(b.col("Pages").lt(50)))
//!     .and_for::<AuthorEntity>(|a| a.col("Country").eq("NO"));
//! ```

mod predicate;
mod query;

pub use predicate::{ColumnRef, CompareOp, Operand, Predicate, Table};
pub use query::{FromExpression, Join, JoinKind, OrderBy, SelectExpression, WhereExpression};
