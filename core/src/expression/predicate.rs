//! Typed column handles and the predicate AST.

use std::fmt;
use std::marker::PhantomData;

use crate::entity::{DELETED, Entity, EntityKey, ID, LAST_TIME, LAST_USER, VERSION};
use crate::value::Value;

/// Column scope of entity type `T` inside a query expression.
///
/// Closures passed to the expression builders receive a `&Table<T>` and use
/// it to name `T`'s columns.
pub struct Table<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("entity", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Entity> Table<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Handle for the column `name` of `T`; checked against the schema at compile time.
    pub fn col(&self, name: &str) -> ColumnRef {
        ColumnRef {
            entity: EntityKey::of::<T>(),
            column: name.to_string(),
        }
    }

    pub fn id(&self) -> ColumnRef {
        self.col(ID)
    }

    pub fn version(&self) -> ColumnRef {
        self.col(VERSION)
    }

    pub fn deleted(&self) -> ColumnRef {
        self.col(DELETED)
    }

    pub fn last_user(&self) -> ColumnRef {
        self.col(LAST_USER)
    }

    pub fn last_time(&self) -> ColumnRef {
        self.col(LAST_TIME)
    }
}

/// A column of one participating entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub entity: EntityKey,
    pub column: String,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    /// Bound as a parameter, never inlined.
    Value(Value),
}

impl From<ColumnRef> for Operand {
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Boolean predicate over the participating entity types.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
    Like {
        column: ColumnRef,
        pattern: String,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// Calls `f` for every column referenced anywhere in the predicate.
    pub fn visit_columns<'a>(&'a self, f: &mut impl FnMut(&'a ColumnRef)) {
        match self {
            Self::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Column(c) = operand {
                        f(c);
                    }
                }
            }
            Self::IsNull(c) | Self::IsNotNull(c) => f(c),
            Self::In { column, .. } | Self::Like { column, .. } => f(column),
            Self::And(a, b) | Self::Or(a, b) => {
                a.visit_columns(f);
                b.visit_columns(f);
            }
            Self::Not(inner) => inner.visit_columns(f),
        }
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl ColumnRef {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            left: Operand::Column(self),
            op,
            right: Operand::Value(value.into()),
        }
    }

    /// Equality; comparing with `NULL` yields `IS NULL`.
    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    /// Inequality; comparing with `NULL` yields `IS NOT NULL`.
    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    /// Column-to-column comparison, the usual join binding.
    pub fn eq_col(self, other: ColumnRef) -> Predicate {
        self.cmp_col(CompareOp::Eq, other)
    }

    pub fn cmp_col(self, op: CompareOp, other: ColumnRef) -> Predicate {
        Predicate::Compare {
            left: Operand::Column(self),
            op,
            right: Operand::Column(other),
        }
    }

    pub fn like(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            column: self,
            pattern: pattern.into(),
        }
    }

    pub fn is_in<I, V>(self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: self,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull(self)
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNotNull(self)
    }
}
