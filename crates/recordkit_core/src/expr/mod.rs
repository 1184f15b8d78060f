//! The expression tree: every node renders itself against a dialect into a
//! `(sql_fragment, params)` pair. Nodes never hold driver state and never
//! perform I/O — `render` is pure and idempotent.

mod clause;
mod leaf;
mod predicate;
mod statement;

pub use clause::{ForUpdateOptions, ForUpdateStrength, GroupByHaving, JoinClause, JoinCondition, JoinKind, LimitOffset, OrderBy, OrderByItem, OrderDirection, OverClause, QualifyClause, WhereClause};
pub use leaf::{Column, FunctionArg, FunctionCall, Literal, RawSqlExpression, Subquery, TableExpression, ValueExpr, Wildcard, WindowFunctionCall};
pub use predicate::{BinaryArithOp, LogicalConnective, Predicate};
pub use statement::{CteDefinition, ExplainExpression, ExplainOptions, QueryExpression, SelectItem, SetOperationExpression, WithQueryExpression};

use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::value::Value;
use std::fmt::Debug;

/// A rendered fragment: the SQL text plus its positional parameters, in the
/// order their placeholders appear in the text.
pub type Rendered = (String, Vec<Value>);

/// A node in the expression tree.
///
/// `render` may fail — a node that needs an unsupported dialect feature
/// (a window function, a CTE, a set operation) raises the specific typed
/// error from [`crate::error::DbError`] rather than emitting SQL the backend
/// cannot run.
pub trait Expr: Debug {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError>;
}

/// Concatenate a sequence of rendered fragments with `separator`, preserving
/// left-to-right parameter order.
pub(crate) fn join_rendered(parts: Vec<Rendered>, separator: &str) -> Rendered {
    let mut sql_parts = Vec::with_capacity(parts.len());
    let mut params = Vec::new();
    for (sql, mut p) in parts {
        sql_parts.push(sql);
        params.append(&mut p);
    }
    (sql_parts.join(separator), params)
}
