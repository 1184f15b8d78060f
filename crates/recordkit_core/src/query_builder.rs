//! The fluent query builder: the ActiveRecord-style surface applications
//! actually call, sitting on top of the expression tree in [`crate::expr`].
//!
//! `QueryBuilder` accumulates clauses and defers every validation the
//! underlying [`QueryExpression`] already performs (HAVING-without-GROUP-BY,
//! OFFSET-without-LIMIT) to [`Self::to_sql`]/the terminal methods, rather than
//! re-checking them here.

use crate::backend::StorageBackend;
use crate::capabilities::SetOperations;
use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::expr::{
    Column, CteDefinition, Expr, ExplainExpression, ExplainOptions, ForUpdateOptions, FunctionCall, JoinClause, JoinCondition,
    JoinKind, LimitOffset, OrderByItem, OrderDirection, Predicate, QueryExpression, Rendered, SelectItem, SetOperationExpression,
    TableExpression, WithQueryExpression,
};
use crate::query::Row;
use crate::value::Value;

/// Accumulates a single `SELECT`'s clauses and renders them through a
/// caller-supplied dialect. Not `Clone` — clauses hold `Box<dyn Expr>`, the
/// same reason [`QueryExpression`] isn't.
pub struct QueryBuilder {
    query: QueryExpression,
}

impl QueryBuilder {
    pub fn from_table(table: impl Into<String>) -> Self {
        let mut query = QueryExpression::new();
        query.from = Some(Box::new(TableExpression::new(table)));
        Self { query }
    }

    pub fn from_expr(source: impl Expr + 'static) -> Self {
        let mut query = QueryExpression::new();
        query.from = Some(Box::new(source));
        Self { query }
    }

    pub fn select(mut self, item: SelectItem) -> Self {
        self.query.select.push(item);
        self
    }

    pub fn select_all(self) -> Self {
        self.select(SelectItem::Wildcard(crate::expr::Wildcard::new()))
    }

    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.query.where_clause.and(predicate);
        self
    }

    pub fn or_where(mut self, predicate: Predicate) -> Self {
        self.query.where_clause.or(predicate);
        self
    }

    pub fn join(mut self, kind: JoinKind, source: impl Expr + 'static, condition: Option<JoinCondition>) -> Self {
        self.query.joins.push(JoinClause::new(kind, Box::new(source), condition));
        self
    }

    pub fn inner_join(self, source: impl Expr + 'static, on: Predicate) -> Self {
        self.join(JoinKind::Inner, source, Some(JoinCondition::On(on)))
    }

    pub fn left_join(self, source: impl Expr + 'static, on: Predicate) -> Self {
        self.join(JoinKind::Left, source, Some(JoinCondition::On(on)))
    }

    pub fn cross_join(self, source: impl Expr + 'static) -> Self {
        self.join(JoinKind::Cross, source, None)
    }

    pub fn group_by(mut self, expr: impl Expr + 'static) -> Self {
        self.query.group_by_having.group_by.push(Box::new(expr));
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.query.group_by_having.having = Some(match self.query.group_by_having.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Add `COUNT(*) AS <alias>` (or `COUNT(<column>) AS <alias>` when a
    /// column name is given) to the select list, for use alongside
    /// `group_by`. For a scalar count over the whole query, use
    /// [`Self::count`] as a terminal instead.
    pub fn count_aggregate(self, column: Option<&str>, alias: impl Into<String>) -> Self {
        let call = match column {
            Some(name) => FunctionCall::count(Column::new(name), false),
            None => FunctionCall::count_all(),
        };
        self.select(SelectItem::aliased(call, alias))
    }

    pub fn sum_aggregate(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select(SelectItem::aliased(FunctionCall::sum(Column::new(column), false), alias))
    }

    pub fn avg_aggregate(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select(SelectItem::aliased(FunctionCall::avg(Column::new(column), false), alias))
    }

    pub fn min_aggregate(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select(SelectItem::aliased(FunctionCall::min(Column::new(column)), alias))
    }

    pub fn max_aggregate(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select(SelectItem::aliased(FunctionCall::max(Column::new(column)), alias))
    }

    pub fn order_by(mut self, expr: impl Expr + 'static, direction: OrderDirection) -> Self {
        self.query.order_by.push(OrderByItem::new(Box::new(expr), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit_offset.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query.limit_offset.offset = Some(offset);
        self
    }

    /// `LIMIT`/`OFFSET` together, the common pagination case.
    pub fn page(self, page_size: u64, page_number: u64) -> Self {
        self.limit(page_size).offset(page_size * page_number)
    }

    pub fn for_update(mut self, options: ForUpdateOptions) -> Self {
        self.query.for_update = Some(options);
        self
    }

    /// Wrap this query in a `UNION`/`INTERSECT`/`EXCEPT` with another.
    pub fn union_with(self, operator: SetOperations, other: QueryBuilder) -> SetOperationBuilder {
        SetOperationBuilder {
            expr: SetOperationExpression::new(self.query, operator, other.query),
        }
    }

    /// Wrap this query as the body of a `WITH` statement.
    pub fn with_cte(self, cte: CteDefinition) -> WithQueryBuilder {
        WithQueryBuilder {
            expr: WithQueryExpression::new(self.query).with_cte(cte),
        }
    }

    pub fn explain(self, options: ExplainOptions) -> ExplainBuilder {
        ExplainBuilder {
            expr: ExplainExpression::new(self.query, options),
        }
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> Result<(String, Vec<Value>), DbError> {
        let (sql, params) = self.query.render(dialect)?;
        Ok((crate::query::renumber_placeholders(&sql, dialect), params))
    }

    pub fn all(&self, backend: &dyn StorageBackend) -> Result<Vec<Row>, DbError> {
        let (sql, params) = self.to_sql(backend.dialect())?;
        backend.fetch_all(&sql, &params)
    }

    /// Execute with `LIMIT 1` forced for this render only; the builder's own
    /// limit/offset (if any) is left untouched for subsequent terminals.
    pub fn one(&self, backend: &dyn StorageBackend) -> Result<Option<Row>, DbError> {
        let dialect = backend.dialect();
        let forced = LimitOffset { limit: Some(1), offset: self.query.limit_offset.offset };
        let (sql, params) = self.query.render_with_limit(dialect, forced)?;
        let sql = crate::query::renumber_placeholders(&sql, dialect);
        backend.fetch_one(&sql, &params)
    }

    /// Terminal for GROUP BY / aggregate-column / set-operation queries:
    /// always returns a list, even when it holds a single scalar row.
    pub fn aggregate(&self, backend: &dyn StorageBackend) -> Result<Vec<Row>, DbError> {
        self.all(backend)
    }

    pub fn count(&self, backend: &dyn StorageBackend) -> Result<i64, DbError> {
        let (sql, params) = self.to_sql(backend.dialect())?;
        let wrapped = format!("SELECT COUNT(*) FROM ({sql}) AS count_subquery");
        let row = backend
            .fetch_one(&wrapped, &params)?
            .ok_or_else(|| DbError::query("COUNT query returned no rows"))?;
        match row.first() {
            Some(Value::Int(n)) => Ok(*n),
            Some(other) => Err(DbError::TypeConversion(format!("expected integer count, got {other:?}"))),
            None => Err(DbError::query("COUNT query returned an empty row")),
        }
    }

    /// Scalar `SUM(column)` over this query, run as a terminal. For a
    /// grouped aggregate column instead, use [`Self::sum_aggregate`].
    pub fn sum(&self, column: &str, backend: &dyn StorageBackend) -> Result<Value, DbError> {
        self.scalar_aggregate(FunctionCall::sum(Column::new(column), false), "sum_subquery", backend)
    }

    /// Scalar `AVG(column)` over this query, run as a terminal. For a
    /// grouped aggregate column instead, use [`Self::avg_aggregate`].
    pub fn avg(&self, column: &str, backend: &dyn StorageBackend) -> Result<Value, DbError> {
        self.scalar_aggregate(FunctionCall::avg(Column::new(column), false), "avg_subquery", backend)
    }

    /// Scalar `MIN(column)` over this query, run as a terminal. For a
    /// grouped aggregate column instead, use [`Self::min_aggregate`].
    pub fn min(&self, column: &str, backend: &dyn StorageBackend) -> Result<Value, DbError> {
        self.scalar_aggregate(FunctionCall::min(Column::new(column)), "min_subquery", backend)
    }

    /// Scalar `MAX(column)` over this query, run as a terminal. For a
    /// grouped aggregate column instead, use [`Self::max_aggregate`].
    pub fn max(&self, column: &str, backend: &dyn StorageBackend) -> Result<Value, DbError> {
        self.scalar_aggregate(FunctionCall::max(Column::new(column)), "max_subquery", backend)
    }

    fn scalar_aggregate(&self, call: FunctionCall, subquery_alias: &str, backend: &dyn StorageBackend) -> Result<Value, DbError> {
        let dialect = backend.dialect();
        let (sql, params) = self.to_sql(dialect)?;
        let (call_sql, _) = call.render(dialect)?;
        let wrapped = format!("SELECT {call_sql} FROM ({sql}) AS {subquery_alias}");
        let row = backend
            .fetch_one(&wrapped, &params)?
            .ok_or_else(|| DbError::query("aggregate query returned no rows"))?;
        row.first().cloned().ok_or_else(|| DbError::query("aggregate query returned an empty row"))
    }
}

pub struct SetOperationBuilder {
    expr: SetOperationExpression,
}

impl SetOperationBuilder {
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> Result<(String, Vec<Value>), DbError> {
        self.expr.render(dialect)
    }
}

pub struct WithQueryBuilder {
    expr: WithQueryExpression,
}

impl WithQueryBuilder {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.expr.recursive = recursive;
        self
    }

    pub fn with_cte(mut self, cte: CteDefinition) -> Self {
        self.expr.ctes.push(cte);
        self
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        self.expr.render(dialect)
    }
}

pub struct ExplainBuilder {
    expr: ExplainExpression,
}

impl ExplainBuilder {
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        self.expr.render(dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;
    use crate::expr::{Column, Literal};

    #[test]
    fn select_all_where_order_limit_renders_in_clause_order() {
        let dialect = AnsiDialect::new();
        let (sql, params) = QueryBuilder::from_table("users")
            .select_all()
            .where_(Column::new("active").into_value_expr().eq(Literal::new(Value::Bool(true)).into_value_expr()))
            .order_by(Column::new("id"), OrderDirection::Asc)
            .limit(10)
            .to_sql(&dialect)
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE \"active\" = ? ORDER BY \"id\" ASC LIMIT ?");
        assert_eq!(params, vec![Value::Bool(true), Value::Int(10)]);
    }

    #[test]
    fn having_without_group_by_surfaces_as_a_validation_error() {
        let dialect = AnsiDialect::new();
        let builder = QueryBuilder::from_table("orders")
            .select_all()
            .having(Column::new("total").into_value_expr().gt(Literal::new(Value::Int(100)).into_value_expr()));
        assert!(builder.to_sql(&dialect).is_err());
    }

    #[test]
    fn page_computes_limit_and_offset() {
        let dialect = AnsiDialect::new();
        let (sql, params) = QueryBuilder::from_table("items").select_all().page(20, 2).to_sql(&dialect).unwrap();
        assert_eq!(sql, "SELECT * FROM \"items\" LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::Int(20), Value::Int(40)]);
    }

    #[test]
    fn union_with_combines_two_queries() {
        let dialect = AnsiDialect::new();
        let a = QueryBuilder::from_table("active_users").select_all();
        let b = QueryBuilder::from_table("pending_users").select_all();
        let (sql, _) = a.union_with(SetOperations::UNION, b).to_sql(&dialect).unwrap();
        assert_eq!(sql, "SELECT * FROM \"active_users\" UNION SELECT * FROM \"pending_users\"");
    }

    #[test]
    fn group_by_with_count_aggregate_and_having_renders_in_order() {
        let dialect = AnsiDialect::new();
        let (sql, params) = QueryBuilder::from_table("users")
            .select(SelectItem::expr(Column::new("status")))
            .count_aggregate(None, "n")
            .group_by(Column::new("status"))
            .having(Column::new("n").into_value_expr().gt(Literal::new(Value::Int(5)).into_value_expr()))
            .to_sql(&dialect)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"status\", COUNT(*) AS \"n\" FROM \"users\" GROUP BY \"status\" HAVING \"n\" > ?"
        );
        assert_eq!(params, vec![Value::Int(5)]);
    }

    #[test]
    fn one_forces_limit_one_without_mutating_the_builder() {
        let dialect = AnsiDialect::new();
        let builder = QueryBuilder::from_table("users").select_all().limit(50);
        let (sql, params) = builder.query.render_with_limit(&dialect, LimitOffset { limit: Some(1), offset: None }).unwrap();
        assert!(sql.ends_with("LIMIT ?"));
        assert_eq!(params.last(), Some(&Value::Int(1)));
        // The builder's own state is untouched: a subsequent `to_sql` still reports the original limit.
        let (resumed_sql, resumed_params) = builder.to_sql(&dialect).unwrap();
        assert!(resumed_sql.ends_with("LIMIT ?"));
        assert_eq!(resumed_params.last(), Some(&Value::Int(50)));
    }
}
