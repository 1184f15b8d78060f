//! Full statements: the `SELECT` body, set operations combining two of them,
//! `WITH` prefixes, and `EXPLAIN` wrapping.

use super::clause::{ForUpdateOptions, GroupByHaving, JoinClause, LimitOffset, OrderBy, QualifyClause, WhereClause};
use super::{join_rendered, Expr, Rendered};
use crate::capabilities::SetOperations;
use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::query_safety::validate_identifier;

/// One entry in a `SELECT` list: either the whole-row/table wildcard, or a
/// value expression with an optional alias.
#[derive(Debug)]
pub enum SelectItem {
    Wildcard(super::leaf::Wildcard),
    Expr { expr: Box<dyn Expr>, alias: Option<String> },
}

impl SelectItem {
    pub fn expr(expr: impl Expr + 'static) -> Self {
        Self::Expr { expr: Box::new(expr), alias: None }
    }

    pub fn aliased(expr: impl Expr + 'static, alias: impl Into<String>) -> Self {
        Self::Expr { expr: Box::new(expr), alias: Some(alias.into()) }
    }

    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        match self {
            SelectItem::Wildcard(w) => w.render(dialect),
            SelectItem::Expr { expr, alias } => {
                let (sql, params) = expr.render(dialect)?;
                match alias {
                    Some(alias) => {
                        validate_identifier(alias)?;
                        Ok((format!("{sql} AS {}", dialect.quote_identifier(alias)), params))
                    }
                    None => Ok((sql, params)),
                }
            }
        }
    }
}

/// A complete `SELECT` statement body: projection, source, joins, and every
/// downstream clause. Clause order on render follows standard SQL:
/// `SELECT` → `FROM`/`JOIN` → `WHERE` → `GROUP BY`/`HAVING` → `ORDER BY` →
/// `LIMIT`/`OFFSET` → `FOR UPDATE`.
#[derive(Debug, Default)]
pub struct QueryExpression {
    pub select: Vec<SelectItem>,
    pub from: Option<Box<dyn Expr>>,
    pub joins: Vec<JoinClause>,
    pub where_clause: WhereClause,
    pub group_by_having: GroupByHaving,
    pub qualify: QualifyClause,
    pub order_by: OrderBy,
    pub limit_offset: LimitOffset,
    pub for_update: Option<ForUpdateOptions>,
}

impl QueryExpression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryExpression {
    /// Render with `limit_offset` substituted for [`Self::limit_offset`],
    /// leaving every other clause untouched. Used by the query builder's
    /// `one()` terminal to force `LIMIT 1` for one render without needing
    /// `Clone` on the rest of the (boxed-trait-object-holding) tree.
    pub(crate) fn render_with_limit(&self, dialect: &dyn SqlDialect, limit_offset: LimitOffset) -> Result<Rendered, DbError> {
        self.render_inner(dialect, limit_offset)
    }

    fn render_inner(&self, dialect: &dyn SqlDialect, limit_offset: LimitOffset) -> Result<Rendered, DbError> {
        if self.group_by_having.having.is_some() && self.group_by_having.group_by.is_empty() {
            return Err(DbError::validation("HAVING requires at least one GROUP BY expression"));
        }

        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");

        if self.select.is_empty() {
            sql.push('*');
        } else {
            let mut rendered = Vec::with_capacity(self.select.len());
            for item in &self.select {
                rendered.push(item.render(dialect)?);
            }
            let (select_sql, mut select_params) = join_rendered(rendered, ", ");
            sql.push_str(&select_sql);
            params.append(&mut select_params);
        }

        if let Some(from) = &self.from {
            let (from_sql, mut from_params) = from.render(dialect)?;
            sql.push_str(" FROM ");
            sql.push_str(&from_sql);
            params.append(&mut from_params);
        }

        for join in &self.joins {
            let (join_sql, mut join_params) = join.render(dialect)?;
            sql.push(' ');
            sql.push_str(&join_sql);
            params.append(&mut join_params);
        }

        if let Some((where_sql, mut where_params)) = self.where_clause.render(dialect)? {
            sql.push(' ');
            sql.push_str(&where_sql);
            params.append(&mut where_params);
        }

        if let Some((group_sql, mut group_params)) = self.group_by_having.render(dialect)? {
            sql.push(' ');
            sql.push_str(&group_sql);
            params.append(&mut group_params);
        }

        if let Some((qualify_sql, mut qualify_params)) = self.qualify.render(dialect)? {
            sql.push(' ');
            sql.push_str(&qualify_sql);
            params.append(&mut qualify_params);
        }

        if let Some((order_sql, mut order_params)) = self.order_by.render(dialect)? {
            sql.push(' ');
            sql.push_str(&order_sql);
            params.append(&mut order_params);
        }

        if let Some((limit_sql, mut limit_params)) = limit_offset.render(dialect)? {
            sql.push(' ');
            sql.push_str(&limit_sql);
            params.append(&mut limit_params);
        }

        if let Some(for_update) = &self.for_update {
            sql.push(' ');
            sql.push_str(&dialect.for_update_clause(for_update)?);
        }

        Ok((sql, params))
    }
}

impl Expr for QueryExpression {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        self.render_inner(dialect, self.limit_offset)
    }
}

/// `left OP right`, where `OP` is one of the [`SetOperations`] flags.
#[derive(Debug)]
pub struct SetOperationExpression {
    pub left: Box<dyn Expr>,
    pub operator: SetOperations,
    pub right: Box<dyn Expr>,
}

impl SetOperationExpression {
    pub fn new(left: impl Expr + 'static, operator: SetOperations, right: impl Expr + 'static) -> Self {
        Self {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }
}

impl Expr for SetOperationExpression {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let keyword = dialect.set_operation_keyword(self.operator)?;
        let (left_sql, mut params) = self.left.render(dialect)?;
        let (right_sql, right_params) = self.right.render(dialect)?;
        params.extend(right_params);
        Ok((format!("{left_sql} {keyword} {right_sql}"), params))
    }
}

/// A single `name AS (query)` entry in a `WITH` clause.
#[derive(Debug)]
pub struct CteDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Box<dyn Expr>,
    pub materialized: Option<bool>,
}

impl CteDefinition {
    pub fn new(name: impl Into<String>, query: impl Expr + 'static) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            query: Box::new(query),
            materialized: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_materialized(mut self, materialized: bool) -> Self {
        self.materialized = Some(materialized);
        self
    }

    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        use crate::capabilities::CteFeatures;

        validate_identifier(&self.name)?;
        let mut head = dialect.quote_identifier(&self.name);

        if !self.columns.is_empty() {
            for column in &self.columns {
                validate_identifier(column)?;
            }
            let quoted: Vec<String> = self.columns.iter().map(|c| dialect.quote_identifier(c)).collect();
            head.push_str(&format!("({})", quoted.join(", ")));
        }

        let materialized_sql = match self.materialized {
            Some(flag) => {
                if !dialect.capabilities().supports_cte_feature(CteFeatures::MATERIALIZED) {
                    return Err(DbError::CTENotSupported("MATERIALIZED".to_string()));
                }
                if flag { " MATERIALIZED" } else { " NOT MATERIALIZED" }
            }
            None => "",
        };

        let (query_sql, params) = self.query.render(dialect)?;
        Ok((format!("{head} AS{materialized_sql} ({query_sql})"), params))
    }
}

/// `WITH [RECURSIVE] cte[, cte...] body`.
#[derive(Debug)]
pub struct WithQueryExpression {
    pub recursive: bool,
    pub ctes: Vec<CteDefinition>,
    pub body: Box<dyn Expr>,
}

impl WithQueryExpression {
    pub fn new(body: impl Expr + 'static) -> Self {
        Self {
            recursive: false,
            ctes: Vec::new(),
            body: Box::new(body),
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_cte(mut self, cte: CteDefinition) -> Self {
        self.ctes.push(cte);
        self
    }
}

impl Expr for WithQueryExpression {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        if self.ctes.is_empty() {
            return Err(DbError::validation("a WITH query requires at least one CTE"));
        }

        let prefix = dialect.cte_prefix(self.recursive)?;
        let mut rendered = Vec::with_capacity(self.ctes.len());
        for cte in &self.ctes {
            rendered.push(cte.render(dialect)?);
        }
        let (cte_sql, mut params) = join_rendered(rendered, ", ");

        let (body_sql, body_params) = self.body.render(dialect)?;
        params.extend(body_params);

        Ok((format!("{prefix} {cte_sql} {body_sql}"), params))
    }
}

/// `EXPLAIN [options] inner`. `raw`/`structured` on the eventual execution
/// result are populated by the backend from the driver's own `EXPLAIN`
/// output; this node only renders the request.
#[derive(Debug, Clone, Default)]
pub struct ExplainOptions {
    pub analyze: bool,
    pub verbose: bool,
    pub buffers: bool,
    pub format: Option<String>,
}

impl ExplainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_buffers(mut self, buffers: bool) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

#[derive(Debug)]
pub struct ExplainExpression {
    pub inner: Box<dyn Expr>,
    pub options: ExplainOptions,
}

impl ExplainExpression {
    pub fn new(inner: impl Expr + 'static, options: ExplainOptions) -> Self {
        Self {
            inner: Box::new(inner),
            options,
        }
    }
}

impl Expr for ExplainExpression {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let prefix = dialect.explain_prefix(&self.options)?;
        let (inner_sql, params) = self.inner.render(dialect)?;
        Ok((format!("{prefix} {inner_sql}"), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;
    use crate::expr::leaf::{Column, Literal, TableExpression};
    use crate::value::Value;

    #[test]
    fn bare_select_defaults_to_wildcard() {
        let dialect = AnsiDialect::new();
        let mut query = QueryExpression::new();
        query.from = Some(Box::new(TableExpression::new("users")));
        let (sql, params) = query.render(&dialect).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\"");
        assert!(params.is_empty());
    }

    #[test]
    fn having_without_group_by_is_rejected() {
        let dialect = AnsiDialect::new();
        let mut query = QueryExpression::new();
        query.from = Some(Box::new(TableExpression::new("users")));
        query.group_by_having.having =
            Some(Column::new("id").into_value_expr().gt(Literal::new(Value::Int(1)).into_value_expr()));
        assert!(query.render(&dialect).is_err());
    }

    #[test]
    fn with_query_renders_recursive_prefix() {
        let dialect = AnsiDialect::new();
        let mut base = QueryExpression::new();
        base.from = Some(Box::new(TableExpression::new("nums")));
        let with = WithQueryExpression::new(base)
            .with_recursive(true)
            .with_cte(CteDefinition::new("nums", {
                let mut inner = QueryExpression::new();
                inner.select.push(SelectItem::expr(Literal::new(Value::Int(1))));
                inner
            }));
        let (sql, _) = with.render(&dialect).unwrap();
        assert!(sql.starts_with("WITH RECURSIVE \"nums\" AS (SELECT ?) SELECT * FROM \"nums\""));
    }

    #[test]
    fn explain_renders_prefix_before_inner_statement() {
        let dialect = AnsiDialect::new();
        let mut query = QueryExpression::new();
        query.from = Some(Box::new(TableExpression::new("users")));
        let explain = ExplainExpression::new(query, ExplainOptions::new());
        let (sql, _) = explain.render(&dialect).unwrap();
        assert_eq!(sql, "EXPLAIN SELECT * FROM \"users\"");
    }
}
