//! Clause-level composition: the pieces a statement assembles around its
//! core `SELECT`/`FROM` — `WHERE`, `GROUP BY`/`HAVING`, `ORDER BY`,
//! `LIMIT`/`OFFSET`, joins, and locking. Each renders the fragment for its
//! own clause only; a statement is responsible for ordering and joining
//! them.

use super::predicate::Predicate;
use super::{join_rendered, Expr, Rendered};
use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::query_safety::validate_identifier;
use crate::value::Value;

/// Wraps the `WHERE` predicate, if any. `and`/`or` compose an additional
/// predicate into whatever is already present rather than replacing it,
/// mirroring how a query builder accumulates conditions across repeated
/// calls.
#[derive(Debug, Default)]
pub struct WhereClause(Option<Predicate>);

impl WhereClause {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn and(&mut self, predicate: Predicate) {
        self.0 = Some(match self.0.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    pub fn or(&mut self, predicate: Predicate) {
        self.0 = Some(match self.0.take() {
            Some(existing) => existing.or(predicate),
            None => predicate,
        });
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Option<Rendered>, DbError> {
        match &self.0 {
            Some(predicate) => {
                let (sql, params) = predicate.render(dialect)?;
                Ok(Some((format!("WHERE {sql}"), params)))
            }
            None => Ok(None),
        }
    }
}

/// `GROUP BY` expressions plus an optional `HAVING` predicate. `HAVING`
/// without any grouping expression is a builder-level composition error,
/// raised by the caller that assembles the full statement rather than here.
#[derive(Debug, Default)]
pub struct GroupByHaving {
    pub group_by: Vec<Box<dyn Expr>>,
    pub having: Option<Predicate>,
}

impl GroupByHaving {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.group_by.is_empty() && self.having.is_none()
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Option<Rendered>, DbError> {
        if self.group_by.is_empty() {
            return Ok(None);
        }

        let mut rendered = Vec::with_capacity(self.group_by.len());
        for expr in &self.group_by {
            rendered.push(expr.render(dialect)?);
        }
        let (group_sql, mut params) = join_rendered(rendered, ", ");
        let mut sql = format!("GROUP BY {group_sql}");

        if let Some(having) = &self.having {
            let (having_sql, having_params) = having.render(dialect)?;
            sql.push_str(" HAVING ");
            sql.push_str(&having_sql);
            params.extend(having_params);
        }

        Ok(Some((sql, params)))
    }
}

/// `QUALIFY predicate` — filters rows after window functions are evaluated,
/// the window-function analogue of `HAVING` for aggregates. Only a handful
/// of dialects support it; rendering delegates to
/// [`SqlDialect::qualify_clause`], which gates on `Protocol::Qualify`.
#[derive(Debug, Default)]
pub struct QualifyClause(Option<Predicate>);

impl QualifyClause {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn set(&mut self, predicate: Predicate) {
        self.0 = Some(predicate);
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Option<Rendered>, DbError> {
        match &self.0 {
            Some(predicate) => {
                let (predicate_sql, params) = predicate.render(dialect)?;
                Ok(Some((dialect.qualify_clause(&predicate_sql)?, params)))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    fn token(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug)]
pub struct OrderByItem {
    pub expr: Box<dyn Expr>,
    pub direction: OrderDirection,
    pub nulls_first: Option<bool>,
}

impl OrderByItem {
    pub fn new(expr: Box<dyn Expr>, direction: OrderDirection) -> Self {
        Self {
            expr,
            direction,
            nulls_first: None,
        }
    }

    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = Some(nulls_first);
        self
    }
}

#[derive(Debug, Default)]
pub struct OrderBy(pub Vec<OrderByItem>);

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, item: OrderByItem) {
        self.0.push(item);
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Option<Rendered>, DbError> {
        if self.0.is_empty() {
            return Ok(None);
        }

        let mut params = Vec::new();
        let mut items = Vec::with_capacity(self.0.len());
        for item in &self.0 {
            let (sql, item_params) = item.expr.render(dialect)?;
            params.extend(item_params);
            let nulls = match item.nulls_first {
                Some(true) => " NULLS FIRST",
                Some(false) => " NULLS LAST",
                None => "",
            };
            items.push(format!("{sql} {}{nulls}", item.direction.token()));
        }

        Ok(Some((format!("ORDER BY {}", items.join(", ")), params)))
    }
}

/// `OVER (...)` window specification: an optional `PARTITION BY` list, an
/// `ORDER BY` list, and an optional frame clause rendered verbatim (`ROWS
/// BETWEEN ...`) since frame syntax doesn't otherwise vary across the
/// backends this workspace ships.
#[derive(Debug, Default)]
pub struct OverClause {
    pub partition_by: Vec<Box<dyn Expr>>,
    pub order_by: OrderBy,
    pub frame: Option<String>,
}

impl OverClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition_by(mut self, expr: impl Expr + 'static) -> Self {
        self.partition_by.push(Box::new(expr));
        self
    }

    pub fn with_order_by(mut self, item: OrderByItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let mut params = Vec::new();
        let mut parts = Vec::new();

        if !self.partition_by.is_empty() {
            let mut rendered = Vec::with_capacity(self.partition_by.len());
            for expr in &self.partition_by {
                rendered.push(expr.render(dialect)?);
            }
            let (partition_sql, mut partition_params) = join_rendered(rendered, ", ");
            parts.push(format!("PARTITION BY {partition_sql}"));
            params.append(&mut partition_params);
        }

        if let Some((order_sql, mut order_params)) = self.order_by.render(dialect)? {
            parts.push(order_sql);
            params.append(&mut order_params);
        }

        if let Some(frame) = &self.frame {
            parts.push(frame.clone());
        }

        Ok((format!("OVER ({})", parts.join(" ")), params))
    }
}

/// `LIMIT`/`OFFSET`. An offset without a limit is valid SQL on some dialects
/// and rejected on others; [`crate::dialect::SqlDialect::supports_offset_without_limit`]
/// lets a caller check before building rather than discovering it at render
/// time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Option<Rendered>, DbError> {
        if self.is_empty() {
            return Ok(None);
        }

        if self.limit.is_none() && self.offset.is_some() && !dialect.supports_offset_without_limit() {
            return Err(DbError::validation(
                "this dialect requires a LIMIT whenever an OFFSET is present",
            ));
        }

        let mut parts = Vec::new();
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            parts.push("LIMIT ?".to_string());
            params.push(Value::Int(limit as i64));
        }
        if let Some(offset) = self.offset {
            parts.push("OFFSET ?".to_string());
            params.push(Value::Int(offset as i64));
        }
        Ok(Some((parts.join(" "), params)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug)]
pub enum JoinCondition {
    On(Predicate),
    Using(Vec<String>),
}

#[derive(Debug)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: Box<dyn Expr>,
    pub condition: Option<JoinCondition>,
}

impl JoinClause {
    pub fn new(kind: JoinKind, source: Box<dyn Expr>, condition: Option<JoinCondition>) -> Self {
        Self { kind, source, condition }
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let (source_sql, mut params) = self.source.render(dialect)?;
        let mut sql = format!("{} {source_sql}", self.kind.keyword());

        match &self.condition {
            Some(JoinCondition::On(predicate)) => {
                let (cond_sql, cond_params) = predicate.render(dialect)?;
                sql.push_str(" ON ");
                sql.push_str(&cond_sql);
                params.extend(cond_params);
            }
            Some(JoinCondition::Using(columns)) => {
                for column in columns {
                    validate_identifier(column)?;
                }
                let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_identifier(c)).collect();
                sql.push_str(&format!(" USING ({})", quoted.join(", ")));
            }
            None => {
                if self.kind != JoinKind::Cross {
                    return Err(DbError::validation(format!(
                        "{:?} requires an ON or USING condition",
                        self.kind
                    )));
                }
            }
        }

        Ok((sql, params))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForUpdateStrength {
    Update,
    Share,
}

#[derive(Debug, Clone, Default)]
pub struct ForUpdateOptions {
    pub strength: Option<ForUpdateStrength>,
    pub of: Vec<String>,
    pub nowait: bool,
    pub skip_locked: bool,
}

impl ForUpdateOptions {
    pub fn update() -> Self {
        Self {
            strength: Some(ForUpdateStrength::Update),
            ..Self::default()
        }
    }

    pub fn share() -> Self {
        Self {
            strength: Some(ForUpdateStrength::Share),
            ..Self::default()
        }
    }

    pub fn with_of(mut self, columns: Vec<String>) -> Self {
        self.of = columns;
        self
    }

    pub fn with_nowait(mut self) -> Self {
        self.nowait = true;
        self
    }

    pub fn with_skip_locked(mut self) -> Self {
        self.skip_locked = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;
    use crate::expr::leaf::{Column, Literal, TableExpression};
    use crate::value::Value;

    #[test]
    fn where_clause_starts_empty_and_accumulates_with_and() {
        let dialect = AnsiDialect::new();
        let mut clause = WhereClause::new();
        assert!(clause.render(&dialect).unwrap().is_none());

        clause.and(Column::new("active").into_value_expr().eq(Literal::new(Value::Bool(true)).into_value_expr()));
        clause.and(Column::new("age").into_value_expr().gt(Literal::new(Value::Int(18)).into_value_expr()));

        let (sql, params) = clause.render(&dialect).unwrap().unwrap();
        assert_eq!(sql, "WHERE (\"active\" = ? AND \"age\" > ?)");
        assert_eq!(params, vec![Value::Bool(true), Value::Int(18)]);
    }

    #[test]
    fn limit_offset_rejects_offset_without_limit_when_dialect_disallows() {
        struct NoOffsetOnlyDialect(AnsiDialect);
        impl SqlDialect for NoOffsetOnlyDialect {
            fn quote_identifier(&self, n: &str) -> String { self.0.quote_identifier(n) }
            fn qualified_table(&self, s: Option<&str>, t: &str) -> String { self.0.qualified_table(s, t) }
            fn value_to_literal(&self, v: &crate::value::Value) -> String { self.0.value_to_literal(v) }
            fn escape_string(&self, s: &str) -> String { self.0.escape_string(s) }
            fn placeholder_style(&self) -> crate::dialect::PlaceholderStyle { self.0.placeholder_style() }
            fn capabilities(&self) -> &crate::capabilities::Capabilities { self.0.capabilities() }
            fn supports_offset_without_limit(&self) -> bool { false }
        }

        let dialect = NoOffsetOnlyDialect(AnsiDialect::new());
        let opts = LimitOffset { limit: None, offset: Some(10) };
        assert!(opts.render(&dialect).is_err());
    }

    #[test]
    fn limit_offset_renders_placeholders_not_literals() {
        let dialect = AnsiDialect::new();
        let opts = LimitOffset { limit: Some(10), offset: Some(20) };
        let (sql, params) = opts.render(&dialect).unwrap().unwrap();
        assert_eq!(sql, "LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::Int(10), Value::Int(20)]);
    }

    #[test]
    fn qualify_clause_is_empty_until_set_and_rejected_by_a_dialect_without_support() {
        let dialect = AnsiDialect::new();
        let mut qualify = QualifyClause::new();
        assert!(qualify.is_empty());
        assert!(qualify.render(&dialect).unwrap().is_none());

        qualify.set(Column::new("rn").into_value_expr().eq(Literal::new(Value::Int(1)).into_value_expr()));
        assert!(!qualify.is_empty());
        let err = qualify.render(&dialect).unwrap_err();
        assert!(matches!(err, DbError::Operational(_)));
    }

    #[test]
    fn cross_join_needs_no_condition_but_inner_join_does() {
        let dialect = AnsiDialect::new();
        let cross = JoinClause::new(JoinKind::Cross, Box::new(TableExpression::new("b")), None);
        assert!(cross.render(&dialect).is_ok());

        let inner = JoinClause::new(JoinKind::Inner, Box::new(TableExpression::new("b")), None);
        assert!(inner.render(&dialect).is_err());
    }

    #[test]
    fn order_by_renders_direction_and_nulls() {
        let dialect = AnsiDialect::new();
        let mut order = OrderBy::new();
        order.push(OrderByItem::new(Box::new(Column::new("created_at")), OrderDirection::Desc).with_nulls_first(true));
        let (sql, _) = order.render(&dialect).unwrap().unwrap();
        assert_eq!(sql, "ORDER BY \"created_at\" DESC NULLS FIRST");
    }

    #[test]
    fn over_clause_renders_partition_and_order_with_no_extra_params() {
        let dialect = AnsiDialect::new();
        let over = OverClause::new()
            .with_partition_by(Column::new("dept"))
            .with_order_by(OrderByItem::new(Box::new(Column::new("salary")), OrderDirection::Desc));
        let (sql, params) = over.render(&dialect).unwrap();
        assert_eq!(sql, "OVER (PARTITION BY \"dept\" ORDER BY \"salary\" DESC)");
        assert!(params.is_empty());
    }
}
