use super::clause::OverClause;
use super::predicate::{BetweenPredicate, BinaryArithOp, BinaryArithmeticExpression, ComparisonOp, ComparisonPredicate, InPredicate, IsNullPredicate, LikePredicate, Predicate};
use super::{Expr, Rendered};
use crate::capabilities::WindowFunctions;
use crate::dialect::{Protocol, SqlDialect};
use crate::error::DbError;
use crate::query_safety::validate_identifier;
use crate::value::Value;

/// A value-producing expression.
///
/// Wraps any node that yields a non-boolean value (a column, a literal, a
/// subquery, a raw SQL fragment, an arithmetic expression) and adds the
/// combinator surface the spec splits across `ValueExpression`, `Comparable`
/// and `StringExpression`: those three collapse into this single newtype,
/// since every value-producing node in this tree needs the same comparison,
/// membership, range and pattern-match operators regardless of its source
/// (there is no dialect-level distinction between a "comparable" and a
/// "string" value the way a statically typed column model might draw one).
#[derive(Debug)]
pub struct ValueExpr(pub(crate) Box<dyn Expr>);

impl ValueExpr {
    pub fn new(inner: impl Expr + 'static) -> Self {
        Self(Box::new(inner))
    }

    pub fn boxed(inner: Box<dyn Expr>) -> Self {
        Self(inner)
    }

    pub fn eq(self, other: ValueExpr) -> Predicate {
        Predicate::new(ComparisonPredicate::new(ComparisonOp::Eq, self.0, other.0))
    }

    pub fn ne(self, other: ValueExpr) -> Predicate {
        Predicate::new(ComparisonPredicate::new(ComparisonOp::Ne, self.0, other.0))
    }

    pub fn gt(self, other: ValueExpr) -> Predicate {
        Predicate::new(ComparisonPredicate::new(ComparisonOp::Gt, self.0, other.0))
    }

    pub fn gte(self, other: ValueExpr) -> Predicate {
        Predicate::new(ComparisonPredicate::new(ComparisonOp::Gte, self.0, other.0))
    }

    pub fn lt(self, other: ValueExpr) -> Predicate {
        Predicate::new(ComparisonPredicate::new(ComparisonOp::Lt, self.0, other.0))
    }

    pub fn lte(self, other: ValueExpr) -> Predicate {
        Predicate::new(ComparisonPredicate::new(ComparisonOp::Lte, self.0, other.0))
    }

    pub fn like(self, pattern: ValueExpr) -> Predicate {
        Predicate::new(LikePredicate::new(self.0, pattern.0, false, false))
    }

    pub fn ilike(self, pattern: ValueExpr) -> Predicate {
        Predicate::new(LikePredicate::new(self.0, pattern.0, true, false))
    }

    pub fn not_like(self, pattern: ValueExpr) -> Predicate {
        Predicate::new(LikePredicate::new(self.0, pattern.0, false, true))
    }

    pub fn between(self, low: ValueExpr, high: ValueExpr) -> Predicate {
        Predicate::new(BetweenPredicate::new(self.0, low.0, high.0, false))
    }

    pub fn not_between(self, low: ValueExpr, high: ValueExpr) -> Predicate {
        Predicate::new(BetweenPredicate::new(self.0, low.0, high.0, true))
    }

    pub fn in_list(self, set: Vec<ValueExpr>) -> Predicate {
        Predicate::new(InPredicate::new(self.0, set.into_iter().map(|v| v.0).collect(), false))
    }

    pub fn not_in(self, set: Vec<ValueExpr>) -> Predicate {
        Predicate::new(InPredicate::new(self.0, set.into_iter().map(|v| v.0).collect(), true))
    }

    pub fn is_null(self) -> Predicate {
        Predicate::new(IsNullPredicate::new(self.0, false))
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::new(IsNullPredicate::new(self.0, true))
    }

    pub fn add(self, other: ValueExpr) -> ValueExpr {
        ValueExpr::new(BinaryArithmeticExpression::new(BinaryArithOp::Add, self.0, other.0))
    }

    pub fn sub(self, other: ValueExpr) -> ValueExpr {
        ValueExpr::new(BinaryArithmeticExpression::new(BinaryArithOp::Sub, self.0, other.0))
    }

    pub fn mul(self, other: ValueExpr) -> ValueExpr {
        ValueExpr::new(BinaryArithmeticExpression::new(BinaryArithOp::Mul, self.0, other.0))
    }

    pub fn div(self, other: ValueExpr) -> ValueExpr {
        ValueExpr::new(BinaryArithmeticExpression::new(BinaryArithOp::Div, self.0, other.0))
    }

    pub fn rem(self, other: ValueExpr) -> ValueExpr {
        ValueExpr::new(BinaryArithmeticExpression::new(BinaryArithOp::Rem, self.0, other.0))
    }
}

impl Expr for ValueExpr {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        self.0.render(dialect)
    }
}

/// A column reference, optionally table-qualified.
#[derive(Debug, Clone)]
pub struct Column {
    pub table: Option<String>,
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn into_value_expr(self) -> ValueExpr {
        ValueExpr::new(self)
    }
}

impl Expr for Column {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        validate_identifier(&self.name)?;
        if let Some(table) = &self.table {
            validate_identifier(table)?;
        }
        let sql = match &self.table {
            Some(table) => format!("{}.{}", dialect.quote_identifier(table), dialect.quote_identifier(&self.name)),
            None => dialect.quote_identifier(&self.name),
        };
        Ok((sql, Vec::new()))
    }
}

/// A single parameter placeholder carrying its value.
#[derive(Debug, Clone)]
pub struct Literal(pub Value);

impl Literal {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_value_expr(self) -> ValueExpr {
        ValueExpr::new(self)
    }
}

impl Expr for Literal {
    fn render(&self, _dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        // Every leaf renders its placeholder as a bare `?`; a node has no
        // way to know its position in the fully-assembled statement, so
        // dialect-specific numbering ($1, :1, …) is applied in a single
        // left-to-right pass over the final SQL text, not here. See
        // `crate::query::renumber_placeholders`.
        Ok(("?".to_string(), vec![self.0.clone()]))
    }
}

/// `*`, or `table.*`. Never a `Literal("*")` — it renders without consuming
/// a parameter slot and without passing through identifier quoting.
#[derive(Debug, Clone, Default)]
pub struct Wildcard {
    pub table: Option<String>,
}

impl Wildcard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn qualified(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
        }
    }
}

impl Expr for Wildcard {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        match &self.table {
            Some(table) => {
                validate_identifier(table)?;
                Ok((format!("{}.*", dialect.quote_identifier(table)), Vec::new()))
            }
            None => Ok(("*".to_string(), Vec::new())),
        }
    }
}

/// Verbatim SQL text with out-of-band parameters. The text is emitted
/// unchanged; placeholders inside it must already match the target
/// dialect's placeholder style if the caller embeds any, or use `?` and let
/// the backend rewrite them before dispatch (rewriting is the backend's
/// responsibility, not this node's).
#[derive(Debug, Clone)]
pub struct RawSqlExpression {
    pub template: String,
    pub params: Vec<Value>,
}

impl RawSqlExpression {
    pub fn new(template: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            template: template.into(),
            params,
        }
    }

    pub fn into_value_expr(self) -> ValueExpr {
        ValueExpr::new(self)
    }
}

impl Expr for RawSqlExpression {
    fn render(&self, _dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        Ok((self.template.clone(), self.params.clone()))
    }
}

/// A table reference used as a query's `FROM` source, optionally aliased.
#[derive(Debug, Clone)]
pub struct TableExpression {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableExpression {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl Expr for TableExpression {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        validate_identifier(&self.name)?;
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }
        let base = dialect.qualified_table(self.schema.as_deref(), &self.name);
        let sql = match &self.alias {
            Some(alias) => {
                validate_identifier(alias)?;
                format!("{} AS {}", base, dialect.quote_identifier(alias))
            }
            None => base,
        };
        Ok((sql, Vec::new()))
    }
}

/// A parenthesized inner query used as a source or a value expression.
#[derive(Debug)]
pub struct Subquery {
    pub inner: Box<dyn Expr>,
    pub alias: Option<String>,
}

impl Subquery {
    pub fn new(inner: impl Expr + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl Expr for Subquery {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let (sql, params) = self.inner.render(dialect)?;
        let wrapped = format!("({sql})");
        match &self.alias {
            Some(alias) => {
                validate_identifier(alias)?;
                Ok((format!("{wrapped} AS {}", dialect.quote_identifier(alias)), params))
            }
            None => Ok((wrapped, params)),
        }
    }
}

/// The argument to an aggregate or scalar function call: `*`, a plain
/// expression, or `DISTINCT <expression>`.
#[derive(Debug)]
pub enum FunctionArg {
    Wildcard,
    Expr(Box<dyn Expr>),
    Distinct(Box<dyn Expr>),
}

/// A named SQL function applied to zero or more arguments — `COUNT(*)`,
/// `SUM("amount")`, `AVG(DISTINCT "rating")`. Covers both the aggregate
/// function families §4.6 asks for (`count`/`sum`/`avg`/`min`/`max`) and
/// arbitrary scalar functions a dialect handler wants to emit, so the tree
/// does not need a separate node type per function name.
#[derive(Debug)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<FunctionArg>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<FunctionArg>) -> Self {
        Self { name: name.into(), args }
    }

    /// `COUNT(*)`.
    pub fn count_all() -> Self {
        Self::new("COUNT", vec![FunctionArg::Wildcard])
    }

    /// `COUNT(<expr>)`, or `COUNT(DISTINCT <expr>)` when `distinct` is set.
    pub fn count(arg: impl Expr + 'static, distinct: bool) -> Self {
        Self::new("COUNT", vec![wrap_arg(arg, distinct)])
    }

    pub fn sum(arg: impl Expr + 'static, distinct: bool) -> Self {
        Self::new("SUM", vec![wrap_arg(arg, distinct)])
    }

    pub fn avg(arg: impl Expr + 'static, distinct: bool) -> Self {
        Self::new("AVG", vec![wrap_arg(arg, distinct)])
    }

    pub fn min(arg: impl Expr + 'static) -> Self {
        Self::new("MIN", vec![FunctionArg::Expr(Box::new(arg))])
    }

    pub fn max(arg: impl Expr + 'static) -> Self {
        Self::new("MAX", vec![FunctionArg::Expr(Box::new(arg))])
    }

    pub fn into_value_expr(self) -> ValueExpr {
        ValueExpr::new(self)
    }
}

fn wrap_arg(arg: impl Expr + 'static, distinct: bool) -> FunctionArg {
    if distinct {
        FunctionArg::Distinct(Box::new(arg))
    } else {
        FunctionArg::Expr(Box::new(arg))
    }
}

impl Expr for FunctionCall {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let mut params = Vec::new();
        let mut rendered_args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            match arg {
                FunctionArg::Wildcard => rendered_args.push("*".to_string()),
                FunctionArg::Expr(e) => {
                    let (sql, mut p) = e.render(dialect)?;
                    rendered_args.push(sql);
                    params.append(&mut p);
                }
                FunctionArg::Distinct(e) => {
                    let (sql, mut p) = e.render(dialect)?;
                    rendered_args.push(format!("DISTINCT {sql}"));
                    params.append(&mut p);
                }
            }
        }
        Ok((format!("{}({})", self.name, rendered_args.join(", ")), params))
    }
}

/// Maps a window function's SQL name to the capability sub-flag that gates
/// it, when one exists. Arbitrary/dialect-specific window function names
/// (anything not in [`WindowFunctions`]) are gated only by the category
/// check in [`Protocol::WindowFunctions`].
fn window_flag_for_name(name: &str) -> Option<WindowFunctions> {
    match name {
        "ROW_NUMBER" => Some(WindowFunctions::ROW_NUMBER),
        "RANK" => Some(WindowFunctions::RANK),
        "DENSE_RANK" => Some(WindowFunctions::DENSE_RANK),
        "LAG" => Some(WindowFunctions::LAG),
        "LEAD" => Some(WindowFunctions::LEAD),
        "NTILE" => Some(WindowFunctions::NTILE),
        "FIRST_VALUE" => Some(WindowFunctions::FIRST_VALUE),
        "LAST_VALUE" => Some(WindowFunctions::LAST_VALUE),
        _ => None,
    }
}

/// A window function invocation: the function part renders exactly like a
/// [`FunctionCall`], followed by an `OVER (...)` window specification.
/// `COUNT`/`SUM`/`AVG`/etc. are plain [`FunctionCall`]s even when paired with
/// an `OVER` clause in real SQL; this node exists for the ranking/offset
/// functions (`ROW_NUMBER`, `RANK`, `LAG`, `LEAD`, …) that have no meaning
/// outside a window.
#[derive(Debug)]
pub struct WindowFunctionCall {
    pub function: FunctionCall,
    pub over: OverClause,
}

impl WindowFunctionCall {
    pub fn new(function: FunctionCall, over: OverClause) -> Self {
        Self { function, over }
    }

    pub fn row_number(over: OverClause) -> Self {
        Self::new(FunctionCall::new("ROW_NUMBER", Vec::new()), over)
    }

    pub fn rank(over: OverClause) -> Self {
        Self::new(FunctionCall::new("RANK", Vec::new()), over)
    }

    pub fn dense_rank(over: OverClause) -> Self {
        Self::new(FunctionCall::new("DENSE_RANK", Vec::new()), over)
    }

    pub fn lag(arg: impl Expr + 'static, over: OverClause) -> Self {
        Self::new(FunctionCall::new("LAG", vec![FunctionArg::Expr(Box::new(arg))]), over)
    }

    pub fn lead(arg: impl Expr + 'static, over: OverClause) -> Self {
        Self::new(FunctionCall::new("LEAD", vec![FunctionArg::Expr(Box::new(arg))]), over)
    }

    pub fn into_value_expr(self) -> ValueExpr {
        ValueExpr::new(self)
    }
}

impl Expr for WindowFunctionCall {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        dialect.require_protocol(Protocol::WindowFunctions, &self.function.name)?;
        if let Some(flag) = window_flag_for_name(&self.function.name) {
            if !dialect.capabilities().supports_window_function(flag) {
                return Err(DbError::WindowFunctionNotSupported(self.function.name.clone()));
            }
        }

        let (func_sql, mut params) = self.function.render(dialect)?;
        let (over_sql, mut over_params) = self.over.render(dialect)?;
        params.append(&mut over_params);
        Ok((format!("{func_sql} {over_sql}"), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;

    #[test]
    fn column_renders_quoted_and_qualified() {
        let dialect = AnsiDialect::new();
        let (sql, params) = Column::new("id").render(&dialect).unwrap();
        assert_eq!(sql, "\"id\"");
        assert!(params.is_empty());

        let (sql, _) = Column::qualified("users", "id").render(&dialect).unwrap();
        assert_eq!(sql, "\"users\".\"id\"");
    }

    #[test]
    fn literal_renders_as_single_placeholder() {
        let dialect = AnsiDialect::new();
        let (sql, params) = Literal::new(Value::Int(5)).render(&dialect).unwrap();
        assert_eq!(sql, "?");
        assert_eq!(params, vec![Value::Int(5)]);
    }

    #[test]
    fn wildcard_has_no_params() {
        let dialect = AnsiDialect::new();
        let (sql, params) = Wildcard::new().render(&dialect).unwrap();
        assert_eq!(sql, "*");
        assert!(params.is_empty());
    }

    #[test]
    fn column_rejects_unsafe_name() {
        let dialect = AnsiDialect::new();
        let err = Column::new("id; DROP TABLE users").render(&dialect).unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn function_call_renders_count_all_without_params() {
        let dialect = AnsiDialect::new();
        let (sql, params) = FunctionCall::count_all().render(&dialect).unwrap();
        assert_eq!(sql, "COUNT(*)");
        assert!(params.is_empty());
    }

    #[test]
    fn function_call_renders_sum_of_column() {
        let dialect = AnsiDialect::new();
        let (sql, params) = FunctionCall::sum(Column::new("amount"), false).render(&dialect).unwrap();
        assert_eq!(sql, "SUM(\"amount\")");
        assert!(params.is_empty());
    }

    #[test]
    fn function_call_renders_distinct_argument() {
        let dialect = AnsiDialect::new();
        let (sql, _) = FunctionCall::count(Column::new("status"), true).render(&dialect).unwrap();
        assert_eq!(sql, "COUNT(DISTINCT \"status\")");
    }

    #[test]
    fn window_function_call_renders_function_and_over_clause() {
        let dialect = AnsiDialect::new();
        let over = OverClause::new()
            .with_partition_by(Column::new("dept"))
            .with_order_by(super::super::clause::OrderByItem::new(Box::new(Column::new("salary")), super::super::clause::OrderDirection::Desc));
        let (sql, params) = WindowFunctionCall::row_number(over).render(&dialect).unwrap();
        assert_eq!(sql, "ROW_NUMBER() OVER (PARTITION BY \"dept\" ORDER BY \"salary\" DESC)");
        assert!(params.is_empty());
    }

    #[test]
    fn window_function_call_rejects_a_function_the_dialect_does_not_declare() {
        let dialect = AnsiDialect::new();
        let call = WindowFunctionCall::new(FunctionCall::new("NTILE", vec![FunctionArg::Expr(Box::new(Literal::new(Value::Int(4))))]), OverClause::new());
        let err = call.render(&dialect).unwrap_err();
        assert!(matches!(err, DbError::WindowFunctionNotSupported(_)));
    }
}
