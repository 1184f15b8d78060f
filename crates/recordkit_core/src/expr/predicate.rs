use super::{join_rendered, Expr, Rendered};
use crate::dialect::SqlDialect;
use crate::error::DbError;

/// A boolean-valued expression: `WHERE`/`HAVING`/`ON` all take a `Predicate`.
#[derive(Debug)]
pub struct Predicate(Box<dyn Expr>);

impl Predicate {
    pub fn new(inner: impl Expr + 'static) -> Self {
        Self(Box::new(inner))
    }

    pub fn boxed(inner: Box<dyn Expr>) -> Self {
        Self(inner)
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::new(LogicalPredicate::new(LogicalConnective::And, vec![self, other]))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::new(LogicalPredicate::new(LogicalConnective::Or, vec![self, other]))
    }

    pub fn not(self) -> Predicate {
        Predicate::new(NotPredicate(self))
    }
}

impl Expr for Predicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        self.0.render(dialect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOp {
    fn token(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
        }
    }
}

#[derive(Debug)]
pub struct ComparisonPredicate {
    op: ComparisonOp,
    left: Box<dyn Expr>,
    right: Box<dyn Expr>,
}

impl ComparisonPredicate {
    pub fn new(op: ComparisonOp, left: Box<dyn Expr>, right: Box<dyn Expr>) -> Self {
        Self { op, left, right }
    }
}

impl Expr for ComparisonPredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let left = self.left.render(dialect)?;
        let right = self.right.render(dialect)?;
        let (sql, params) = join_rendered(vec![left, right], &format!(" {} ", self.op.token()));
        Ok((sql, params))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryArithOp {
    fn token(self) -> &'static str {
        match self {
            BinaryArithOp::Add => "+",
            BinaryArithOp::Sub => "-",
            BinaryArithOp::Mul => "*",
            BinaryArithOp::Div => "/",
            BinaryArithOp::Rem => "%",
        }
    }
}

#[derive(Debug)]
pub struct BinaryArithmeticExpression {
    op: BinaryArithOp,
    left: Box<dyn Expr>,
    right: Box<dyn Expr>,
}

impl BinaryArithmeticExpression {
    pub fn new(op: BinaryArithOp, left: Box<dyn Expr>, right: Box<dyn Expr>) -> Self {
        Self { op, left, right }
    }
}

impl Expr for BinaryArithmeticExpression {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let left = self.left.render(dialect)?;
        let right = self.right.render(dialect)?;
        let (inner_sql, params) = join_rendered(vec![left, right], &format!(" {} ", self.op.token()));
        Ok((format!("({inner_sql})"), params))
    }
}

#[derive(Debug)]
pub struct IsNullPredicate {
    operand: Box<dyn Expr>,
    is_not: bool,
}

impl IsNullPredicate {
    pub fn new(operand: Box<dyn Expr>, is_not: bool) -> Self {
        Self { operand, is_not }
    }
}

impl Expr for IsNullPredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let (sql, params) = self.operand.render(dialect)?;
        let suffix = if self.is_not { "IS NOT NULL" } else { "IS NULL" };
        Ok((format!("{sql} {suffix}"), params))
    }
}

#[derive(Debug)]
pub struct InPredicate {
    operand: Box<dyn Expr>,
    set: Vec<Box<dyn Expr>>,
    negated: bool,
}

impl InPredicate {
    pub fn new(operand: Box<dyn Expr>, set: Vec<Box<dyn Expr>>, negated: bool) -> Self {
        Self { operand, set, negated }
    }
}

impl Expr for InPredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        // An empty set is a statically-known always-false (IN) or
        // always-true (NOT IN) condition; emitting `IN ()` is invalid SQL in
        // every dialect this crate targets, so it is special-cased here
        // rather than pushed down to each dialect.
        if self.set.is_empty() {
            return Ok((if self.negated { "1 = 1".to_string() } else { "1 = 0".to_string() }, Vec::new()));
        }

        let (operand_sql, mut params) = self.operand.render(dialect)?;
        let mut item_sqls = Vec::with_capacity(self.set.len());
        for item in &self.set {
            let (sql, mut item_params) = item.render(dialect)?;
            item_sqls.push(sql);
            params.append(&mut item_params);
        }

        let keyword = if self.negated { "NOT IN" } else { "IN" };
        Ok((format!("{operand_sql} {keyword} ({})", item_sqls.join(", ")), params))
    }
}

#[derive(Debug)]
pub struct BetweenPredicate {
    operand: Box<dyn Expr>,
    low: Box<dyn Expr>,
    high: Box<dyn Expr>,
    negated: bool,
}

impl BetweenPredicate {
    pub fn new(operand: Box<dyn Expr>, low: Box<dyn Expr>, high: Box<dyn Expr>, negated: bool) -> Self {
        Self { operand, low, high, negated }
    }
}

impl Expr for BetweenPredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let operand = self.operand.render(dialect)?;
        let low = self.low.render(dialect)?;
        let high = self.high.render(dialect)?;
        let keyword = if self.negated { "NOT BETWEEN" } else { "BETWEEN" };
        let (operand_sql, mut params) = operand;
        let (low_sql, low_params) = low;
        let (high_sql, high_params) = high;
        params.extend(low_params);
        let sql = format!("{operand_sql} {keyword} {low_sql} AND {high_sql}");
        params.extend(high_params);
        Ok((sql, params))
    }
}

#[derive(Debug)]
pub struct LikePredicate {
    operand: Box<dyn Expr>,
    pattern: Box<dyn Expr>,
    case_insensitive: bool,
    negated: bool,
}

impl LikePredicate {
    pub fn new(operand: Box<dyn Expr>, pattern: Box<dyn Expr>, case_insensitive: bool, negated: bool) -> Self {
        Self { operand, pattern, case_insensitive, negated }
    }
}

impl Expr for LikePredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let (operand_sql, mut params) = self.operand.render(dialect)?;
        let (pattern_sql, pattern_params) = self.pattern.render(dialect)?;
        params.extend(pattern_params);
        let keyword = match (self.case_insensitive, self.negated) {
            (false, false) => "LIKE",
            (false, true) => "NOT LIKE",
            (true, false) => "ILIKE",
            (true, true) => "NOT ILIKE",
        };
        Ok((format!("{operand_sql} {keyword} {pattern_sql}"), params))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalConnective {
    And,
    Or,
}

#[derive(Debug)]
pub struct LogicalPredicate {
    connective: LogicalConnective,
    operands: Vec<Predicate>,
}

impl LogicalPredicate {
    pub fn new(connective: LogicalConnective, operands: Vec<Predicate>) -> Self {
        Self { connective, operands }
    }
}

impl Expr for LogicalPredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let keyword = match self.connective {
            LogicalConnective::And => " AND ",
            LogicalConnective::Or => " OR ",
        };
        let mut rendered = Vec::with_capacity(self.operands.len());
        for operand in &self.operands {
            rendered.push(operand.render(dialect)?);
        }
        let (sql, params) = join_rendered(rendered, keyword);
        Ok((format!("({sql})"), params))
    }
}

#[derive(Debug)]
struct NotPredicate(Predicate);

impl Expr for NotPredicate {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        let (sql, params) = self.0.render(dialect)?;
        Ok((format!("NOT ({sql})"), params))
    }
}

/// A raw predicate template with out-of-band parameters, used when a caller
/// passes a bare SQL condition string to `where`/`having`.
#[derive(Debug)]
pub struct RawSqlPredicate {
    template: String,
    params: Vec<crate::value::Value>,
}

impl RawSqlPredicate {
    pub fn new(template: impl Into<String>, params: Vec<crate::value::Value>) -> Self {
        Self { template: template.into(), params }
    }

    pub fn into_predicate(self) -> Predicate {
        Predicate::new(self)
    }
}

impl Expr for RawSqlPredicate {
    fn render(&self, _dialect: &dyn SqlDialect) -> Result<Rendered, DbError> {
        Ok((self.template.clone(), self.params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;
    use crate::expr::leaf::{Column, Literal};
    use crate::value::Value;

    fn col(name: &str) -> Box<dyn Expr> {
        Box::new(Column::new(name))
    }

    fn lit(v: Value) -> Box<dyn Expr> {
        Box::new(Literal::new(v))
    }

    #[test]
    fn comparison_renders_both_sides() {
        let dialect = AnsiDialect::new();
        let pred = ComparisonPredicate::new(ComparisonOp::Eq, col("status"), lit(Value::Text("active".into())));
        let (sql, params) = pred.render(&dialect).unwrap();
        assert_eq!(sql, "\"status\" = ?");
        assert_eq!(params, vec![Value::Text("active".into())]);
    }

    #[test]
    fn empty_in_list_is_always_false() {
        let dialect = AnsiDialect::new();
        let pred = InPredicate::new(col("id"), vec![], false);
        let (sql, params) = pred.render(&dialect).unwrap();
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn empty_not_in_list_is_always_true() {
        let dialect = AnsiDialect::new();
        let pred = InPredicate::new(col("id"), vec![], true);
        let (sql, _) = pred.render(&dialect).unwrap();
        assert_eq!(sql, "1 = 1");
    }

    #[test]
    fn in_list_preserves_param_order() {
        let dialect = AnsiDialect::new();
        let pred = InPredicate::new(col("id"), vec![lit(Value::Int(1)), lit(Value::Int(2)), lit(Value::Int(3))], false);
        let (sql, params) = pred.render(&dialect).unwrap();
        assert_eq!(sql, "\"id\" IN (?, ?, ?)");
        assert_eq!(params, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn logical_and_wraps_in_parens() {
        let dialect = AnsiDialect::new();
        let left = ComparisonPredicate::new(ComparisonOp::Eq, col("a"), lit(Value::Int(1)));
        let right = ComparisonPredicate::new(ComparisonOp::Eq, col("b"), lit(Value::Int(2)));
        let combined = LogicalPredicate::new(LogicalConnective::And, vec![Predicate::new(left), Predicate::new(right)]);
        let (sql, params) = combined.render(&dialect).unwrap();
        assert_eq!(sql, "(\"a\" = ? AND \"b\" = ?)");
        assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn not_wraps_inner_predicate() {
        let dialect = AnsiDialect::new();
        let pred = Predicate::new(ComparisonPredicate::new(ComparisonOp::Eq, col("a"), lit(Value::Int(1)))).not();
        let (sql, _) = pred.render(&dialect).unwrap();
        assert_eq!(sql, "NOT (\"a\" = ?)");
    }
}
