use crate::dialect::{PlaceholderStyle, SqlDialect};
use crate::Value;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rewrite every bare `?` placeholder produced by the expression tree into
/// the dialect's own numbering, in left-to-right occurrence order.
///
/// Every `Expr` node renders its placeholders as a literal `?` regardless of
/// dialect, since no node knows its position in the fully-assembled
/// statement; this is the single point where that position becomes known
/// and gets baked in. A `?` inside a single-quoted string literal is left
/// untouched — the expression tree never emits literal values inline, so any
/// quoted `?` in the output can only come from a `RawSqlExpression` the
/// caller wrote themselves, and is assumed intentional.
pub fn renumber_placeholders(sql: &str, dialect: &dyn SqlDialect) -> String {
    if matches!(dialect.placeholder_style(), PlaceholderStyle::QuestionMark) {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len());
    let mut in_quote = false;
    let mut index = 0usize;

    for c in sql.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '?' if !in_quote => {
                out.push_str(&dialect.format_placeholder(index));
                index += 1;
            }
            _ => out.push(c),
        }
    }

    out
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<Value>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub statement_timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

pub type Row = Vec<Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    pub affected_rows: Option<u64>,
    pub execution_time: Duration,
    /// Set when `returning=true, force=true` was issued against a backend
    /// that declares no RETURNING support: `rows`/`affected_rows` may not
    /// reflect every affected record.
    pub returning_degraded: bool,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
            execution_time: Duration::ZERO,
            returning_degraded: false,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::dialect::AnsiDialect;

    struct DollarDialect(AnsiDialect, Capabilities);

    impl SqlDialect for DollarDialect {
        fn quote_identifier(&self, name: &str) -> String {
            self.0.quote_identifier(name)
        }
        fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
            self.0.qualified_table(schema, table)
        }
        fn value_to_literal(&self, value: &Value) -> String {
            self.0.value_to_literal(value)
        }
        fn escape_string(&self, s: &str) -> String {
            self.0.escape_string(s)
        }
        fn placeholder_style(&self) -> PlaceholderStyle {
            PlaceholderStyle::DollarNumber
        }
        fn capabilities(&self) -> &Capabilities {
            &self.1
        }
    }

    #[test]
    fn question_mark_dialect_leaves_sql_unchanged() {
        let dialect = AnsiDialect::new();
        let sql = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(renumber_placeholders(sql, &dialect), sql);
    }

    #[test]
    fn dollar_dialect_renumbers_left_to_right() {
        let dialect = DollarDialect(AnsiDialect::new(), Capabilities::empty());
        let sql = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(
            renumber_placeholders(sql, &dialect),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn quoted_question_marks_are_left_untouched() {
        let dialect = DollarDialect(AnsiDialect::new(), Capabilities::empty());
        let sql = "SELECT * FROM t WHERE a = ? AND note = 'what?'";
        assert_eq!(
            renumber_placeholders(sql, &dialect),
            "SELECT * FROM t WHERE a = $1 AND note = 'what?'"
        );
    }
}
