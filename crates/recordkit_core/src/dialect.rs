use crate::capabilities::{
    Capabilities, CapabilityCategory, CteFeatures, ReturningCapability, SetOperations, WindowFunctions,
};
use crate::error::DbError;
use crate::value::Value;

/// Placeholder style for parameterized queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` placeholders (SQLite, MySQL).
    QuestionMark,
    /// `$1`, `$2`, etc. (PostgreSQL).
    DollarNumber,
    /// `:1`, `:2`, etc.
    ColonNumber,
}

/// An optional capability protocol a dialect may or may not implement.
///
/// Code that needs one of these calls [`SqlDialect::require_protocol`] rather
/// than inspecting [`Capabilities`] directly, so the failure comes back as
/// the right typed error without every call site re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    WindowFunctions,
    Cte,
    GroupingSets,
    Returning,
    Upsert,
    LateralJoins,
    Arrays,
    Json,
    Explain,
    FilterClause,
    OrderedSetAggregates,
    Merge,
    TemporalTables,
    Qualify,
    LockingHints,
    GraphQueries,
}

/// Database-specific SQL syntax: quoting, escaping, literals, placeholders,
/// and the feature handlers that gate dialect-specific clauses.
pub trait SqlDialect: Send + Sync {
    /// Quote an identifier (table/column name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Build a qualified table reference (`schema.table`, or just `table`
    /// when the dialect has no schema concept).
    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String;

    /// Convert a value to a SQL literal string. Used only for `EXPLAIN`
    /// rendering and debug output — executed queries are always
    /// parameterized.
    fn value_to_literal(&self, value: &Value) -> String;

    /// Escape a string for use inside a single-quoted literal.
    fn escape_string(&self, s: &str) -> String;

    /// The placeholder style this dialect's driver expects.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// This dialect's declared feature support.
    fn capabilities(&self) -> &Capabilities;

    /// Render the Nth (0-based) placeholder.
    fn format_placeholder(&self, index: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::DollarNumber => format!("${}", index + 1),
            PlaceholderStyle::ColonNumber => format!(":{}", index + 1),
        }
    }

    /// Build a `RETURNING`-equivalent clause for the given columns.
    ///
    /// An empty `columns` slice means "return every column" (`RETURNING *`).
    /// `force=true` suppresses `ReturningNotSupported` on a backend that
    /// declares no support, at the cost of an unreliable affected-row count —
    /// the caller is expected to have surfaced that tradeoff already.
    fn returning_clause(&self, columns: &[String], force: bool) -> Result<Option<String>, DbError> {
        match self.capabilities().returning {
            ReturningCapability::Supported => {
                if columns.is_empty() {
                    Ok(Some("RETURNING *".to_string()))
                } else {
                    let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
                    Ok(Some(format!("RETURNING {}", quoted.join(", "))))
                }
            }
            ReturningCapability::None if force => {
                log::warn!(
                    "RETURNING forced on a backend with no RETURNING support; affected-row count may be unreliable"
                );
                Ok(None)
            }
            ReturningCapability::None => Err(DbError::ReturningNotSupported(
                "this backend has no RETURNING-equivalent clause".to_string(),
            )),
        }
    }

    /// Build the `WITH [RECURSIVE]` prefix for a query's CTE list.
    fn cte_prefix(&self, recursive: bool) -> Result<&'static str, DbError> {
        self.require_protocol(Protocol::Cte, "CTE")?;
        if recursive && !self.capabilities().supports_cte_feature(CteFeatures::RECURSIVE) {
            return Err(DbError::CTENotSupported("RECURSIVE CTEs".to_string()));
        }
        Ok(if recursive { "WITH RECURSIVE" } else { "WITH" })
    }

    /// Render the keyword for a set operation (`UNION`, `UNION ALL`, …),
    /// failing if the dialect does not support it.
    fn set_operation_keyword(&self, operation: SetOperations) -> Result<&'static str, DbError> {
        if !self.capabilities().supports_set_operation(operation) {
            return Err(DbError::query(format!("unsupported set operation: {operation:?}")));
        }
        Ok(match operation {
            SetOperations::UNION => "UNION",
            SetOperations::UNION_ALL => "UNION ALL",
            SetOperations::INTERSECT => "INTERSECT",
            SetOperations::INTERSECT_ALL => "INTERSECT ALL",
            SetOperations::EXCEPT => "EXCEPT",
            SetOperations::EXCEPT_ALL => "EXCEPT ALL",
            _ => "UNION",
        })
    }

    /// Whether this dialect accepts an `OFFSET` clause with no accompanying
    /// `LIMIT`. PostgreSQL does; MySQL and SQLite require a `LIMIT` to be
    /// present (SQLite via `LIMIT -1 OFFSET n`, MySQL via a very large
    /// `LIMIT`), which their own dialects express by overriding this.
    fn supports_offset_without_limit(&self) -> bool {
        true
    }

    /// Map an [`crate::transaction::IsolationLevel`] to the token this
    /// dialect's `BEGIN`/`SET TRANSACTION` syntax expects. The ANSI default
    /// maps every level; a dialect whose engine cannot honor one should
    /// override this and return [`DbError::IsolationLevel`] for it rather
    /// than silently substituting a different level.
    fn isolation_level_token(&self, level: crate::transaction::IsolationLevel) -> Result<&'static str, DbError> {
        use crate::transaction::IsolationLevel;
        Ok(match level {
            IsolationLevel::ReadUncommitted => "ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "ISOLATION LEVEL SERIALIZABLE",
        })
    }

    /// Render a `FOR UPDATE`/`FOR SHARE` row-locking clause. Dialects with no
    /// row-level locking (SQLite) should override this to fail.
    fn for_update_clause(&self, options: &crate::expr::ForUpdateOptions) -> Result<String, DbError> {
        use crate::expr::ForUpdateStrength;

        self.require_protocol(Protocol::LockingHints, "row locking")?;

        let strength = options.strength.unwrap_or(ForUpdateStrength::Update);
        let mut sql = match strength {
            ForUpdateStrength::Update => "FOR UPDATE".to_string(),
            ForUpdateStrength::Share => "FOR SHARE".to_string(),
        };

        if !options.of.is_empty() {
            let mut quoted = Vec::with_capacity(options.of.len());
            for column in &options.of {
                crate::query_safety::validate_identifier(column)?;
                quoted.push(self.quote_identifier(column));
            }
            sql.push_str(" OF ");
            sql.push_str(&quoted.join(", "));
        }

        if options.skip_locked {
            sql.push_str(" SKIP LOCKED");
        } else if options.nowait {
            sql.push_str(" NOWAIT");
        }

        Ok(sql)
    }

    /// Render the `EXPLAIN` prefix for a statement, honoring whichever of
    /// `analyze`/`verbose`/`buffers`/`format` this dialect understands. The
    /// ANSI default ignores every option and emits a bare `EXPLAIN`.
    fn explain_prefix(&self, options: &crate::expr::ExplainOptions) -> Result<String, DbError> {
        self.require_protocol(Protocol::Explain, "EXPLAIN")?;
        let _ = options;
        Ok("EXPLAIN".to_string())
    }

    /// Render a `QUALIFY` clause wrapping a rendered window-function
    /// predicate. Gated behind `CapabilityCategory::QUALIFY`; none of the
    /// three backends shipped in this workspace declare it, so calling this
    /// against their dialects fails via [`Self::require_protocol`]. A future
    /// dialect opts in by adding the category to its declared capabilities.
    fn qualify_clause(&self, predicate_sql: &str) -> Result<String, DbError> {
        self.require_protocol(Protocol::Qualify, "QUALIFY")?;
        Ok(format!("QUALIFY {predicate_sql}"))
    }

    /// Fail with the specific typed error for `protocol` unless this
    /// dialect's capabilities declare support for it.
    fn require_protocol(&self, protocol: Protocol, feature_label: &str) -> Result<(), DbError> {
        let caps = self.capabilities();
        let supported = match protocol {
            Protocol::WindowFunctions => caps.supports_category(CapabilityCategory::WINDOW_FUNCTIONS),
            Protocol::Cte => caps.supports_category(CapabilityCategory::CTE),
            Protocol::GroupingSets => caps.supports_category(CapabilityCategory::ADVANCED_GROUPING),
            Protocol::Returning => caps.returning == ReturningCapability::Supported,
            Protocol::Json => caps.supports_category(CapabilityCategory::JSON_OPERATIONS),
            Protocol::Qualify => caps.supports_category(CapabilityCategory::QUALIFY),
            Protocol::Upsert
            | Protocol::LateralJoins
            | Protocol::Arrays
            | Protocol::Explain
            | Protocol::FilterClause
            | Protocol::OrderedSetAggregates
            | Protocol::Merge
            | Protocol::TemporalTables
            | Protocol::LockingHints
            | Protocol::GraphQueries => true,
        };
        if supported {
            return Ok(());
        }
        Err(match protocol {
            Protocol::WindowFunctions => DbError::WindowFunctionNotSupported(feature_label.to_string()),
            Protocol::Cte => DbError::CTENotSupported(feature_label.to_string()),
            Protocol::GroupingSets => DbError::GroupingSetNotSupported(feature_label.to_string()),
            Protocol::Returning => DbError::ReturningNotSupported(feature_label.to_string()),
            Protocol::Json => DbError::JsonOperationNotSupported(feature_label.to_string()),
            other => DbError::Operational(format!("{other:?} is not supported: {feature_label}")),
        })
    }
}

/// ANSI-SQL fallback dialect: double-quoted identifiers, `?` placeholders,
/// the baseline feature set common to SQL-92-and-later engines. Real
/// backends (Postgres, MySQL, SQLite) override this with their own dialect
/// in their respective crates.
pub struct AnsiDialect {
    capabilities: Capabilities,
}

impl AnsiDialect {
    pub fn new() -> Self {
        let capabilities = Capabilities::empty()
            .with_category(
                CapabilityCategory::TRANSACTIONS
                    | CapabilityCategory::BULK
                    | CapabilityCategory::JOIN
                    | CapabilityCategory::CONSTRAINTS
                    | CapabilityCategory::AGGREGATE_FUNCTIONS
                    | CapabilityCategory::DATETIME_FUNCTIONS
                    | CapabilityCategory::STRING_FUNCTIONS
                    | CapabilityCategory::MATH_FUNCTIONS,
            )
            .with_returning(ReturningCapability::None)
            .with_cte_feature(CteFeatures::BASIC | CteFeatures::RECURSIVE)
            .with_set_operation(SetOperations::UNION | SetOperations::INTERSECT | SetOperations::EXCEPT)
            .with_window_function(
                WindowFunctions::ROW_NUMBER
                    | WindowFunctions::RANK
                    | WindowFunctions::DENSE_RANK
                    | WindowFunctions::LAG
                    | WindowFunctions::LEAD,
            );
        Self { capabilities }
    }
}

impl Default for AnsiDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for AnsiDialect {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    fn value_to_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_nan() {
                    "'NaN'".to_string()
                } else if f.is_infinite() {
                    if *f > 0.0 { "'Infinity'".to_string() } else { "'-Infinity'".to_string() }
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => format!("'{}'", self.escape_string(s)),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                format!("X'{hex}'")
            }
            Value::Json(s) => format!("'{}'", self.escape_string(s)),
            Value::Decimal(s) => s.clone(),
            Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
            Value::Uuid(u) => format!("'{u}'"),
            Value::Enum { member, .. } => format!("'{}'", self.escape_string(member)),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.value_to_literal(v)).collect();
                format!("ARRAY[{}]", rendered.join(", "))
            }
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_identifier_doubles_embedded_quotes() {
        let dialect = AnsiDialect::new();
        assert_eq!(dialect.quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn returning_fails_without_force_when_unsupported() {
        let dialect = AnsiDialect::new();
        let err = dialect.returning_clause(&[], false).unwrap_err();
        assert!(matches!(err, DbError::ReturningNotSupported(_)));
    }

    #[test]
    fn returning_forced_logs_and_returns_none() {
        let dialect = AnsiDialect::new();
        assert_eq!(dialect.returning_clause(&[], true).unwrap(), None);
    }

    #[test]
    fn cte_prefix_reflects_recursive_flag() {
        let dialect = AnsiDialect::new();
        assert_eq!(dialect.cte_prefix(false).unwrap(), "WITH");
        assert_eq!(dialect.cte_prefix(true).unwrap(), "WITH RECURSIVE");
    }

    #[test]
    fn format_placeholder_uses_question_marks() {
        let dialect = AnsiDialect::new();
        assert_eq!(dialect.format_placeholder(0), "?");
        assert_eq!(dialect.format_placeholder(5), "?");
    }
}
