use thiserror::Error;

/// Structured detail carried alongside a [`DbError`], analogous to what a
/// driver's error object reports (PostgreSQL's `DETAIL`/`HINT`/`SQLSTATE`,
/// MySQL's numeric error code). Kept separate from the enum itself so every
/// `Database`-rooted variant can carry the same shape without repeating its
/// fields.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetail {
    /// Additional detail text attached by the driver.
    pub detail: Option<String>,
    /// A suggested remedy, when the driver or dialect can offer one.
    pub hint: Option<String>,
    /// Driver-reported error code (e.g. a Postgres SQLSTATE).
    pub code: Option<String>,
    /// Location the error refers to, when known.
    pub location: Option<ErrorLocation>,
}

impl ErrorDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: ErrorLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Render detail/hint/location/code as a single trailing string, e.g.
    /// `" (detail: ...; hint: ...; table: users; code: 23505)"`, or the empty
    /// string when nothing is set.
    fn display_suffix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(detail) = &self.detail {
            parts.push(format!("detail: {detail}"));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("hint: {hint}"));
        }
        if let Some(loc) = &self.location {
            if let Some(schema) = &loc.schema {
                parts.push(format!("schema: {schema}"));
            }
            if let Some(table) = &loc.table {
                parts.push(format!("table: {table}"));
            }
            if let Some(column) = &loc.column {
                parts.push(format!("column: {column}"));
            }
            if let Some(constraint) = &loc.constraint {
                parts.push(format!("constraint: {constraint}"));
            }
        }
        if let Some(code) = &self.code {
            parts.push(format!("code: {code}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" ({})", parts.join("; "))
        }
    }
}

/// Where in the schema an error originated, when the driver reports it.
#[derive(Debug, Clone, Default)]
pub struct ErrorLocation {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub constraint: Option<String>,
}

impl ErrorLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.schema.is_none() && self.table.is_none() && self.column.is_none() && self.constraint.is_none()
    }
}

/// The closed failure taxonomy shared by every component in this crate.
///
/// Every other module (type adapters, dialects, the expression tree, the
/// query builder, the transaction manager, storage backends) signals failure
/// exclusively through this enum. Variants that wrap a lower-level cause keep
/// it reachable through `source()`.
#[derive(Debug, Error)]
pub enum DbError {
    /// Catch-all root for failures with no more specific variant.
    #[error("database error: {message}{}", detail.display_suffix())]
    Database {
        message: String,
        detail: ErrorDetail,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to establish or re-establish a connection.
    #[error("connection failed: {message}{}", detail.display_suffix())]
    Connection {
        message: String,
        detail: ErrorDetail,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A transaction-manager transition was invalid: commit/rollback while
    /// `INACTIVE`, unbalanced nesting, or a driver failure mid-transition.
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An isolation level has no mapping to a dialect-specific token.
    #[error("unsupported isolation level: {0}")]
    IsolationLevel(String),

    /// Query execution failed for a reason not covered by a more specific
    /// variant (syntax errors, schema mismatches, programming errors).
    #[error("query failed: {message}{}", detail.display_suffix())]
    Query {
        message: String,
        detail: ErrorDetail,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A value supplied by a caller failed validation before any SQL was
    /// issued: unsafe identifier, invalid builder composition, a type-adapter
    /// pair already registered without `allow_override`.
    #[error("validation error: {0}")]
    Validation(String),

    /// A row lock could not be acquired (busy/locked).
    #[error("lock error: {message}")]
    Lock {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The driver reported a deadlock between transactions. A subkind of
    /// `Lock`, kept as its own variant because callers branch on it directly.
    #[error("deadlock detected: {0}")]
    Deadlock(String),

    /// A constraint was violated (unique, foreign key, check, not null).
    #[error("integrity constraint violated: {message}{}", detail.display_suffix())]
    Integrity { message: String, detail: ErrorDetail },

    /// A value could not be converted between its in-memory and wire
    /// representation (bad JSON, malformed UUID bytes, unsupported array
    /// element).
    #[error("type conversion failed: {0}")]
    TypeConversion(String),

    /// An operational failure: busy server, resource exhaustion, timeout.
    #[error("operational error: {0}")]
    Operational(String),

    /// A lookup by primary key / identity found no matching record.
    #[error("record not found")]
    RecordNotFound,

    /// `RETURNING` was requested but the dialect/backend cannot provide it.
    #[error("RETURNING is not supported by this backend: {0}")]
    ReturningNotSupported(String),

    /// A CTE (possibly `RECURSIVE`, possibly materialized) was requested but
    /// the dialect cannot provide it.
    #[error("common table expressions are not supported by this backend: {0}")]
    CTENotSupported(String),

    /// A window function was requested but the dialect cannot provide it.
    #[error("window functions are not supported by this backend: {0}")]
    WindowFunctionNotSupported(String),

    /// A JSON operator/function was requested but the dialect cannot provide
    /// it.
    #[error("JSON operations are not supported by this backend: {0}")]
    JsonOperationNotSupported(String),

    /// `GROUPING SETS`/`ROLLUP`/`CUBE` was requested but the dialect cannot
    /// provide it.
    #[error("advanced grouping is not supported by this backend: {0}")]
    GroupingSetNotSupported(String),

    /// Filesystem or network I/O error, surfaced from config loading or a
    /// driver's transport.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DbError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            detail: ErrorDetail::default(),
            cause: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            detail: ErrorDetail::default(),
            cause: None,
        }
    }

    pub fn connection_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            detail: ErrorDetail::default(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            cause: None,
        }
    }

    pub fn transaction_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transaction {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            detail: ErrorDetail::default(),
            cause: None,
        }
    }

    pub fn query_with_detail(message: impl Into<String>, detail: ErrorDetail) -> Self {
        Self::Query {
            message: message.into(),
            detail,
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
            cause: None,
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
            detail: ErrorDetail::default(),
        }
    }

    pub fn integrity_with_detail(message: impl Into<String>, detail: ErrorDetail) -> Self {
        Self::Integrity {
            message: message.into(),
            detail,
        }
    }

    /// Structured detail, when the variant carries one.
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Database { detail, .. }
            | Self::Connection { detail, .. }
            | Self::Query { detail, .. }
            | Self::Integrity { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Whether retrying the same operation unchanged might succeed: transient
    /// connection and lock failures, but never validation or capability
    /// errors (those require changing the call).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Lock { .. } | Self::Deadlock(_) | Self::Operational(_)
        )
    }
}
