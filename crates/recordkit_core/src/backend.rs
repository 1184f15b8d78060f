//! The storage backend contract: the seam where a connected driver meets
//! the query builder, the transaction manager, and DML helpers.
//!
//! A [`StorageBackend`] owns exactly one connection's worth of state — the
//! dialect it renders SQL for, the type adapter registry it converts values
//! through, and the transaction manager tracking nesting depth — and is
//! assumed single-owner: it is not safe to issue overlapping statements
//! against the same instance from multiple threads concurrently, hence the
//! internal `Mutex` around transaction state rather than exposing `&mut
//! self` everywhere.

use std::sync::Mutex;

use crate::capabilities::Capabilities;
use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::query::{ColumnMeta, QueryResult, Row};
use crate::query_safety::validate_identifier;
use crate::transaction::TransactionManager;
use crate::type_adapter::TypeAdapterRegistry;
use crate::value::Value;

/// The parsed and, where the driver supports it, structured form of an
/// `EXPLAIN` statement's output.
///
/// `raw` always carries the driver's own textual plan; `structured` is
/// populated only when the driver can hand back machine-readable output
/// (`EXPLAIN (FORMAT JSON)` on PostgreSQL, `EXPLAIN ... FOR CONNECTION` on
/// MySQL as JSON). A dialect that cannot produce structured output leaves it
/// `None` rather than attempting to parse the text form itself.
#[derive(Debug, Clone)]
pub struct ExplainResult {
    pub raw: String,
    pub structured: Option<serde_json::Value>,
}

/// What columns, if any, a DML statement should report back, and whether to
/// proceed anyway on a backend declaring no `RETURNING` support.
#[derive(Debug, Clone, Default)]
pub struct ReturningRequest {
    /// `None` means every column (`RETURNING *`); `Some(&[])` is rejected by
    /// the dialect the same as any other explicit empty list would be.
    pub columns: Option<Vec<String>>,
    /// Suppress [`DbError::ReturningNotSupported`] at the cost of an
    /// unreliable affected-row count; see [`SqlDialect::returning_clause`].
    pub force: bool,
}

/// A fully-formed statement ready for [`StorageBackend::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub sql: String,
    pub params: Vec<Value>,
    pub returning: Option<ReturningRequest>,
}

impl ExecuteRequest {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            returning: None,
        }
    }

    pub fn with_returning(mut self, returning: ReturningRequest) -> Self {
        self.returning = Some(returning);
        self
    }
}

/// Per-row data for an insert/update, as `(column, value)` pairs. A `Vec`
/// rather than a map preserves caller-supplied ordering, which matters for
/// reproducible generated SQL in tests and logs.
pub type DmlData<'a> = &'a [(String, Value)];

fn build_insert_sql(dialect: &dyn SqlDialect, table: &str, data: DmlData<'_>) -> Result<(String, Vec<Value>), DbError> {
    validate_identifier(table)?;
    if data.is_empty() {
        return Err(DbError::validation("insert requires at least one column"));
    }

    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len());
    for (column, value) in data {
        validate_identifier(column)?;
        columns.push(dialect.quote_identifier(column));
        placeholders.push("?".to_string());
        params.push(value.clone());
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.qualified_table(None, table),
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok((sql, params))
}

fn build_update_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    data: DmlData<'_>,
    where_sql: &str,
    where_params: &[Value],
) -> Result<(String, Vec<Value>), DbError> {
    validate_identifier(table)?;
    if data.is_empty() {
        return Err(DbError::validation("update requires at least one column to set"));
    }

    let mut assignments = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len() + where_params.len());
    for (column, value) in data {
        validate_identifier(column)?;
        assignments.push(format!("{} = ?", dialect.quote_identifier(column)));
        params.push(value.clone());
    }
    params.extend_from_slice(where_params);

    let mut sql = format!(
        "UPDATE {} SET {}",
        dialect.qualified_table(None, table),
        assignments.join(", ")
    );
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_sql);
    }
    Ok((sql, params))
}

fn build_delete_sql(
    dialect: &dyn SqlDialect,
    table: &str,
    where_sql: &str,
    where_params: &[Value],
) -> Result<(String, Vec<Value>), DbError> {
    validate_identifier(table)?;
    let mut sql = format!("DELETE FROM {}", dialect.qualified_table(None, table));
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_sql);
    }
    Ok((sql, where_params.to_vec()))
}

/// A scoped transaction, handed to the closure passed to
/// [`StorageBackend::transaction`]. Lets nested code create, release, or roll
/// back to a named savepoint without reaching back into the backend's own
/// `begin`/`commit`/`rollback`, which are reserved for the enclosing scope.
pub struct TransactionHandle<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> TransactionHandle<'a> {
    pub fn savepoint(&self, name: Option<&str>) -> Result<String, DbError> {
        let mut guard = self.backend.transaction_manager().lock().expect("transaction manager lock poisoned");
        guard.savepoint(name.map(String::from))
    }

    pub fn release(&self, name: &str) -> Result<(), DbError> {
        let mut guard = self.backend.transaction_manager().lock().expect("transaction manager lock poisoned");
        guard.release(name)
    }

    pub fn rollback_to(&self, name: &str) -> Result<(), DbError> {
        let mut guard = self.backend.transaction_manager().lock().expect("transaction manager lock poisoned");
        guard.rollback_to(name)
    }
}

/// A synchronous connection to one database backend.
///
/// Every method here takes `&self`, not `&mut self`: transaction state lives
/// behind the internal mutex returned by [`Self::transaction_manager`], so a
/// backend can be shared behind an `Arc` the way a connection pool entry
/// typically is, while still serializing the handful of operations
/// (`begin`/`commit`/`rollback`) that mutate shared state.
pub trait StorageBackend: Send + Sync {
    /// Open the underlying connection. A backend constructed but never
    /// connected returns `DbError::Connection` from every other method.
    fn connect(&self) -> Result<(), DbError>;

    fn disconnect(&self) -> Result<(), DbError>;

    /// Check liveness; if `reconnect` is set and the connection is dead,
    /// attempt to re-establish it before reporting.
    fn ping(&self, reconnect: bool) -> Result<bool, DbError>;

    fn dialect(&self) -> &dyn SqlDialect;

    fn capabilities(&self) -> &Capabilities {
        self.dialect().capabilities()
    }

    fn type_adapters(&self) -> &TypeAdapterRegistry;

    fn transaction_manager(&self) -> &Mutex<TransactionManager>;

    /// Report the connected server's version as `(major, minor, patch)`, used
    /// once at connect time to narrow [`Capabilities`] for the specific
    /// version in use.
    fn server_version(&self) -> Result<(u32, u32, u32), DbError>;

    /// Run one statement against the driver and return its result. This is
    /// the only method a concrete backend must implement to support every
    /// default method below; it performs no RETURNING negotiation or
    /// identifier validation of its own; [`Self::execute`] does that before
    /// delegating here.
    fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError>;

    /// Run a request, negotiating RETURNING if one was asked for.
    fn execute(&self, request: ExecuteRequest) -> Result<QueryResult, DbError> {
        let ExecuteRequest { mut sql, params, returning } = request;

        let mut result = match returning {
            Some(req) => {
                let columns = req.columns.unwrap_or_default();
                for column in &columns {
                    validate_identifier(column)?;
                }
                match self.dialect().returning_clause(&columns, req.force)? {
                    Some(clause) => {
                        sql.push(' ');
                        sql.push_str(&clause);
                        self.execute_raw(&sql, &params)?
                    }
                    None => {
                        let mut result = self.execute_raw(&sql, &params)?;
                        result.returning_degraded = true;
                        result
                    }
                }
            }
            None => self.execute_raw(&sql, &params)?,
        };

        if result.columns.is_empty() && result.rows.is_empty() {
            result.columns = Vec::new();
        }
        Ok(result)
    }

    fn insert(&self, table: &str, data: DmlData<'_>, returning: Option<ReturningRequest>) -> Result<QueryResult, DbError> {
        let (sql, params) = build_insert_sql(self.dialect(), table, data)?;
        let sql = crate::query::renumber_placeholders(&sql, self.dialect());
        let mut request = ExecuteRequest::new(sql, params);
        if let Some(returning) = returning {
            request = request.with_returning(returning);
        }
        self.execute(request)
    }

    /// `where_sql` uses bare `?` placeholders (the same convention
    /// [`crate::query_builder::QueryBuilder`] renders before its own
    /// dialect-specific renumbering pass); this method performs that same
    /// renumbering once over the fully-assembled `UPDATE` statement, after
    /// the `SET` clause's own placeholders are appended ahead of it.
    fn update(
        &self,
        table: &str,
        data: DmlData<'_>,
        where_sql: &str,
        where_params: &[Value],
        returning: Option<ReturningRequest>,
    ) -> Result<QueryResult, DbError> {
        let (sql, params) = build_update_sql(self.dialect(), table, data, where_sql, where_params)?;
        let sql = crate::query::renumber_placeholders(&sql, self.dialect());
        let mut request = ExecuteRequest::new(sql, params);
        if let Some(returning) = returning {
            request = request.with_returning(returning);
        }
        self.execute(request)
    }

    /// `where_sql` uses bare `?` placeholders; see [`Self::update`].
    fn delete(
        &self,
        table: &str,
        where_sql: &str,
        where_params: &[Value],
        returning: Option<ReturningRequest>,
    ) -> Result<QueryResult, DbError> {
        let (sql, params) = build_delete_sql(self.dialect(), table, where_sql, where_params)?;
        let sql = crate::query::renumber_placeholders(&sql, self.dialect());
        let mut request = ExecuteRequest::new(sql, params);
        if let Some(returning) = returning {
            request = request.with_returning(returning);
        }
        self.execute(request)
    }

    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        Ok(self.execute_raw(sql, params)?.rows)
    }

    fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        Ok(self.fetch_all(sql, params)?.into_iter().next())
    }

    fn columns_of(&self, sql: &str, params: &[Value]) -> Result<Vec<ColumnMeta>, DbError> {
        Ok(self.execute_raw(sql, params)?.columns)
    }

    /// Run the driver's `EXPLAIN` for a statement and return both its raw
    /// text and, where the dialect knows how, a structured form. The default
    /// implementation runs `EXPLAIN <sql>` and reports only the raw text;
    /// dialects with a machine-readable EXPLAIN format override this.
    fn explain(&self, sql: &str, params: &[Value]) -> Result<ExplainResult, DbError> {
        let prefix = self.dialect().explain_prefix(&crate::expr::ExplainOptions::new())?;
        let result = self.execute_raw(&format!("{prefix} {sql}"), params)?;
        let raw = result
            .rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|v| v.as_display_string())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ExplainResult { raw, structured: None })
    }

    fn supports_returning(&self) -> bool {
        self.capabilities().returning == crate::capabilities::ReturningCapability::Supported
    }

    /// Begin a transaction, or a nested savepoint if one is already open.
    /// Restores pre-transition state and wraps the cause in
    /// `DbError::Transaction` if the driver call fails.
    fn begin(&self) -> Result<(), DbError> {
        let (snapshot, statement) = {
            let mut guard = self.transaction_manager().lock().expect("transaction manager lock poisoned");
            let snapshot = guard.snapshot();
            let statement = guard.begin(self.dialect())?;
            (snapshot, statement)
        };

        if let Err(cause) = self.execute_raw(&statement.sql, &[]) {
            let mut guard = self.transaction_manager().lock().expect("transaction manager lock poisoned");
            guard.restore(snapshot);
            return Err(DbError::transaction_with_cause("BEGIN failed", cause));
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        let (snapshot, sql) = {
            let mut guard = self.transaction_manager().lock().expect("transaction manager lock poisoned");
            let snapshot = guard.snapshot();
            let sql = guard.commit()?;
            (snapshot, sql)
        };

        if let Err(cause) = self.execute_raw(&sql, &[]) {
            let mut guard = self.transaction_manager().lock().expect("transaction manager lock poisoned");
            guard.restore(snapshot);
            return Err(DbError::transaction_with_cause("COMMIT failed", cause));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        let (snapshot, sql) = {
            let mut guard = self.transaction_manager().lock().expect("transaction manager lock poisoned");
            let snapshot = guard.snapshot();
            let sql = guard.rollback()?;
            (snapshot, sql)
        };

        if let Err(cause) = self.execute_raw(&sql, &[]) {
            let mut guard = self.transaction_manager().lock().expect("transaction manager lock poisoned");
            guard.restore(snapshot);
            return Err(DbError::transaction_with_cause("ROLLBACK failed", cause));
        }
        Ok(())
    }

    /// Run `f` inside a transaction scope: commits on `Ok`, rolls back on
    /// `Err`. This is the synchronous analogue of a scoped context manager
    /// that commits on normal exit and rolls back on an uncaught exception —
    /// Rust has no exceptions, so `Err` plays that role.
    fn transaction<'a>(
        &'a self,
        f: Box<dyn FnOnce(&TransactionHandle<'a>) -> Result<(), DbError> + 'a>,
    ) -> Result<(), DbError>
    where
        Self: Sized,
    {
        self.begin()?;
        let handle = TransactionHandle { backend: self };
        match f(&handle) {
            Ok(()) => self.commit(),
            Err(err) => {
                let _ = self.rollback();
                Err(err)
            }
        }
    }
}

/// A mapping between a model's declared fields and the column adapters it
/// needs, plus the minimal factory contract the rest of the crate relies on
/// to build instances back out of query results.
///
/// The core never interprets a model beyond this contract — no lifecycle
/// hooks, no validation, no relationship loading; those stay entirely the
/// implementer's concern.
pub trait Model: Sized + Send + Sync {
    fn table_name() -> &'static str;

    fn primary_key() -> &'static [&'static str];

    /// Which connection/backend alias this model routes through, for
    /// multi-backend setups. Single-backend callers can leave the default.
    fn backend_name() -> &'static str {
        "default"
    }

    /// Which in-memory/wire type pair each column should be converted
    /// through, keyed by column name. Columns absent from this map pass
    /// through the registry unchanged.
    fn column_adapters() -> Vec<(&'static str, crate::wire::InMemoryType, crate::wire::WireType)> {
        Vec::new()
    }

    /// Columns this instance has modified since it was loaded or last
    /// persisted — what an `UPDATE` should actually set.
    fn dirty_columns(&self) -> Vec<String>;

    /// Build an instance from a row produced by a query against this model's
    /// table, given the column metadata describing it.
    fn create_from_database(row: &Row, columns: &[ColumnMeta]) -> Result<Self, DbError>;

    /// Lifecycle hooks the implementer can override; the core invokes
    /// neither automatically and does not interpret their effects.
    fn before_save(&mut self) {}

    fn after_save(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_insert_sql_quotes_columns_and_uses_bare_placeholders() {
        let dialect = crate::dialect::AnsiDialect::new();
        let data = vec![("name".to_string(), Value::Text("ann".into())), ("age".to_string(), Value::Int(30))];
        let (sql, params) = build_insert_sql(&dialect, "users", &data).unwrap();
        assert_eq!(sql, "INSERT INTO \"users\" (\"name\", \"age\") VALUES (?, ?)");
        assert_eq!(params, vec![Value::Text("ann".into()), Value::Int(30)]);
    }

    #[test]
    fn build_update_sql_appends_where_params_after_set_params() {
        let dialect = crate::dialect::AnsiDialect::new();
        let data = vec![("name".to_string(), Value::Text("bob".into()))];
        let (sql, params) = build_update_sql(&dialect, "users", &data, "\"id\" = ?", &[Value::Int(7)]).unwrap();
        assert_eq!(sql, "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?");
        assert_eq!(params, vec![Value::Text("bob".into()), Value::Int(7)]);
    }

    #[test]
    fn build_delete_sql_without_where_deletes_every_row() {
        let dialect = crate::dialect::AnsiDialect::new();
        let (sql, params) = build_delete_sql(&dialect, "users", "", &[]).unwrap();
        assert_eq!(sql, "DELETE FROM \"users\"");
        assert!(params.is_empty());
    }

    #[test]
    fn insert_rejects_empty_data() {
        let dialect = crate::dialect::AnsiDialect::new();
        assert!(build_insert_sql(&dialect, "users", &[]).is_err());
    }

    #[test]
    fn update_sql_renumbers_set_and_where_placeholders_for_a_dollar_dialect() {
        use crate::dialect::PlaceholderStyle;

        struct DollarDialect(crate::dialect::AnsiDialect);
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
                self.0.capabilities()
            }
        }

        let dialect = DollarDialect(crate::dialect::AnsiDialect::new());
        let data = vec![("name".to_string(), Value::Text("bob".into()))];
        let (sql, params) = build_update_sql(&dialect, "users", &data, "\"id\" = ?", &[Value::Int(7)]).unwrap();
        let sql = crate::query::renumber_placeholders(&sql, &dialect);
        assert_eq!(sql, "UPDATE \"users\" SET \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(params, vec![Value::Text("bob".into()), Value::Int(7)]);
    }

    struct User {
        id: i64,
        name: String,
        name_dirty: bool,
    }

    impl Model for User {
        fn table_name() -> &'static str {
            "users"
        }

        fn primary_key() -> &'static [&'static str] {
            &["id"]
        }

        fn dirty_columns(&self) -> Vec<String> {
            if self.name_dirty { vec!["name".to_string()] } else { Vec::new() }
        }

        fn create_from_database(row: &Row, columns: &[ColumnMeta]) -> Result<Self, DbError> {
            let id_idx = columns
                .iter()
                .position(|c| c.name == "id")
                .ok_or_else(|| DbError::TypeConversion("missing id column".to_string()))?;
            let name_idx = columns
                .iter()
                .position(|c| c.name == "name")
                .ok_or_else(|| DbError::TypeConversion("missing name column".to_string()))?;
            let id = match &row[id_idx] {
                Value::Int(v) => *v,
                _ => return Err(DbError::TypeConversion("id not an int".to_string())),
            };
            let name = match &row[name_idx] {
                Value::Text(v) => v.clone(),
                _ => return Err(DbError::TypeConversion("name not text".to_string())),
            };
            Ok(User { id, name, name_dirty: false })
        }
    }

    #[test]
    fn model_defaults_cover_backend_name_and_lifecycle_hooks() {
        assert_eq!(User::backend_name(), "default");
        assert!(User::column_adapters().is_empty());

        let mut user = User { id: 1, name: "ann".to_string(), name_dirty: true };
        assert_eq!(user.dirty_columns(), vec!["name".to_string()]);
        user.before_save();
        user.after_save();
    }

    #[test]
    fn model_create_from_database_builds_instance_from_a_row() {
        let columns = vec![
            ColumnMeta { name: "id".to_string(), type_name: "int".to_string(), nullable: false },
            ColumnMeta { name: "name".to_string(), type_name: "text".to_string(), nullable: false },
        ];
        let row: Row = vec![Value::Int(1), Value::Text("ann".to_string())];
        let user = User::create_from_database(&row, &columns).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.name, "ann");
    }
}
