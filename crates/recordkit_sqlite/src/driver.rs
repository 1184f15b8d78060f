//! SQLite storage backend: a [`recordkit_core::StorageBackend`] over
//! `rusqlite`, with a matching [`recordkit_core::SqlDialect`] that expresses
//! what this engine can and cannot do (no row-level locking, `RETURNING`
//! only on 3.35+, `LIMIT` required whenever `OFFSET` is present).

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use recordkit_core::expr::{ExplainOptions, ForUpdateOptions};
use recordkit_core::{
    CapabilityCategory, Capabilities, ColumnMeta, CteFeatures, DbError, ErrorDetail, ExplainResult,
    IsolationLevel, PlaceholderStyle, QueryResult, ReturningCapability, Row, SetOperations, SqlDialect,
    StorageBackend, TransactionManager, TypeAdapterRegistry, Value, WindowFunctions,
};
use rusqlite::types::ValueRef;
use rusqlite::Connection as RusqliteConnection;

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

/// SQLite's SQL dialect: `?` placeholders, double-quoted identifiers,
/// `RETURNING` gated on the linked library's version.
pub struct SqliteDialect {
    capabilities: Capabilities,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self::for_library_version(rusqlite::version())
    }

    fn for_library_version(version: &str) -> Self {
        let supports_returning = parse_version(version).is_some_and(|v| v >= (3, 35, 0));

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
            .with_returning(if supports_returning {
                ReturningCapability::Supported
            } else {
                ReturningCapability::None
            })
            .with_cte_feature(CteFeatures::BASIC | CteFeatures::RECURSIVE)
            .with_set_operation(
                SetOperations::UNION | SetOperations::UNION_ALL | SetOperations::INTERSECT | SetOperations::EXCEPT,
            )
            .with_window_function(
                WindowFunctions::ROW_NUMBER
                    | WindowFunctions::RANK
                    | WindowFunctions::DENSE_RANK
                    | WindowFunctions::LAG
                    | WindowFunctions::LEAD
                    | WindowFunctions::NTILE
                    | WindowFunctions::FIRST_VALUE
                    | WindowFunctions::LAST_VALUE,
            );

        Self { capabilities }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SqliteDialect {
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
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_nan() || f.is_infinite() {
                    "NULL".to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) | Value::Json(s) | Value::Decimal(s) => format!("'{}'", self.escape_string(s)),
            Value::Bytes(b) => format!("X'{}'", hex::encode(b)),
            Value::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
            Value::Uuid(u) => format!("'{u}'"),
            Value::Enum { member, .. } => format!("'{}'", self.escape_string(member)),
            Value::Array(items) => {
                let json = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
                format!("'{}'", self.escape_string(&json))
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

    /// SQLite requires an explicit `LIMIT` (conventionally `LIMIT -1`)
    /// whenever an `OFFSET` is present.
    fn supports_offset_without_limit(&self) -> bool {
        false
    }

    fn for_update_clause(&self, _options: &ForUpdateOptions) -> Result<String, DbError> {
        Err(DbError::Operational(
            "SQLite has no row-level locking; FOR UPDATE/FOR SHARE are not available".to_string(),
        ))
    }

    fn isolation_level_token(&self, level: IsolationLevel) -> Result<&'static str, DbError> {
        match level {
            IsolationLevel::Serializable => Ok(""),
            other => Err(DbError::IsolationLevel(format!(
                "{other:?} has no SQLite equivalent; SQLite transactions are always serializable"
            ))),
        }
    }

    fn explain_prefix(&self, options: &ExplainOptions) -> Result<String, DbError> {
        if options.analyze || options.verbose || options.buffers || options.format.is_some() {
            return Err(DbError::Operational(
                "SQLite's EXPLAIN does not support ANALYZE/VERBOSE/BUFFERS/FORMAT options".to_string(),
            ));
        }
        Ok("EXPLAIN QUERY PLAN".to_string())
    }
}

/// Convert a core [`Value`] into the wire representation `rusqlite` binds.
fn value_to_sqlite(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as SqlValue;
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) | Value::Json(s) | Value::Decimal(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::DateTime(dt) => SqlValue::Text(dt.to_rfc3339()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqlValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::Uuid(u) => SqlValue::Text(u.to_string()),
        Value::Enum { member, .. } => SqlValue::Text(member.clone()),
        Value::Array(items) => {
            let json = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
            SqlValue::Text(json)
        }
    }
}

/// Convert a result column back into a core [`Value`]. SQLite is dynamically
/// typed, so this reflects the storage class SQLite actually used, not the
/// column's declared type — callers that need a specific in-memory shape go
/// through [`recordkit_core::TypeAdapterRegistry`] on top of this.
fn sqlite_value_to_value(row: &rusqlite::Row, idx: usize) -> Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::Int(i),
        Ok(ValueRef::Real(f)) => Value::Float(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Blob(b)) => Value::Bytes(b.to_vec()),
        Err(_) => Value::Null,
    }
}

fn translate_error(err: rusqlite::Error) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(ffi_err, msg) => {
            let message = msg.clone().unwrap_or_else(|| ffi_err.to_string());
            match ffi_err.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    let detail = ErrorDetail::new().with_code(format!("{:?}", ffi_err.extended_code));
                    DbError::integrity_with_detail(message, detail)
                }
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    DbError::Operational(message)
                }
                rusqlite::ErrorCode::SchemaChanged | rusqlite::ErrorCode::TypeMismatch => DbError::query(message),
                _ => DbError::database(message),
            }
        }
        rusqlite::Error::QueryReturnedNoRows => DbError::RecordNotFound,
        other => DbError::database(other.to_string()),
    }
}

/// A [`StorageBackend`] over a single SQLite file (or `:memory:`).
///
/// Holds the `rusqlite::Connection` behind a mutex so the backend can
/// satisfy `StorageBackend`'s `&self`-only methods; SQLite itself serializes
/// access to one connection regardless; this mutex only protects the `Option`
/// from concurrent `connect`/`disconnect`.
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Option<RusqliteConnection>>,
    dialect: SqliteDialect,
    type_adapters: TypeAdapterRegistry,
    transaction_manager: Mutex<TransactionManager>,
}

impl SqliteBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: Mutex::new(None),
            dialect: SqliteDialect::new(),
            type_adapters: TypeAdapterRegistry::with_defaults(),
            transaction_manager: Mutex::new(TransactionManager::new()),
        }
    }

    /// A backend over a private, connection-local in-memory database.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    fn with_connection<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T, DbError>) -> Result<T, DbError> {
        let guard = self.conn.lock().expect("sqlite connection lock poisoned");
        let conn = guard
            .as_ref()
            .ok_or_else(|| DbError::connection("not connected: call connect() first"))?;
        f(conn)
    }
}

impl StorageBackend for SqliteBackend {
    fn connect(&self) -> Result<(), DbError> {
        let conn = RusqliteConnection::open(&self.path)
            .map_err(|e| DbError::connection_with_cause(format!("failed to open {}", self.path.display()), e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(translate_error)?;
        *self.conn.lock().expect("sqlite connection lock poisoned") = Some(conn);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DbError> {
        *self.conn.lock().expect("sqlite connection lock poisoned") = None;
        Ok(())
    }

    fn ping(&self, reconnect: bool) -> Result<bool, DbError> {
        let alive = self
            .with_connection(|conn| conn.execute_batch("SELECT 1").map_err(translate_error))
            .is_ok();
        if alive {
            return Ok(true);
        }
        if reconnect {
            self.connect()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn type_adapters(&self) -> &TypeAdapterRegistry {
        &self.type_adapters
    }

    fn transaction_manager(&self) -> &Mutex<TransactionManager> {
        &self.transaction_manager
    }

    fn server_version(&self) -> Result<(u32, u32, u32), DbError> {
        parse_version(rusqlite::version()).ok_or_else(|| DbError::database("could not parse SQLite library version"))
    }

    fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql).map_err(translate_error)?;
            let column_count = stmt.column_count();
            let columns: Vec<ColumnMeta> = stmt
                .column_names()
                .into_iter()
                .map(|name| ColumnMeta {
                    name: name.to_string(),
                    type_name: String::new(),
                    nullable: true,
                })
                .collect();

            let bound: Vec<rusqlite::types::Value> = params.iter().map(value_to_sqlite).collect();
            let mut rows_out: Vec<Row> = Vec::new();
            let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter())).map_err(translate_error)?;
            while let Some(row) = rows.next().map_err(translate_error)? {
                let mut values = Vec::with_capacity(column_count);
                for idx in 0..column_count {
                    values.push(sqlite_value_to_value(row, idx));
                }
                rows_out.push(values);
            }
            drop(rows);

            // A SELECT (with or without RETURNING) reports columns; a bare
            // DML statement reports none, in which case `changes()` is the
            // actual affected-row count rather than a stale prior value.
            let affected_rows = if column_count == 0 { Some(conn.changes()) } else { None };

            Ok(QueryResult {
                columns,
                rows: rows_out,
                affected_rows,
                execution_time: start.elapsed(),
                returning_degraded: false,
            })
        })
    }

    fn explain(&self, sql: &str, params: &[Value]) -> Result<ExplainResult, DbError> {
        let prefix = self.dialect().explain_prefix(&ExplainOptions::new())?;
        let result = self.execute_raw(&format!("{prefix} {sql}"), params)?;

        let raw = result
            .rows
            .iter()
            .map(|row| row.iter().map(Value::as_display_string).collect::<Vec<_>>().join("|"))
            .collect::<Vec<_>>()
            .join("\n");

        let structured = serde_json::to_value(
            result
                .rows
                .iter()
                .map(|row| {
                    serde_json::json!({
                        "id": row.first().map(Value::as_display_string).unwrap_or_default(),
                        "parent": row.get(1).map(Value::as_display_string).unwrap_or_default(),
                        "detail": row.get(3).map(Value::as_display_string).unwrap_or_default(),
                    })
                })
                .collect::<Vec<_>>(),
        )
        .ok();

        Ok(ExplainResult { raw, structured })
    }
}
