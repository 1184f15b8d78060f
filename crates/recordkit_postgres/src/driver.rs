//! PostgreSQL storage backend: a [`recordkit_core::StorageBackend`] over the
//! `postgres` crate, with a matching [`recordkit_core::SqlDialect`] that
//! reflects PostgreSQL's broad feature set (window functions, recursive
//! CTEs, `RETURNING`, every set operation, row-level locking, JSON).

use std::sync::Mutex;
use std::time::Instant;

use native_tls::TlsConnector;
use postgres::{Client, NoTls};
use postgres_native_tls::MakeTlsConnector;
use recordkit_core::expr::ExplainOptions;
use recordkit_core::{
    AdvancedGrouping, CapabilityCategory, Capabilities, ColumnMeta, ConnectionConfig, CteFeatures,
    DbError, ErrorDetail, ExplainResult, JsonOperations, PlaceholderStyle, QueryResult,
    ReturningCapability, Row, SetOperations, SqlDialect, SslMode, StorageBackend,
    TransactionManager, TypeAdapterRegistry, Value, WindowFunctions,
};

pub struct PostgresDialect {
    capabilities: Capabilities,
}

impl PostgresDialect {
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
                    | CapabilityCategory::MATH_FUNCTIONS
                    | CapabilityCategory::SET_OPERATIONS
                    | CapabilityCategory::WINDOW_FUNCTIONS
                    | CapabilityCategory::ADVANCED_GROUPING
                    | CapabilityCategory::CTE
                    | CapabilityCategory::JSON_OPERATIONS
                    | CapabilityCategory::RETURNING,
            )
            .with_returning(ReturningCapability::Supported)
            .with_cte_feature(
                CteFeatures::BASIC | CteFeatures::RECURSIVE | CteFeatures::CTE_IN_DML | CteFeatures::MATERIALIZED,
            )
            .with_set_operation(
                SetOperations::UNION
                    | SetOperations::UNION_ALL
                    | SetOperations::INTERSECT
                    | SetOperations::INTERSECT_ALL
                    | SetOperations::EXCEPT
                    | SetOperations::EXCEPT_ALL,
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
            )
            .with_advanced_grouping(AdvancedGrouping::ROLLUP | AdvancedGrouping::CUBE | AdvancedGrouping::GROUPING_SETS)
            .with_json_operation(
                JsonOperations::EXTRACT | JsonOperations::CONTAINS | JsonOperations::SET_PATH | JsonOperations::AGGREGATE,
            );

        Self { capabilities }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgresDialect {
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
                if f.is_nan() || f.is_infinite() {
                    "NULL".to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(s) => s.clone(),
            Value::Text(s) => format!("'{}'", self.escape_string(s)),
            Value::Json(s) => format!("'{}'::jsonb", self.escape_string(s)),
            Value::Bytes(b) => format!("'\\x{}'", hex::encode(b)),
            Value::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
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
        PlaceholderStyle::DollarNumber
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn explain_prefix(&self, options: &ExplainOptions) -> Result<String, DbError> {
        let mut flags = Vec::new();
        if options.analyze {
            flags.push("ANALYZE".to_string());
        }
        if options.verbose {
            flags.push("VERBOSE".to_string());
        }
        if options.buffers {
            flags.push("BUFFERS".to_string());
        }
        if let Some(format) = &options.format {
            flags.push(format!("FORMAT {format}"));
        }
        if flags.is_empty() {
            Ok("EXPLAIN".to_string())
        } else {
            Ok(format!("EXPLAIN ({})", flags.join(", ")))
        }
    }
}

fn value_to_sql_param(value: &Value) -> Box<dyn postgres::types::ToSql + Sync> {
    match value {
        Value::Null => Box::new(None::<String>),
        Value::Bool(b) => Box::new(*b),
        Value::Int(i) => Box::new(*i),
        Value::Float(f) => Box::new(*f),
        Value::Text(s) | Value::Decimal(s) => Box::new(s.clone()),
        Value::Json(s) => Box::new(serde_json::from_str::<serde_json::Value>(s).unwrap_or(serde_json::Value::Null)),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::DateTime(dt) => Box::new(*dt),
        Value::Date(d) => Box::new(*d),
        Value::Time(t) => Box::new(*t),
        Value::Uuid(u) => Box::new(*u),
        Value::Enum { member, .. } => Box::new(member.clone()),
        Value::Array(items) => {
            let strings: Vec<String> = items.iter().map(|v| v.as_display_string()).collect();
            Box::new(strings)
        }
    }
}

fn postgres_value_to_value(row: &postgres::Row, idx: usize) -> Value {
    let col_type = row.columns()[idx].type_();

    match col_type.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx).ok().flatten().map(Value::Bool).unwrap_or(Value::Null),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int8" => row.try_get::<_, Option<i64>>(idx).ok().flatten().map(Value::Int).unwrap_or(Value::Null),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),
        "float8" => row.try_get::<_, Option<f64>>(idx).ok().flatten().map(Value::Float).unwrap_or(Value::Null),
        "numeric" => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx).ok().flatten().map(Value::Bytes).unwrap_or(Value::Null),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(Value::Uuid)
            .unwrap_or(Value::Null),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Json(v.to_string()))
            .unwrap_or(Value::Null),
        "timestamp" | "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "date" => row.try_get::<_, Option<chrono::NaiveDate>>(idx).ok().flatten().map(Value::Date).unwrap_or(Value::Null),
        "time" => row.try_get::<_, Option<chrono::NaiveTime>>(idx).ok().flatten().map(Value::Time).unwrap_or(Value::Null),
        _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(Value::Text).unwrap_or(Value::Null),
    }
}

fn translate_error(err: postgres::Error) -> DbError {
    if let Some(code) = err.code() {
        let sqlstate = code.code();
        let detail = ErrorDetail::new().with_code(sqlstate.to_string());
        return match sqlstate {
            "23505" | "23503" | "23502" | "23514" => DbError::integrity_with_detail(err.to_string(), detail),
            "40001" | "40P01" => DbError::Deadlock(err.to_string()),
            "42601" | "42883" | "42P01" => DbError::query_with_detail(err.to_string(), detail),
            "57014" => DbError::Operational("query cancelled".to_string()),
            _ => DbError::database(err.to_string()),
        };
    }
    DbError::database(err.to_string())
}

fn conninfo(config: &ConnectionConfig) -> String {
    let mut parts = vec![
        format!("host={}", config.host),
        format!("dbname={}", config.database),
        "connect_timeout=30".to_string(),
    ];
    if let Some(port) = config.port {
        parts.push(format!("port={port}"));
    }
    if let Some(user) = &config.username {
        parts.push(format!("user={user}"));
    }
    if let Some(password) = &config.password {
        parts.push(format!("password={password}"));
    }
    if let Some(application_name) = config.option("application_name") {
        parts.push(format!("application_name={application_name}"));
    }
    parts.join(" ")
}

fn connect_client(config: &ConnectionConfig) -> Result<Client, DbError> {
    let conn_string = conninfo(config);
    let ssl_mode = config.tls.mode.unwrap_or(SslMode::Prefer);

    match ssl_mode {
        SslMode::Disable => {
            Client::connect(&conn_string, NoTls).map_err(|e| DbError::connection_with_cause(connect_failure_message(config), e))
        }
        _ => {
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(ssl_mode == SslMode::Prefer)
                .build()
                .map_err(|e| DbError::connection_with_cause("failed to build TLS connector".to_string(), e))?;
            let tls = MakeTlsConnector::new(connector);

            match Client::connect(&conn_string, tls) {
                Ok(client) => Ok(client),
                Err(e) if ssl_mode == SslMode::Prefer => Client::connect(&conn_string, NoTls)
                    .map_err(|_| DbError::connection_with_cause(connect_failure_message(config), e)),
                Err(e) => Err(DbError::connection_with_cause(connect_failure_message(config), e)),
            }
        }
    }
}

fn connect_failure_message(config: &ConnectionConfig) -> String {
    format!("failed to connect to {}:{}", config.host, config.port.unwrap_or(5432))
}

pub struct PostgresBackend {
    config: ConnectionConfig,
    client: Mutex<Option<Client>>,
    dialect: PostgresDialect,
    type_adapters: TypeAdapterRegistry,
    transaction_manager: Mutex<TransactionManager>,
}

impl PostgresBackend {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            dialect: PostgresDialect::new(),
            type_adapters: TypeAdapterRegistry::with_defaults(),
            transaction_manager: Mutex::new(TransactionManager::new()),
        }
    }

    fn with_client<T>(&self, f: impl FnOnce(&mut Client) -> Result<T, DbError>) -> Result<T, DbError> {
        let mut guard = self.client.lock().expect("postgres connection lock poisoned");
        let client = guard.as_mut().ok_or_else(|| DbError::connection("not connected: call connect() first"))?;
        f(client)
    }
}

impl StorageBackend for PostgresBackend {
    fn connect(&self) -> Result<(), DbError> {
        log::info!("connecting to PostgreSQL at {}:{}", self.config.host, self.config.port.unwrap_or(5432));
        let client = connect_client(&self.config)?;
        *self.client.lock().expect("postgres connection lock poisoned") = Some(client);
        log::info!("connected to PostgreSQL at {}:{}", self.config.host, self.config.port.unwrap_or(5432));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DbError> {
        *self.client.lock().expect("postgres connection lock poisoned") = None;
        Ok(())
    }

    fn ping(&self, reconnect: bool) -> Result<bool, DbError> {
        let alive = self.with_client(|client| client.simple_query("SELECT 1").map_err(translate_error)).is_ok();
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
        self.with_client(|client| {
            let row = client
                .query_one("SHOW server_version_num", &[])
                .map_err(translate_error)?;
            let raw: String = row.get(0);
            let num: u32 = raw.parse().map_err(|_| DbError::database(format!("unexpected server_version_num '{raw}'")))?;
            Ok((num / 10000, (num / 100) % 100, num % 100))
        })
    }

    fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        log::debug!("executing: {}", sql.replace('\n', " "));
        self.with_client(|client| {
            let boxed: Vec<Box<dyn postgres::types::ToSql + Sync>> = params.iter().map(value_to_sql_param).collect();
            let refs: Vec<&(dyn postgres::types::ToSql + Sync)> = boxed.iter().map(|b| b.as_ref()).collect();

            // `query_raw` rather than `query`: its `RowIter` exposes
            // `rows_affected()` once exhausted, the only way to get both the
            // result rows (for `SELECT`/`RETURNING`) and the server's
            // affected-row count (for bare DML) from a single execution.
            let mut row_iter = client.query_raw(sql, refs).map_err(translate_error)?;
            let mut rows = Vec::new();
            while let Some(row_result) = row_iter.next() {
                rows.push(row_result.map_err(translate_error)?);
            }
            let affected_rows = row_iter.rows_affected();

            if rows.is_empty() {
                return Ok(QueryResult {
                    columns: Vec::new(),
                    rows: Vec::new(),
                    affected_rows,
                    execution_time: start.elapsed(),
                    returning_degraded: false,
                });
            }

            let columns: Vec<ColumnMeta> = rows[0]
                .columns()
                .iter()
                .map(|col| ColumnMeta {
                    name: col.name().to_string(),
                    type_name: col.type_().name().to_string(),
                    nullable: true,
                })
                .collect();

            let result_rows: Vec<Row> = rows
                .iter()
                .map(|row| (0..columns.len()).map(|i| postgres_value_to_value(row, i)).collect())
                .collect();

            Ok(QueryResult {
                columns,
                rows: result_rows,
                affected_rows,
                execution_time: start.elapsed(),
                returning_degraded: false,
            })
        })
    }

    fn explain(&self, sql: &str, params: &[Value]) -> Result<ExplainResult, DbError> {
        let options = ExplainOptions::new().with_format("JSON".to_string());
        let prefix = self.dialect().explain_prefix(&options)?;
        let result = self.execute_raw(&format!("{prefix} {sql}"), params)?;

        let raw = result
            .rows
            .iter()
            .map(|row| row.iter().map(Value::as_display_string).collect::<Vec<_>>().join("|"))
            .collect::<Vec<_>>()
            .join("\n");

        let structured = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| match value {
                Value::Json(json) => serde_json::from_str(json).ok(),
                _ => None,
            });

        Ok(ExplainResult { raw, structured })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conninfo_includes_host_port_and_credentials() {
        let config = ConnectionConfig::new("postgres", "db.internal", "app")
            .with_port(5432)
            .with_credentials("svc", "secret");
        let info = conninfo(&config);
        assert!(info.contains("host=db.internal"));
        assert!(info.contains("port=5432"));
        assert!(info.contains("user=svc"));
        assert!(info.contains("password=secret"));
    }

    #[test]
    fn dialect_quotes_identifiers_with_double_quotes() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn dialect_uses_dollar_number_placeholders() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.placeholder_style(), PlaceholderStyle::DollarNumber);
        assert_eq!(dialect.format_placeholder(0), "$1");
        assert_eq!(dialect.format_placeholder(2), "$3");
    }

    #[test]
    fn explain_prefix_adds_requested_options() {
        let dialect = PostgresDialect::new();
        let options = ExplainOptions::new().with_analyze(true).with_format("JSON".to_string());
        assert_eq!(dialect.explain_prefix(&options).unwrap(), "EXPLAIN (ANALYZE, FORMAT JSON)");
        assert_eq!(dialect.explain_prefix(&ExplainOptions::new()).unwrap(), "EXPLAIN");
    }
}
