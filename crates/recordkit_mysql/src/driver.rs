//! MySQL/MariaDB storage backend: a [`recordkit_core::StorageBackend`] over
//! the `mysql` crate, with a matching [`recordkit_core::SqlDialect`] tuned
//! to a modern (8.0+) MySQL server — no `RETURNING`, `ROLLUP` but not
//! `CUBE`/`GROUPING SETS`, `UNION`/`UNION ALL` only among the set operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use mysql::consts::{ColumnFlags, ColumnType};
use mysql::prelude::*;
use mysql::{Conn, Opts, OptsBuilder, SslOpts};
use recordkit_core::expr::ExplainOptions;
use recordkit_core::{
    AdvancedGrouping, CapabilityCategory, Capabilities, ColumnMeta, ConnectionConfig, CteFeatures,
    DbError, ErrorDetail, ExplainResult, JsonOperations, PlaceholderStyle, QueryResult,
    ReturningCapability, Row, SetOperations, SqlDialect, SslMode, StorageBackend,
    TransactionManager, TypeAdapterRegistry, Value, WindowFunctions,
};

pub struct MysqlDialect {
    capabilities: Capabilities,
}

impl MysqlDialect {
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
                    | CapabilityCategory::JSON_OPERATIONS,
            )
            .with_returning(ReturningCapability::None)
            .with_cte_feature(CteFeatures::BASIC | CteFeatures::RECURSIVE)
            .with_set_operation(SetOperations::UNION | SetOperations::UNION_ALL)
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
            .with_advanced_grouping(AdvancedGrouping::ROLLUP)
            .with_json_operation(JsonOperations::EXTRACT | JsonOperations::CONTAINS | JsonOperations::SET_PATH);

        Self { capabilities }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MysqlDialect {
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
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
            Value::Decimal(s) | Value::Text(s) | Value::Json(s) => format!("'{}'", self.escape_string(s)),
            Value::Bytes(b) => format!("X'{}'", hex::encode(b)),
            Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
            Value::Uuid(u) => format!("'{u}'"),
            Value::Enum { member, .. } => format!("'{}'", self.escape_string(member)),
            Value::Array(items) => {
                let json = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
                format!("'{}'", self.escape_string(&json))
            }
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\\', "\\\\")
            .replace('\'', "\\'")
            .replace('"', "\\\"")
            .replace('\0', "\\0")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn explain_prefix(&self, options: &ExplainOptions) -> Result<String, DbError> {
        if options.buffers {
            return Err(DbError::Operational("MySQL's EXPLAIN does not support BUFFERS".to_string()));
        }
        if options.analyze {
            return Ok("EXPLAIN ANALYZE".to_string());
        }
        match &options.format {
            Some(format) => Ok(format!("EXPLAIN FORMAT={format}")),
            None => Ok("EXPLAIN".to_string()),
        }
    }
}

fn value_to_mysql_param(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Bool(b) => mysql::Value::Int(*b as i64),
        Value::Int(i) => mysql::Value::Int(*i),
        Value::Float(f) => mysql::Value::Double(*f),
        Value::Text(s) | Value::Json(s) | Value::Decimal(s) => mysql::Value::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => mysql::Value::Bytes(b.clone()),
        Value::DateTime(dt) => mysql::Value::Bytes(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes()),
        Value::Date(d) => mysql::Value::Bytes(d.format("%Y-%m-%d").to_string().into_bytes()),
        Value::Time(t) => mysql::Value::Bytes(t.format("%H:%M:%S%.f").to_string().into_bytes()),
        Value::Uuid(u) => mysql::Value::Bytes(u.to_string().into_bytes()),
        Value::Enum { member, .. } => mysql::Value::Bytes(member.clone().into_bytes()),
        Value::Array(items) => {
            let json = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
            mysql::Value::Bytes(json.into_bytes())
        }
    }
}

fn mysql_value_to_value(row: &mysql::Row, idx: usize, col: &mysql::Column) -> Value {
    let col_type = col.column_type();

    if col_type == ColumnType::MYSQL_TYPE_TINY && col.column_length() == 1 {
        return match row.get_opt::<Option<i8>, _>(idx) {
            Some(Ok(Some(v))) => Value::Bool(v != 0),
            Some(Ok(None)) => Value::Null,
            _ => Value::Null,
        };
    }

    if col_type == ColumnType::MYSQL_TYPE_LONGLONG && col.flags().contains(ColumnFlags::UNSIGNED_FLAG) {
        return match row.get_opt::<Option<u64>, _>(idx) {
            Some(Ok(Some(v))) => {
                if v <= i64::MAX as u64 {
                    Value::Int(v as i64)
                } else {
                    Value::Text(v.to_string())
                }
            }
            Some(Ok(None)) => Value::Null,
            _ => Value::Null,
        };
    }

    if matches!(col_type, ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP) {
        if let Some(mysql::Value::Date(year, month, day, hour, min, sec, micro)) = row.as_ref(idx) {
            if let (Some(date), Some(time)) = (
                chrono::NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32),
                chrono::NaiveTime::from_hms_micro_opt(*hour as u32, *min as u32, *sec as u32, *micro),
            ) {
                let naive = chrono::NaiveDateTime::new(date, time);
                return Value::DateTime(chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc));
            }
        }
    }

    if col_type == ColumnType::MYSQL_TYPE_DATE {
        if let Some(mysql::Value::Date(year, month, day, ..)) = row.as_ref(idx) {
            if let Some(date) = chrono::NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32) {
                return Value::Date(date);
            }
        }
    }

    if col_type == ColumnType::MYSQL_TYPE_TIME {
        if let Some(mysql::Value::Time(_neg, _days, hours, mins, secs, micros)) = row.as_ref(idx) {
            if let Some(time) = chrono::NaiveTime::from_hms_micro_opt(*hours as u32, *mins as u32, *secs as u32, *micros) {
                return Value::Time(time);
            }
        }
    }

    if let Some(Ok(val)) = row.get_opt::<Option<i64>, _>(idx) {
        return val.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Some(Ok(val)) = row.get_opt::<Option<f64>, _>(idx) {
        return val.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Some(Ok(val)) = row.get_opt::<Option<Vec<u8>>, _>(idx) {
        return match val {
            Some(bytes) => String::from_utf8(bytes.clone()).map(Value::Text).unwrap_or(Value::Bytes(bytes)),
            None => Value::Null,
        };
    }

    Value::Null
}

fn translate_error(err: mysql::Error) -> DbError {
    if let mysql::Error::MySqlError(ref inner) = err {
        let detail = ErrorDetail::new().with_code(inner.code.to_string());
        return match inner.code {
            1062 | 1048 | 1216 | 1217 | 1452 | 1451 | 1264 => DbError::integrity_with_detail(inner.message.clone(), detail),
            1213 => DbError::Deadlock(inner.message.clone()),
            1205 => DbError::lock(inner.message.clone()),
            1064 | 1054 | 1146 => DbError::query_with_detail(inner.message.clone(), detail),
            _ => DbError::database(inner.message.clone()),
        };
    }
    DbError::database(err.to_string())
}

fn build_opts(config: &ConnectionConfig, ssl_mode: SslMode) -> Opts {
    let mut builder = OptsBuilder::new()
        .ip_or_hostname(Some(config.host.clone()))
        .tcp_port(config.port.unwrap_or(3306))
        .user(config.username.clone())
        .pass(config.password.clone())
        .db_name(Some(config.database.clone()));

    builder = match ssl_mode {
        SslMode::Disable => builder,
        SslMode::Prefer => builder.ssl_opts(SslOpts::default().with_danger_accept_invalid_certs(true)),
        SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            let mut ssl_opts = SslOpts::default();
            if let Some(ca_file) = &config.tls.ca_file {
                ssl_opts = ssl_opts.with_root_cert_path(Some(std::path::PathBuf::from(ca_file)));
            }
            builder.ssl_opts(ssl_opts)
        }
    };

    builder.into()
}

fn connect_conn(config: &ConnectionConfig) -> Result<Conn, DbError> {
    let ssl_mode = config.tls.mode.unwrap_or(SslMode::Disable);

    if ssl_mode == SslMode::Prefer {
        let opts = build_opts(config, SslMode::Prefer);
        match Conn::new(opts) {
            Ok(conn) => return Ok(conn),
            Err(_) => {
                let opts = build_opts(config, SslMode::Disable);
                return Conn::new(opts).map_err(|e| DbError::connection_with_cause(connect_failure_message(config), e));
            }
        }
    }

    let opts = build_opts(config, ssl_mode);
    Conn::new(opts).map_err(|e| DbError::connection_with_cause(connect_failure_message(config), e))
}

fn connect_failure_message(config: &ConnectionConfig) -> String {
    format!("failed to connect to {}:{}", config.host, config.port.unwrap_or(3306))
}

pub struct MysqlBackend {
    config: ConnectionConfig,
    conn: Mutex<Option<Conn>>,
    dialect: MysqlDialect,
    type_adapters: TypeAdapterRegistry,
    transaction_manager: Mutex<TransactionManager>,
    current_database: Mutex<Option<String>>,
    cancelled: AtomicBool,
}

impl MysqlBackend {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
            dialect: MysqlDialect::new(),
            type_adapters: TypeAdapterRegistry::with_defaults(),
            transaction_manager: Mutex::new(TransactionManager::new()),
            current_database: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    fn with_connection<T>(&self, f: impl FnOnce(&mut Conn) -> Result<T, DbError>) -> Result<T, DbError> {
        let mut guard = self.conn.lock().expect("mysql connection lock poisoned");
        let conn = guard.as_mut().ok_or_else(|| DbError::connection("not connected: call connect() first"))?;
        f(conn)
    }
}

impl StorageBackend for MysqlBackend {
    fn connect(&self) -> Result<(), DbError> {
        log::info!("connecting to MySQL at {}:{}", self.config.host, self.config.port.unwrap_or(3306));
        let conn = connect_conn(&self.config)?;
        *self.conn.lock().expect("mysql connection lock poisoned") = Some(conn);
        *self.current_database.lock().expect("mysql current-database lock poisoned") = Some(self.config.database.clone());
        log::info!("connected to MySQL at {}:{}", self.config.host, self.config.port.unwrap_or(3306));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DbError> {
        *self.conn.lock().expect("mysql connection lock poisoned") = None;
        Ok(())
    }

    fn ping(&self, reconnect: bool) -> Result<bool, DbError> {
        let alive = self.with_connection(|conn| conn.query_drop("SELECT 1").map_err(translate_error)).is_ok();
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
        self.with_connection(|conn| {
            let version: String = conn
                .query_first("SELECT VERSION()")
                .map_err(translate_error)?
                .ok_or_else(|| DbError::database("server returned no version string"))?;
            let core = version.split(['-', ' ']).next().unwrap_or(&version);
            let mut parts = core.split('.');
            let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
            let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
            let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
            Ok((major, minor, patch))
        })
    }

    fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        self.cancelled.store(false, Ordering::SeqCst);
        let start = Instant::now();
        log::debug!("executing: {}", sql.replace('\n', " "));

        self.with_connection(|conn| {
            let stmt = conn.prep(sql).map_err(translate_error)?;
            let columns: Vec<ColumnMeta> = stmt
                .columns()
                .iter()
                .map(|col| ColumnMeta {
                    name: col.name_str().to_string(),
                    type_name: format!("{:?}", col.column_type()),
                    nullable: true,
                })
                .collect();

            let bound: Vec<mysql::Value> = params.iter().map(value_to_mysql_param).collect();
            let rows: Vec<mysql::Row> = conn.exec(&stmt, mysql::Params::Positional(bound)).map_err(translate_error)?;

            if rows.is_empty() {
                let sql_upper = sql.trim_start().to_uppercase();
                let is_select = sql_upper.starts_with("SELECT") || sql_upper.starts_with("SHOW") || sql_upper.starts_with("DESCRIBE");
                let affected_rows = if is_select { None } else { Some(conn.affected_rows()) };
                return Ok(QueryResult {
                    columns,
                    rows: Vec::new(),
                    affected_rows,
                    execution_time: start.elapsed(),
                    returning_degraded: false,
                });
            }

            let result_rows: Vec<Row> = rows
                .iter()
                .map(|row| {
                    let row_cols = row.columns_ref();
                    (0..columns.len()).map(|i| mysql_value_to_value(row, i, &row_cols[i])).collect()
                })
                .collect();

            Ok(QueryResult {
                columns,
                rows: result_rows,
                affected_rows: None,
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
                Value::Text(json) => serde_json::from_str(json).ok(),
                _ => None,
            });

        Ok(ExplainResult { raw, structured })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_quotes_identifiers_with_backticks() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_identifier("users"), "`users`");
        assert_eq!(dialect.quote_identifier("weird`name"), "`weird``name`");
    }

    #[test]
    fn dialect_has_no_returning_support() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.capabilities().returning, ReturningCapability::None);
    }

    #[test]
    fn explain_prefix_switches_on_analyze_and_format() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.explain_prefix(&ExplainOptions::new()).unwrap(), "EXPLAIN");
        assert_eq!(
            dialect.explain_prefix(&ExplainOptions::new().with_format("JSON".to_string())).unwrap(),
            "EXPLAIN FORMAT=JSON"
        );
        assert_eq!(dialect.explain_prefix(&ExplainOptions::new().with_analyze(true)).unwrap(), "EXPLAIN ANALYZE");
    }

    #[test]
    fn explain_rejects_buffers_option() {
        let dialect = MysqlDialect::new();
        assert!(dialect.explain_prefix(&ExplainOptions::new().with_buffers(true)).is_err());
    }

    #[test]
    fn build_opts_disables_ssl_by_default() {
        let config = ConnectionConfig::new("mysql", "db.internal", "app").with_port(3306);
        let opts = build_opts(&config, SslMode::Disable);
        assert_eq!(opts.ip_or_hostname(), "db.internal");
        assert_eq!(opts.tcp_port(), 3306);
    }
}
