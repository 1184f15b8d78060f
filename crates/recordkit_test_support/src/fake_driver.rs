//! A deterministic, in-memory [`StorageBackend`] for exercising the query
//! builder and transaction manager without a live database.
//!
//! Canned results are registered per exact SQL text; anything else falls
//! back to a configurable default, or an empty [`QueryResult`] if none was
//! set. Every call to [`FakeBackend::execute_raw`] is recorded so tests can
//! assert on what SQL and parameters the builder actually produced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use recordkit_core::{
    AnsiDialect, ColumnMeta, DbError, QueryResult, SqlDialect, StorageBackend, TransactionManager,
    TypeAdapterRegistry, Value,
};

#[derive(Debug, Clone)]
pub enum FakeQueryOutcome {
    Success(QueryResult),
    Error(String),
}

impl FakeQueryOutcome {
    fn into_result(self) -> Result<QueryResult, DbError> {
        match self {
            Self::Success(result) => Ok(result),
            Self::Error(message) => Err(DbError::query(message)),
        }
    }
}

/// A single `(sql, params)` pair as observed by [`FakeBackend::execute_raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedRequest {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBackendStats {
    pub executed_requests: Vec<ExecutedRequest>,
    pub connect_calls: usize,
    pub disconnect_calls: usize,
}

#[derive(Default)]
struct FakeBackendState {
    query_outcomes: RwLock<HashMap<String, FakeQueryOutcome>>,
    default_outcome: RwLock<Option<FakeQueryOutcome>>,
    executed_requests: Mutex<Vec<ExecutedRequest>>,
    connect_error: RwLock<Option<String>>,
    ping_error: RwLock<Option<String>>,
    connect_calls: Mutex<usize>,
    disconnect_calls: Mutex<usize>,
}

/// A fake backend standing in for a real driver connection. Construct one,
/// register canned outcomes with the `with_*` builders, then drive it
/// through [`recordkit_core::QueryBuilder`] or the [`StorageBackend`] DML
/// helpers exactly like a real backend.
pub struct FakeBackend {
    state: FakeBackendState,
    connected: AtomicBool,
    dialect: AnsiDialect,
    type_adapters: TypeAdapterRegistry,
    transaction_manager: Mutex<TransactionManager>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: FakeBackendState::default(),
            connected: AtomicBool::new(false),
            dialect: AnsiDialect::new(),
            type_adapters: TypeAdapterRegistry::with_defaults(),
            transaction_manager: Mutex::new(TransactionManager::new()),
        }
    }

    pub fn with_query_result(self, sql: impl Into<String>, result: QueryResult) -> Self {
        rwlock_write(&self.state.query_outcomes).insert(sql.into(), FakeQueryOutcome::Success(result));
        self
    }

    pub fn with_query_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        rwlock_write(&self.state.query_outcomes).insert(sql.into(), FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn with_default_result(self, result: QueryResult) -> Self {
        *rwlock_write(&self.state.default_outcome) = Some(FakeQueryOutcome::Success(result));
        self
    }

    pub fn with_default_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.default_outcome) = Some(FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn with_connect_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.connect_error) = Some(message.into());
        self
    }

    pub fn with_ping_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.ping_error) = Some(message.into());
        self
    }

    pub fn set_query_outcome(&self, sql: impl Into<String>, outcome: FakeQueryOutcome) {
        rwlock_write(&self.state.query_outcomes).insert(sql.into(), outcome);
    }

    pub fn stats(&self) -> FakeBackendStats {
        FakeBackendStats {
            executed_requests: mutex_lock(&self.state.executed_requests).clone(),
            connect_calls: *mutex_lock(&self.state.connect_calls),
            disconnect_calls: *mutex_lock(&self.state.disconnect_calls),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for FakeBackend {
    fn connect(&self) -> Result<(), DbError> {
        *mutex_lock(&self.state.connect_calls) += 1;
        if let Some(message) = rwlock_read(&self.state.connect_error).clone() {
            return Err(DbError::connection(message));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DbError> {
        *mutex_lock(&self.state.disconnect_calls) += 1;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&self, reconnect: bool) -> Result<bool, DbError> {
        if let Some(message) = rwlock_read(&self.state.ping_error).clone() {
            if reconnect {
                return self.connect().map(|()| true);
            }
            return Err(DbError::connection(message));
        }
        Ok(self.is_connected())
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
        Ok((0, 0, 0))
    }

    fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        mutex_lock(&self.state.executed_requests).push(ExecutedRequest {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        if let Some(outcome) = rwlock_read(&self.state.query_outcomes).get(sql).cloned() {
            return outcome.into_result();
        }
        if let Some(outcome) = rwlock_read(&self.state.default_outcome).clone() {
            return outcome.into_result();
        }
        Ok(QueryResult::empty())
    }
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn connect_fails_when_configured_with_an_error() {
        let backend = FakeBackend::new().with_connect_error("refused");
        assert!(matches!(backend.connect(), Err(DbError::Connection { .. })));
        assert!(!backend.is_connected());
    }

    #[test]
    fn execute_raw_uses_configured_outcome_and_records_stats() {
        let backend = FakeBackend::new()
            .with_query_error("SELECT boom", "boom")
            .with_default_result(fixtures::table_result(vec![], vec![]));
        backend.connect().unwrap();

        backend.set_query_outcome(
            "SELECT 1",
            FakeQueryOutcome::Success(fixtures::table_result(
                vec![ColumnMeta { name: "one".into(), type_name: "int".into(), nullable: false }],
                vec![vec![Value::Int(1)]],
            )),
        );

        let rows = backend.fetch_all("SELECT 1", &[]).unwrap();
        assert_eq!(rows, vec![vec![Value::Int(1)]]);

        let err = backend.fetch_all("SELECT boom", &[]);
        assert!(matches!(err, Err(DbError::Query { .. })));

        // Anything unconfigured falls through to the default outcome.
        let default_rows = backend.fetch_all("SELECT * FROM whatever", &[]).unwrap();
        assert!(default_rows.is_empty());

        let stats = backend.stats();
        assert_eq!(stats.executed_requests.len(), 3);
        assert_eq!(stats.connect_calls, 1);
    }

    #[test]
    fn unconfigured_query_without_default_returns_empty_result() {
        let backend = FakeBackend::new();
        let rows = backend.fetch_all("SELECT 1", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn insert_through_the_backend_helper_records_the_rendered_sql() {
        let backend = FakeBackend::new();
        backend.connect().unwrap();
        backend
            .insert("users", &[("name".to_string(), Value::Text("ann".into()))], None)
            .unwrap();

        let stats = backend.stats();
        assert_eq!(stats.executed_requests[0].sql, "INSERT INTO \"users\" (\"name\") VALUES (?)");
        assert_eq!(stats.executed_requests[0].params, vec![Value::Text("ann".into())]);
    }

    #[test]
    fn begin_commit_round_trip_drives_the_transaction_manager() {
        let backend = FakeBackend::new();
        backend.connect().unwrap();
        backend.begin().unwrap();
        backend.begin().unwrap();
        backend.commit().unwrap();
        backend.commit().unwrap();

        let stats = backend.stats();
        assert_eq!(stats.executed_requests[0].sql, "BEGIN");
        assert!(stats.executed_requests[1].sql.starts_with("SAVEPOINT"));
        assert!(stats.executed_requests[2].sql.starts_with("RELEASE SAVEPOINT"));
        assert_eq!(stats.executed_requests[3].sql, "COMMIT");
    }
}
