//! The async mirror of [`crate::backend::StorageBackend`], gated behind the
//! `async` feature.
//!
//! The contract is identical in shape — same builder surface feeds both —
//! only the methods that actually touch the wire (`connect`, `disconnect`,
//! `ping`, `execute`, and the transaction boundary) become suspension
//! points. A backend crate that wants both a sync and an async entry point
//! implements [`crate::backend::StorageBackend`] and this trait side by
//! side against the same underlying driver handle.

use async_trait::async_trait;

use crate::backend::{ExecuteRequest, ExplainResult};
use crate::capabilities::Capabilities;
use crate::dialect::SqlDialect;
use crate::error::DbError;
use crate::query::{QueryResult, Row};
use crate::value::Value;

#[async_trait]
pub trait AsyncStorageBackend: Send + Sync {
    async fn connect(&self) -> Result<(), DbError>;

    async fn disconnect(&self) -> Result<(), DbError>;

    async fn ping(&self, reconnect: bool) -> Result<bool, DbError>;

    fn dialect(&self) -> &dyn SqlDialect;

    fn capabilities(&self) -> &Capabilities {
        self.dialect().capabilities()
    }

    async fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError>;

    async fn execute(&self, request: ExecuteRequest) -> Result<QueryResult, DbError> {
        let ExecuteRequest { mut sql, params, returning } = request;

        match returning {
            Some(req) => {
                let columns = req.columns.unwrap_or_default();
                for column in &columns {
                    crate::query_safety::validate_identifier(column)?;
                }
                match self.dialect().returning_clause(&columns, req.force)? {
                    Some(clause) => {
                        sql.push(' ');
                        sql.push_str(&clause);
                        self.execute_raw(&sql, &params).await
                    }
                    None => {
                        let mut result = self.execute_raw(&sql, &params).await?;
                        result.returning_degraded = true;
                        Ok(result)
                    }
                }
            }
            None => self.execute_raw(&sql, &params).await,
        }
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        Ok(self.execute_raw(sql, params).await?.rows)
    }

    async fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    async fn explain(&self, sql: &str, params: &[Value]) -> Result<ExplainResult, DbError> {
        let prefix = self.dialect().explain_prefix(&crate::expr::ExplainOptions::new())?;
        let result = self.execute_raw(&format!("{prefix} {sql}"), params).await?;
        let raw = result
            .rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|v| v.as_display_string())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ExplainResult { raw, structured: None })
    }

    async fn begin(&self) -> Result<(), DbError>;

    async fn commit(&self) -> Result<(), DbError>;

    async fn rollback(&self) -> Result<(), DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::AnsiDialect;
    use std::sync::Mutex;

    /// A minimal in-memory backend exercising only the default methods above;
    /// `execute_raw` ignores `sql`/`params` and always returns one configured row.
    struct FakeAsyncBackend {
        dialect: AnsiDialect,
        row: Vec<Value>,
    }

    #[async_trait]
    impl AsyncStorageBackend for FakeAsyncBackend {
        async fn connect(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn ping(&self, _reconnect: bool) -> Result<bool, DbError> {
            Ok(true)
        }

        fn dialect(&self) -> &dyn SqlDialect {
            &self.dialect
        }

        async fn execute_raw(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult, DbError> {
            Ok(QueryResult {
                columns: Vec::new(),
                rows: vec![self.row.clone()],
                affected_rows: None,
                execution_time: std::time::Duration::ZERO,
                returning_degraded: false,
            })
        }

        async fn begin(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn commit(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn rollback(&self) -> Result<(), DbError> {
            Ok(())
        }
    }

    /// Reports one configured error instead of ever succeeding, so
    /// `force: true` RETURNING negotiation's degraded path can be exercised
    /// independently of the always-succeeding fake above.
    struct DegradingAsyncBackend {
        dialect: AnsiDialect,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl AsyncStorageBackend for DegradingAsyncBackend {
        async fn connect(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn ping(&self, _reconnect: bool) -> Result<bool, DbError> {
            Ok(true)
        }

        fn dialect(&self) -> &dyn SqlDialect {
            &self.dialect
        }

        async fn execute_raw(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult, DbError> {
            *self.calls.lock().unwrap() += 1;
            Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                affected_rows: Some(1),
                execution_time: std::time::Duration::ZERO,
                returning_degraded: false,
            })
        }

        async fn begin(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn commit(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn rollback(&self) -> Result<(), DbError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fetch_all_and_fetch_one_delegate_to_execute_raw() {
        let backend = FakeAsyncBackend { dialect: AnsiDialect::new(), row: vec![Value::Int(7)] };

        let rows = backend.fetch_all("SELECT 1", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![Value::Int(7)]]);

        let one = backend.fetch_one("SELECT 1", &[]).await.unwrap();
        assert_eq!(one, Some(vec![Value::Int(7)]));
    }

    #[tokio::test]
    async fn explain_prepends_dialect_prefix_and_joins_cell_text() {
        let backend = FakeAsyncBackend {
            dialect: AnsiDialect::new(),
            row: vec![Value::Text("a".into()), Value::Text("b".into())],
        };

        let result = backend.explain("SELECT 1", &[]).await.unwrap();
        assert_eq!(result.raw, "a\nb");
        assert!(result.structured.is_none());
    }

    #[tokio::test]
    async fn execute_without_returning_runs_sql_unchanged() {
        let backend = DegradingAsyncBackend { dialect: AnsiDialect::new(), calls: Mutex::new(0) };
        let request = ExecuteRequest::new("UPDATE t SET x = 1", vec![]);
        let result = backend.execute(request).await.unwrap();
        assert_eq!(result.affected_rows, Some(1));
        assert!(!result.returning_degraded);
    }

    #[tokio::test]
    async fn execute_with_unforced_returning_on_a_dialect_without_support_errors() {
        let backend = DegradingAsyncBackend { dialect: AnsiDialect::new(), calls: Mutex::new(0) };
        let request = ExecuteRequest::new("INSERT INTO t VALUES (1)", vec![]).with_returning(crate::backend::ReturningRequest {
            columns: None,
            force: false,
        });
        let err = backend.execute(request).await.unwrap_err();
        assert!(matches!(err, DbError::ReturningNotSupported(_)));
        assert_eq!(*backend.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn execute_with_forced_returning_degrades_instead_of_erroring() {
        let backend = DegradingAsyncBackend { dialect: AnsiDialect::new(), calls: Mutex::new(0) };
        let request = ExecuteRequest::new("INSERT INTO t VALUES (1)", vec![]).with_returning(crate::backend::ReturningRequest {
            columns: None,
            force: true,
        });
        let result = backend.execute(request).await.unwrap();
        assert!(result.returning_degraded);
        assert_eq!(*backend.calls.lock().unwrap(), 1);
    }
}
