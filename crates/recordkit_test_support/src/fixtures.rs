//! Small builders for the value shapes `recordkit_core` operates on, so
//! tests can assemble a [`QueryResult`] or a row without repeating its full
//! field list every time.

use recordkit_core::{ColumnMeta, QueryResult, Row, Value};
use std::time::Duration;

pub fn column(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> ColumnMeta {
    ColumnMeta { name: name.into(), type_name: type_name.into(), nullable }
}

pub fn table_result(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> QueryResult {
    QueryResult {
        columns,
        rows,
        affected_rows: None,
        execution_time: Duration::ZERO,
        returning_degraded: false,
    }
}

/// A DML result reporting only an affected-row count, as `insert`/`update`/
/// `delete` see when no `RETURNING` was requested.
pub fn affected_rows_result(affected_rows: u64) -> QueryResult {
    QueryResult {
        columns: Vec::new(),
        rows: Vec::new(),
        affected_rows: Some(affected_rows),
        execution_time: Duration::ZERO,
        returning_degraded: false,
    }
}

pub fn int_cell(value: i64) -> Value {
    Value::Int(value)
}

pub fn text_cell(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_result_carries_columns_and_rows_with_no_affected_count() {
        let result = table_result(vec![column("id", "int", false)], vec![vec![int_cell(1)]]);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.column_count(), 1);
        assert!(result.affected_rows.is_none());
    }

    #[test]
    fn affected_rows_result_carries_no_rows() {
        let result = affected_rows_result(3);
        assert_eq!(result.affected_rows, Some(3));
        assert!(result.rows.is_empty());
    }
}
