//! End-to-end coverage against a real SQLite file on disk. Unlike the
//! PostgreSQL and MySQL counterparts, this needs no external server, so it
//! runs unconditionally rather than being gated behind a connection
//! environment variable.

use recordkit_core::{StorageBackend, TransactionHandle, Value};
use recordkit_sqlite::SqliteBackend;

fn connected() -> (SqliteBackend, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::new(dir.path().join("test.sqlite"));
    backend.connect().unwrap();
    (backend, dir)
}

#[test]
fn connect_create_insert_and_select_round_trip() {
    let (backend, _dir) = connected();

    backend
        .execute_raw(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
            &[],
        )
        .unwrap();

    backend
        .insert(
            "users",
            &[
                ("name".to_string(), Value::Text("grace".to_string())),
                ("age".to_string(), Value::Int(36)),
            ],
            None,
        )
        .unwrap();

    let rows = backend.fetch_all("SELECT name, age FROM users", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Text("grace".to_string()));
    assert_eq!(rows[0][1], Value::Int(36));
}

#[test]
fn nested_transaction_rolls_back_to_savepoint() {
    let (backend, _dir) = connected();
    backend
        .execute_raw("CREATE TABLE counters (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)", &[])
        .unwrap();
    backend
        .insert("counters", &[("value".to_string(), Value::Int(1))], None)
        .unwrap();

    backend
        .transaction(Box::new(|outer: &TransactionHandle| {
            let savepoint = outer.savepoint(None)?;
            backend.execute_raw("UPDATE counters SET value = 2 WHERE id = 1", &[])?;
            outer.rollback_to(&savepoint)?;
            Ok(())
        }))
        .unwrap();

    let rows = backend.fetch_all("SELECT value FROM counters", &[]).unwrap();
    assert_eq!(rows[0][0], Value::Int(1));
}

#[test]
fn reconnect_after_disconnect_restores_liveness() {
    let (backend, _dir) = connected();
    assert!(backend.ping(false).unwrap());
    backend.disconnect().unwrap();
    assert!(!backend.ping(false).unwrap());
    assert!(backend.ping(true).unwrap());
}

#[test]
fn explain_query_plan_reports_rows() {
    let (backend, _dir) = connected();
    backend
        .execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .unwrap();
    let result = backend.explain("SELECT * FROM t WHERE id = ?", &[Value::Int(1)]).unwrap();
    assert!(!result.raw.is_empty());
    assert!(result.structured.is_some());
}
