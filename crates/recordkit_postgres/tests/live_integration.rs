//! End-to-end coverage against a real PostgreSQL server. Gated behind
//! `RECORDKIT_POSTGRES_TEST_HOST`/`RECORDKIT_POSTGRES_TEST_DATABASE` since,
//! unlike the SQLite backend, this needs an external server; tests no-op
//! with a message when the environment isn't configured.

use recordkit_core::{ConnectionConfig, StorageBackend, Value};
use recordkit_postgres::PostgresBackend;

fn test_config() -> Option<ConnectionConfig> {
    let host = std::env::var("RECORDKIT_POSTGRES_TEST_HOST").ok()?;
    let database = std::env::var("RECORDKIT_POSTGRES_TEST_DATABASE").ok()?;
    let mut config = ConnectionConfig::new("postgres", host, database);
    if let Ok(port) = std::env::var("RECORDKIT_POSTGRES_TEST_PORT") {
        config.port = port.parse().ok();
    }
    config.username = std::env::var("RECORDKIT_POSTGRES_TEST_USER").ok();
    config.password = std::env::var("RECORDKIT_POSTGRES_TEST_PASSWORD").ok();
    Some(config)
}

macro_rules! require_postgres {
    () => {
        match test_config() {
            Some(config) => config,
            None => {
                eprintln!("skipping: RECORDKIT_POSTGRES_TEST_HOST/DATABASE not set");
                return;
            }
        }
    };
}

fn connected(config: ConnectionConfig) -> PostgresBackend {
    let backend = PostgresBackend::new(config);
    backend.connect().unwrap();
    backend
}

#[test]
fn connect_create_insert_and_select_round_trip() {
    let config = require_postgres!();
    let backend = connected(config);

    backend.execute_raw("DROP TABLE IF EXISTS recordkit_pg_smoke", &[]).unwrap();
    backend
        .execute_raw(
            "CREATE TABLE recordkit_pg_smoke (id SERIAL PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
            &[],
        )
        .unwrap();

    backend
        .insert(
            "recordkit_pg_smoke",
            &[
                ("name".to_string(), Value::Text("ada".to_string())),
                ("age".to_string(), Value::Int(30)),
            ],
            None,
        )
        .unwrap();

    let rows = backend.fetch_all("SELECT name, age FROM recordkit_pg_smoke", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Text("ada".to_string()));
    assert_eq!(rows[0][1], Value::Int(30));

    backend.execute_raw("DROP TABLE recordkit_pg_smoke", &[]).unwrap();
}

#[test]
fn unique_violation_maps_to_integrity_error() {
    let config = require_postgres!();
    let backend = connected(config);

    backend.execute_raw("DROP TABLE IF EXISTS recordkit_pg_unique", &[]).unwrap();
    backend
        .execute_raw("CREATE TABLE recordkit_pg_unique (id INTEGER PRIMARY KEY)", &[])
        .unwrap();
    backend.execute_raw("INSERT INTO recordkit_pg_unique (id) VALUES (1)", &[]).unwrap();

    let result = backend.execute_raw("INSERT INTO recordkit_pg_unique (id) VALUES (1)", &[]);
    assert!(matches!(result, Err(recordkit_core::DbError::Integrity { .. })));

    backend.execute_raw("DROP TABLE recordkit_pg_unique", &[]).unwrap();
}

#[test]
fn reconnect_after_disconnect_restores_liveness() {
    let config = require_postgres!();
    let backend = connected(config);
    assert!(backend.ping(false).unwrap());
    backend.disconnect().unwrap();
    assert!(!backend.ping(false).unwrap());
    assert!(backend.ping(true).unwrap());
}

#[test]
fn explain_reports_structured_json_plan() {
    let config = require_postgres!();
    let backend = connected(config);

    backend.execute_raw("DROP TABLE IF EXISTS recordkit_pg_explain", &[]).unwrap();
    backend
        .execute_raw("CREATE TABLE recordkit_pg_explain (id INTEGER PRIMARY KEY)", &[])
        .unwrap();

    let result = backend.explain("SELECT * FROM recordkit_pg_explain WHERE id = $1", &[Value::Int(1)]).unwrap();
    assert!(!result.raw.is_empty());
    assert!(result.structured.is_some());

    backend.execute_raw("DROP TABLE recordkit_pg_explain", &[]).unwrap();
}
