//! End-to-end coverage against a real MySQL/MariaDB server. Gated behind
//! `RECORDKIT_MYSQL_TEST_HOST`/`RECORDKIT_MYSQL_TEST_DATABASE` since this
//! needs an external server; tests no-op with a message when the
//! environment isn't configured.

use recordkit_core::{ConnectionConfig, StorageBackend, Value};
use recordkit_mysql::MysqlBackend;

fn test_config() -> Option<ConnectionConfig> {
    let host = std::env::var("RECORDKIT_MYSQL_TEST_HOST").ok()?;
    let database = std::env::var("RECORDKIT_MYSQL_TEST_DATABASE").ok()?;
    let mut config = ConnectionConfig::new("mysql", host, database);
    if let Ok(port) = std::env::var("RECORDKIT_MYSQL_TEST_PORT") {
        config.port = port.parse().ok();
    }
    config.username = std::env::var("RECORDKIT_MYSQL_TEST_USER").ok();
    config.password = std::env::var("RECORDKIT_MYSQL_TEST_PASSWORD").ok();
    Some(config)
}

macro_rules! require_mysql {
    () => {
        match test_config() {
            Some(config) => config,
            None => {
                eprintln!("skipping: RECORDKIT_MYSQL_TEST_HOST/DATABASE not set");
                return;
            }
        }
    };
}

fn connected(config: ConnectionConfig) -> MysqlBackend {
    let backend = MysqlBackend::new(config);
    backend.connect().unwrap();
    backend
}

#[test]
fn connect_create_insert_and_select_round_trip() {
    let config = require_mysql!();
    let backend = connected(config);

    backend.execute_raw("DROP TABLE IF EXISTS recordkit_mysql_smoke", &[]).unwrap();
    backend
        .execute_raw(
            "CREATE TABLE recordkit_mysql_smoke (id INTEGER PRIMARY KEY AUTO_INCREMENT, name TEXT NOT NULL, age INTEGER)",
            &[],
        )
        .unwrap();

    backend
        .insert(
            "recordkit_mysql_smoke",
            &[
                ("name".to_string(), Value::Text("hopper".to_string())),
                ("age".to_string(), Value::Int(85)),
            ],
            None,
        )
        .unwrap();

    let rows = backend.fetch_all("SELECT name, age FROM recordkit_mysql_smoke", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Text("hopper".to_string()));
    assert_eq!(rows[0][1], Value::Int(85));

    backend.execute_raw("DROP TABLE recordkit_mysql_smoke", &[]).unwrap();
}

#[test]
fn unique_violation_maps_to_integrity_error() {
    let config = require_mysql!();
    let backend = connected(config);

    backend.execute_raw("DROP TABLE IF EXISTS recordkit_mysql_unique", &[]).unwrap();
    backend
        .execute_raw("CREATE TABLE recordkit_mysql_unique (id INTEGER PRIMARY KEY)", &[])
        .unwrap();
    backend.execute_raw("INSERT INTO recordkit_mysql_unique (id) VALUES (1)", &[]).unwrap();

    let result = backend.execute_raw("INSERT INTO recordkit_mysql_unique (id) VALUES (1)", &[]);
    assert!(matches!(result, Err(recordkit_core::DbError::Integrity { .. })));

    backend.execute_raw("DROP TABLE recordkit_mysql_unique", &[]).unwrap();
}

#[test]
fn reconnect_after_disconnect_restores_liveness() {
    let config = require_mysql!();
    let backend = connected(config);
    assert!(backend.ping(false).unwrap());
    backend.disconnect().unwrap();
    assert!(!backend.ping(false).unwrap());
    assert!(backend.ping(true).unwrap());
}

#[test]
fn nested_transaction_rollback_to_savepoint_keeps_only_the_outer_insert() {
    let config = require_mysql!();
    let backend = connected(config);

    backend.execute_raw("DROP TABLE IF EXISTS recordkit_mysql_tx", &[]).unwrap();
    backend.execute_raw("CREATE TABLE recordkit_mysql_tx (id INTEGER PRIMARY KEY)", &[]).unwrap();

    backend.begin().unwrap();
    backend.execute_raw("INSERT INTO recordkit_mysql_tx (id) VALUES (1)", &[]).unwrap();
    backend.begin().unwrap();
    backend.execute_raw("INSERT INTO recordkit_mysql_tx (id) VALUES (2)", &[]).unwrap();
    backend.rollback().unwrap();
    backend.commit().unwrap();

    let rows = backend.fetch_all("SELECT id FROM recordkit_mysql_tx ORDER BY id", &[]).unwrap();
    assert_eq!(rows, vec![vec![Value::Int(1)]]);

    backend.execute_raw("DROP TABLE recordkit_mysql_tx", &[]).unwrap();
}
