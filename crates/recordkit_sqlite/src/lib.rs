//! SQLite storage backend: a [`recordkit_core::StorageBackend`] over `rusqlite`.

mod driver;

pub use driver::{SqliteBackend, SqliteDialect};
