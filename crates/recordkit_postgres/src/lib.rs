mod driver;

pub use driver::{PostgresBackend, PostgresDialect};
