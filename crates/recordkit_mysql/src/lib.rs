mod driver;

pub use driver::{MysqlBackend, MysqlDialect};
