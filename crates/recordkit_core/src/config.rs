//! Connection configuration: the option groups a backend needs to open a
//! connection, plus environment-variable hydration for deployment
//! (`<PREFIX>_<FIELD>` for the well-known fields, `<PREFIX>OPT_<KEY>` for
//! anything backend-specific this struct does not name directly).

use std::collections::HashMap;
use std::time::Duration;

use crate::error::DbError;

/// TLS negotiation strictness, from "don't bother" to "verify everything
/// including the hostname".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    fn parse(raw: &str) -> Result<Self, DbError> {
        Ok(match raw.to_ascii_lowercase().as_str() {
            "disable" => SslMode::Disable,
            "prefer" => SslMode::Prefer,
            "require" => SslMode::Require,
            "verify-ca" | "verify_ca" => SslMode::VerifyCa,
            "verify-full" | "verify_full" => SslMode::VerifyFull,
            other => return Err(DbError::validation(format!("unknown SSL mode '{other}'"))),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub mode: Option<SslMode>,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub verify_identity: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    pub acquire_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub pre_ping: bool,
}

/// The full set of options a backend's `connect()` consults.
///
/// Fields cover the groups common to every SQL backend (host/port/database,
/// pool sizing, TLS, character encoding, timezone); anything backend-specific
/// with no cross-backend equivalent goes in `options` instead of growing
/// this struct indefinitely.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool: PoolConfig,
    pub tls: TlsConfig,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub timezone: Option<String>,
    pub use_server_timezone: bool,
    /// Driver-specific opaque options not otherwise named on this struct,
    /// hydrated from `<PREFIX>OPT_<KEY>` environment variables.
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>, host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            host: host.into(),
            port: None,
            database: database.into(),
            username: None,
            password: None,
            pool: PoolConfig::default(),
            tls: TlsConfig::default(),
            charset: None,
            collation: None,
            timezone: None,
            use_server_timezone: false,
            options: HashMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Hydrate a config from environment variables with the given prefix:
    /// `<PREFIX>_HOST`, `<PREFIX>_PORT`, `<PREFIX>_DATABASE`,
    /// `<PREFIX>_USERNAME`, `<PREFIX>_PASSWORD`, `<PREFIX>_DRIVER`,
    /// `<PREFIX>_CHARSET`, `<PREFIX>_COLLATION`, `<PREFIX>_TIMEZONE`,
    /// `<PREFIX>_SSL_MODE`, `<PREFIX>_POOL_MIN_SIZE`,
    /// `<PREFIX>_POOL_MAX_SIZE`, plus `<PREFIX>OPT_<KEY>` for anything else.
    pub fn from_env(prefix: &str) -> Result<Self, DbError> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`Self::from_env`] but over a caller-supplied iterator, so
    /// tests do not have to mutate the real process environment.
    pub fn from_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, DbError> {
        let field_prefix = format!("{prefix}_");
        let opt_prefix = format!("{prefix}OPT_");

        let mut fields: HashMap<String, String> = HashMap::new();
        let mut options = HashMap::new();

        for (key, value) in vars {
            if let Some(opt_key) = key.strip_prefix(&opt_prefix) {
                options.insert(opt_key.to_string(), value);
            } else if let Some(field) = key.strip_prefix(&field_prefix) {
                fields.insert(field.to_string(), value);
            }
        }

        let host = fields
            .remove("HOST")
            .ok_or_else(|| DbError::validation(format!("missing {field_prefix}HOST")))?;
        let database = fields
            .remove("DATABASE")
            .ok_or_else(|| DbError::validation(format!("missing {field_prefix}DATABASE")))?;
        let driver = fields.remove("DRIVER").unwrap_or_else(|| "postgres".to_string());

        let mut config = Self::new(driver, host, database);
        config.options = options;

        if let Some(port) = fields.remove("PORT") {
            config.port = Some(
                port.parse()
                    .map_err(|_| DbError::validation(format!("invalid {field_prefix}PORT '{port}'")))?,
            );
        }
        config.username = fields.remove("USERNAME");
        config.password = fields.remove("PASSWORD");
        config.charset = fields.remove("CHARSET");
        config.collation = fields.remove("COLLATION");
        config.timezone = fields.remove("TIMEZONE");
        config.use_server_timezone = fields
            .remove("USE_SERVER_TIMEZONE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Some(mode) = fields.remove("SSL_MODE") {
            config.tls.mode = Some(SslMode::parse(&mode)?);
        }
        config.tls.ca_file = fields.remove("SSL_CA");
        config.tls.cert_file = fields.remove("SSL_CERT");
        config.tls.key_file = fields.remove("SSL_KEY");
        config.tls.verify_identity = fields
            .remove("SSL_VERIFY_IDENTITY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Some(min) = fields.remove("POOL_MIN_SIZE") {
            config.pool.min_size = Some(
                min.parse()
                    .map_err(|_| DbError::validation(format!("invalid {field_prefix}POOL_MIN_SIZE '{min}'")))?,
            );
        }
        if let Some(max) = fields.remove("POOL_MAX_SIZE") {
            config.pool.max_size = Some(
                max.parse()
                    .map_err(|_| DbError::validation(format!("invalid {field_prefix}POOL_MAX_SIZE '{max}'")))?,
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vars_hydrates_known_fields_and_opaque_options() {
        let vars = vec![
            ("RK_HOST".to_string(), "db.internal".to_string()),
            ("RK_PORT".to_string(), "5432".to_string()),
            ("RK_DATABASE".to_string(), "app".to_string()),
            ("RK_USERNAME".to_string(), "svc".to_string()),
            ("RKOPT_application_name".to_string(), "billing-worker".to_string()),
        ];
        let config = ConnectionConfig::from_vars("RK", vars).unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, Some(5432));
        assert_eq!(config.database, "app");
        assert_eq!(config.username.as_deref(), Some("svc"));
        assert_eq!(config.option("application_name"), Some("billing-worker"));
    }

    #[test]
    fn from_vars_requires_host_and_database() {
        let vars = vec![("RK_PORT".to_string(), "5432".to_string())];
        assert!(ConnectionConfig::from_vars("RK", vars).is_err());
    }

    #[test]
    fn unknown_ssl_mode_is_a_validation_error() {
        let vars = vec![
            ("RK_HOST".to_string(), "h".to_string()),
            ("RK_DATABASE".to_string(), "d".to_string()),
            ("RK_SSL_MODE".to_string(), "bogus".to_string()),
        ];
        assert!(ConnectionConfig::from_vars("RK", vars).is_err());
    }
}
