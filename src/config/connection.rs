//! Database connection configuration.
//!
//! Supports configuration via environment variables:
//! - `AVOCADO_DB_DRIVER`: Database driver (sqlite, postgres, mysql)
//! - `AVOCADO_DB_URL`: Connection string, or a file path for SQLite

use std::env;

use crate::sql::Dialect;

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported driver: {0}. Supported: sqlite, postgres, mysql")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// SQLite (file or in-memory)
    Sqlite,
    /// PostgreSQL
    Postgres,
    /// MySQL / MariaDB
    MySql,
}

impl Driver {
    /// Parse driver from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConnectionError> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::MySql),
            other => Err(ConnectionError::UnsupportedDriver(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
        }
    }

    /// SQL dialect spoken by this driver.
    pub fn dialect(&self) -> Dialect {
        match self {
            Driver::Sqlite => Dialect::Sqlite,
            Driver::Postgres => Dialect::Postgres,
            Driver::MySql => Dialect::MySql,
        }
    }
}

/// Resolved connection: a driver and its connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub driver: Driver,
    /// File path for SQLite, URL otherwise.
    pub connection_string: String,
}

impl ConnectionConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            driver: Driver::Sqlite,
            connection_string: path.into(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `AVOCADO_DB_DRIVER` defaults to sqlite; `AVOCADO_DB_URL` is required.
    pub fn from_env() -> Result<Self, ConnectionError> {
        let driver = match env::var("AVOCADO_DB_DRIVER") {
            Ok(s) => Driver::from_str(&s)?,
            Err(_) => Driver::Sqlite,
        };
        let connection_string = env::var("AVOCADO_DB_URL")
            .map_err(|_| ConnectionError::MissingEnvVar("AVOCADO_DB_URL".to_string()))?;
        if connection_string.trim().is_empty() {
            return Err(ConnectionError::InvalidConfig(
                "AVOCADO_DB_URL is empty".to_string(),
            ));
        }
        Ok(Self {
            driver,
            connection_string,
        })
    }
}
