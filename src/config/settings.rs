//! TOML-based configuration for Avocado.
//!
//! Supports a config file (avocado.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [connections.default]
//! driver = "sqlite"
//! connection_string = "${HR_DB}"
//!
//! [catalog]
//! path = "./catalog.db"
//! site = "internal"
//! enumerable_maximum = 30
//!
//! [catalog.simple_types]
//! decimal = "string"
//!
//! [cache]
//! backend = "sqlite"
//!
//! [graph]
//! root = "employee"
//! exclude = ["audit_log"]
//! routes = [{ from = "employee", to = "project", join_column = "manager_id" }]
//!
//! [export]
//! threads = 4
//! read_mode = "cached_threaded"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::connection::{ConnectionConfig, Driver};
use crate::export::ReadMode;
use crate::graph::Route;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,

    pub catalog: CatalogSettings,

    pub cache: CacheSettings,

    pub graph: GraphSettings,

    pub query: QuerySettings,

    pub export: ExportSettings,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Database driver (sqlite, postgres, mysql).
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,
}

impl ConnectionSettings {
    /// Get the driver type.
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        Driver::from_str(&self.driver)
            .map_err(|_| SettingsError::UnsupportedDriver(self.driver.clone()))
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }

    pub fn resolve(&self) -> Result<ConnectionConfig, SettingsError> {
        Ok(ConnectionConfig {
            driver: self.driver_type()?,
            connection_string: self.resolved_connection_string()?,
        })
    }
}

/// Catalog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Catalog store location; in memory when unset.
    pub path: Option<String>,

    /// Current site. Records restricted to other sites are hidden.
    pub site: Option<String>,

    /// Distinct-value ceiling for enumerable fields.
    pub enumerable_maximum: u64,

    /// Cache distinct values and value labels.
    pub data_cache_enabled: bool,

    /// Consult the permission checker on published queries.
    pub permissions_enabled: bool,

    /// Internal type (or family) -> simple type overrides.
    pub simple_types: HashMap<String, String>,

    /// Simple type -> allowed operator uids overrides.
    pub operators: HashMap<String, Vec<String>>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: None,
            site: None,
            enumerable_maximum: 30,
            data_cache_enabled: true,
            permissions_enabled: false,
            simple_types: HashMap::new(),
            operators: HashMap::new(),
        }
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Sqlite,
}

/// Cache configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,

    /// SQLite cache file; the user cache directory when unset.
    pub path: Option<String>,
}

/// Schema graph configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Root table every query is anchored on.
    pub root: Option<String>,

    /// Tables never joined.
    pub exclude: Vec<String>,

    pub routes: Vec<Route>,
}

/// Query construction defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Apply DISTINCT to composed queries.
    pub distinct: bool,

    /// Page size when a result request gives none.
    pub default_limit: Option<u64>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            distinct: true,
            default_limit: None,
        }
    }
}

/// Exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Worker pool size for threaded read modes.
    pub threads: usize,

    /// Rows per threaded batch.
    pub chunk_size: usize,

    pub read_mode: ReadMode,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            chunk_size: 256,
            read_mode: ReadMode::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        if settings.export.chunk_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "export.chunk_size must be positive".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `AVOCADO_CONFIG`
    /// 2. `./avocado.toml`
    /// 3. `~/.config/avocado/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("AVOCADO_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("avocado.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("avocado").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }

    /// Get the default connection ("default" if it exists, else the first
    /// by name).
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        if let Some(conn) = self.connections.get("default") {
            return Some(("default", conn));
        }
        self.connections
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Catalog store path with environment variables expanded.
    pub fn catalog_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.catalog
            .path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // lone $
                result.push('$');
                continue;
            }
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_braces() {
        env::set_var("AVOCADO_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${AVOCADO_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            expand_env_vars("prefix_${AVOCADO_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        env::remove_var("AVOCADO_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        env::set_var("AVOCADO_TEST_VAR2", "world");
        assert_eq!(expand_env_vars("$AVOCADO_TEST_VAR2").unwrap(), "world");
        assert_eq!(expand_env_vars("$AVOCADO_TEST_VAR2!").unwrap(), "world!");
        assert_eq!(expand_env_vars("cost $ 5").unwrap(), "cost $ 5");
        env::remove_var("AVOCADO_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(_))));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[connections.hr]
driver = "sqlite"
connection_string = "./hr.db"

[connections.warehouse]
driver = "postgres"
connection_string = "postgres://localhost/warehouse"

[catalog]
site = "internal"
enumerable_maximum = 10
permissions_enabled = true

[catalog.simple_types]
decimal = "string"

[catalog.operators]
boolean = ["exact"]

[cache]
backend = "sqlite"

[graph]
root = "employee"
exclude = ["audit"]
routes = [{ from = "employee", to = "project", join_column = "manager_id", symmetrical = true }]

[query]
distinct = false

[export]
threads = 2
chunk_size = 64
read_mode = "cached_threaded"
"#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.connections.len(), 2);
        assert_eq!(
            settings.get_connection("warehouse").unwrap().driver_type().unwrap(),
            Driver::Postgres
        );
        assert_eq!(settings.default_connection().unwrap().0, "hr");

        assert_eq!(settings.catalog.site.as_deref(), Some("internal"));
        assert_eq!(settings.catalog.enumerable_maximum, 10);
        assert!(settings.catalog.data_cache_enabled);
        assert_eq!(settings.catalog.simple_types["decimal"], "string");

        assert_eq!(settings.cache.backend, CacheBackendKind::Sqlite);
        assert_eq!(settings.graph.root.as_deref(), Some("employee"));
        assert!(settings.graph.routes[0].symmetrical);
        assert!(!settings.query.distinct);
        assert_eq!(settings.export.read_mode, ReadMode::CachedThreaded);
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.catalog.enumerable_maximum, 30);
        assert!(settings.query.distinct);
        assert_eq!(settings.export.chunk_size, 256);
        assert!(settings.export.threads >= 1);
        assert_eq!(settings.export.read_mode, ReadMode::Default);
        assert!(settings.default_connection().is_none());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = Settings::from_toml("[export]\nchunk_size = 0\n");
        assert!(matches!(result, Err(SettingsError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Settings::from_file("/nonexistent/avocado.toml");
        assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
    }
}
