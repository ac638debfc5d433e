//! Configuration module for Avocado.
//!
//! Handles connection configuration, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{ConnectionConfig, ConnectionError, Driver};
pub use settings::{
    expand_env_vars, CacheBackendKind, CacheSettings, CatalogSettings, ConnectionSettings,
    ExportSettings, GraphSettings, QuerySettings, Settings, SettingsError,
};
