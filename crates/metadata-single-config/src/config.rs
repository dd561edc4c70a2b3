// crates/metadata-single-config/src/config.rs
// ============================================================================
// Module: Metadata Single Configuration
// Description: Configuration loading, validation, and store wiring.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: metadata-single-core, metadata-single-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! A loaded config opens the `SQLite` store, bootstraps the metadata tables,
//! and hands back a ready [`MetadataStore`].
//!
//! ```toml
//! [store]
//! path = "data/meta.sqlite"
//! journal_mode = "wal"
//!
//! [schema]
//! table_prefix = "wp_"
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use metadata_single_core::CacheService;
use metadata_single_core::InMemoryCacheService;
use metadata_single_core::MetadataStore;
use metadata_single_core::SchemaRegistry;
use metadata_single_store_sqlite::SqliteMetaExecutor;
use metadata_single_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "metadata-single.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "METADATA_SINGLE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSingleConfig {
    /// `SQLite` store settings.
    pub store: SqliteStoreConfig,
    /// Storage naming settings.
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Storage naming configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    /// Prefix prepended to every metadata table name.
    #[serde(default)]
    pub table_prefix: String,
}

impl SchemaConfig {
    /// Builds the schema registry for this prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the prefix is not a valid SQL
    /// identifier fragment.
    pub fn registry(&self) -> Result<SchemaRegistry, ConfigError> {
        SchemaRegistry::new(self.table_prefix.as_str())
            .map_err(|err| ConfigError::Invalid(format!("schema.table_prefix: {err}")))
    }
}

impl MetadataSingleConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::from_toml_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid config.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
        self.schema.registry()?;
        Ok(())
    }

    /// Opens the store with a private in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the store cannot be
    /// opened.
    pub fn build(&self) -> Result<MetadataStore<SqliteMetaExecutor>, ConfigError> {
        self.build_with_cache(Arc::new(InMemoryCacheService::new()))
    }

    /// Opens the store over a host-provided cache service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the store cannot be
    /// opened.
    pub fn build_with_cache(
        &self,
        cache: Arc<dyn CacheService>,
    ) -> Result<MetadataStore<SqliteMetaExecutor>, ConfigError> {
        self.validate()?;
        let registry = self.schema.registry()?;
        let executor = SqliteMetaExecutor::open(self.store.clone(), &registry)
            .map_err(|err| ConfigError::Store(err.to_string()))?;
        info!(
            path = %self.store.path.display(),
            table_prefix = registry.prefix(),
            "metadata store ready"
        );
        Ok(MetadataStore::with_cache(executor, registry, cache))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Store could not be opened with this configuration.
    #[error("config store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}
