// crates/metadata-single-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Metadata Executor
// Description: SqlExecutor backed by SQLite with per-type table bootstrap.
// Purpose: Persist single-valued metadata rows under a composite primary key.
// Dependencies: metadata-single-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements [`SqlExecutor`] over a single `SQLite` connection.
//! Opening the executor creates one table per supported object type:
//!
//! ```text
//! {prefix}{type}meta_single (
//!     {type}_id  INTEGER NOT NULL,
//!     meta_key   TEXT NOT NULL,
//!     meta_value TEXT,
//!     PRIMARY KEY ({type}_id, meta_key)
//! )
//! ```
//!
//! The composite primary key is the physical backstop for the one value per
//! key rule; violations surface as [`SqlError::Constraint`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use metadata_single_core::SchemaRegistry;
use metadata_single_core::SqlError;
use metadata_single_core::SqlExecutor;
use metadata_single_core::SqlParam;
use metadata_single_core::SqlRow;
use metadata_single_core::SqlValue;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the metadata tables.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` metadata executor.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds and must be non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates the configuration without touching the filesystem beyond
    /// checking whether `path` is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a field is out of range.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.busy_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding stored metadata values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for SqlError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message)
            | SqliteStoreError::VersionMismatch(message)
            | SqliteStoreError::Invalid(message) => Self::Db(message),
        }
    }
}

/// Maps a `rusqlite` error onto the executor error taxonomy.
fn map_sql_error(err: &rusqlite::Error) -> SqlError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => SqlError::Constraint(err.to_string()),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => SqlError::Io(err.to_string()),
        _ => SqlError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// `SQLite`-backed [`SqlExecutor`].
///
/// # Invariants
/// - Metadata tables for every registry target exist once construction succeeds.
/// - `SQLite` connection access is serialized through a mutex.
#[derive(Clone)]
pub struct SqliteMetaExecutor {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteMetaExecutor {
    /// Opens the database and creates metadata tables for every registry target.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(
        config: SqliteStoreConfig,
        registry: &SchemaRegistry,
    ) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection, registry)?;
        debug!(path = %config.path.display(), prefix = registry.prefix(), "sqlite meta store opened");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    /// Acquires the connection lock.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }
}

impl SqlExecutor for SqliteMetaExecutor {
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<SqlRow>, SqlError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare_cached(sql).map_err(|err| map_sql_error(&err))?;
        let column_count = statement.column_count();
        let mut rows = statement
            .query(rusqlite::params_from_iter(params.iter().map(bind_param)))
            .map_err(|err| map_sql_error(&err))?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next().map_err(|err| map_sql_error(&err))? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0 .. column_count {
                let value = row.get_ref(index).map_err(|err| map_sql_error(&err))?;
                values.push(read_value(value)?);
            }
            collected.push(SqlRow(values));
        }
        Ok(collected)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, SqlError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare_cached(sql).map_err(|err| map_sql_error(&err))?;
        statement
            .execute(rusqlite::params_from_iter(params.iter().map(bind_param)))
            .map_err(|err| map_sql_error(&err))
    }
}

impl std::fmt::Debug for SqliteMetaExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetaExecutor").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Converts an executor parameter into a `SQLite` value.
fn bind_param(param: &SqlParam) -> Value {
    match param {
        SqlParam::Integer(value) => Value::Integer(*value),
        SqlParam::Text(value) => Value::Text(value.clone()),
    }
}

/// Converts a `SQLite` column value into an executor value.
fn read_value(value: ValueRef<'_>) -> Result<SqlValue, SqlError> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(number) => Ok(SqlValue::Integer(number)),
        ValueRef::Real(number) => Ok(SqlValue::Text(number.to_string())),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => std::str::from_utf8(bytes)
            .map(|text| SqlValue::Text(text.to_string()))
            .map_err(|_| SqlError::Decode("column is not valid utf-8".to_string())),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Creates metadata tables for every registry target or validates the
/// recorded schema version.
fn initialize_schema(
    connection: &mut Connection,
    registry: &SchemaRegistry,
) -> Result<(), SqliteStoreError> {
    let meta_table = format!("{}metadata_single_schema", registry.prefix());
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch(&format!("CREATE TABLE IF NOT EXISTS {meta_table} (version INTEGER NOT NULL);"))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row(&format!("SELECT version FROM {meta_table} LIMIT 1"), params![], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute(&format!("INSERT INTO {meta_table} (version) VALUES (?1)"), params![
                SCHEMA_VERSION
            ])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    for target in registry.targets() {
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {column} INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT,
                PRIMARY KEY ({column}, meta_key)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_meta_key ON {table} (meta_key);",
            table = target.table,
            column = target.id_column,
        ))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
