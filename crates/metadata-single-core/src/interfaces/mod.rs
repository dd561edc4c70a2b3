// crates/metadata-single-core/src/interfaces/mod.rs
// ============================================================================
// Module: Metadata Single Interfaces
// Description: Backend-agnostic boundaries for storage, caching, and deletion events.
// Purpose: Define the contract surfaces the metadata runtime depends on.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The runtime never talks to a database, cache, or host event bus directly.
//! It issues parameterized SQL through [`SqlExecutor`], stores per-object
//! mappings through [`CacheService`], and receives deletions from a
//! [`DeletionSource`]. Implementations must report failures rather than
//! panic; the runtime turns them into recoverable operation errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc;

use thiserror::Error;

use crate::core::identifiers::IdentifierError;
use crate::core::identifiers::ObjectId;
use crate::core::identifiers::ObjectType;
use crate::core::value::ObjectMeta;

// ============================================================================
// SECTION: SQL Executor
// ============================================================================

/// Positional SQL parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// Signed integer parameter.
    Integer(i64),
    /// Text parameter.
    Text(String),
}

impl From<ObjectId> for SqlParam {
    fn from(value: ObjectId) -> Self {
        Self::Integer(value.as_i64())
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Column value returned by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Integer column value.
    Integer(i64),
    /// Text column value.
    Text(String),
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRow(pub Vec<SqlValue>);

impl SqlRow {
    /// Returns the integer at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Decode`] when the column is missing or not an integer.
    pub fn integer(&self, index: usize) -> Result<i64, SqlError> {
        match self.0.get(index) {
            Some(SqlValue::Integer(value)) => Ok(*value),
            Some(SqlValue::Text(text)) => text
                .parse::<i64>()
                .map_err(|_| SqlError::Decode(format!("column {index} is not an integer"))),
            _ => Err(SqlError::Decode(format!("column {index} is not an integer"))),
        }
    }

    /// Returns the text at `index`, or `None` for SQL `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Decode`] when the column is missing.
    pub fn text(&self, index: usize) -> Result<Option<String>, SqlError> {
        match self.0.get(index) {
            Some(SqlValue::Text(text)) => Ok(Some(text.clone())),
            Some(SqlValue::Integer(value)) => Ok(Some(value.to_string())),
            Some(SqlValue::Null) => Ok(None),
            None => Err(SqlError::Decode(format!("column {index} is missing"))),
        }
    }
}

/// SQL executor errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Constraint` is reserved for uniqueness/primary-key violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// Statement violated a uniqueness constraint.
    #[error("sql constraint violation: {0}")]
    Constraint(String),
    /// Connection or lock failure.
    #[error("sql io error: {0}")]
    Io(String),
    /// Engine reported an error.
    #[error("sql db error: {0}")]
    Db(String),
    /// Result row did not have the expected shape.
    #[error("sql decode error: {0}")]
    Decode(String),
}

/// Minimal SQL-executing interface over the relational store.
///
/// Implementations bind `?1`, `?2`, ... placeholders to `params` in order.
pub trait SqlExecutor: Send + Sync {
    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the statement fails.
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<SqlRow>, SqlError>;

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the statement fails.
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, SqlError>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for Arc<T> {
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<SqlRow>, SqlError> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, SqlError> {
        (**self).execute(sql, params)
    }
}

// ============================================================================
// SECTION: Cache Service
// ============================================================================

/// Cache key: per-type namespace plus object identifier.
///
/// # Invariants
/// - Renders as `{group}:{id}`; two keys are equal iff both parts are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Per-type cache namespace.
    pub group: String,
    /// Object identifier.
    pub id: ObjectId,
}

impl CacheKey {
    /// Creates a cache key.
    #[must_use]
    pub fn new(group: impl Into<String>, id: ObjectId) -> Self {
        Self {
            group: group.into(),
            id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.id)
    }
}

/// Generic get/add/delete cache service with no persistence guarantee.
///
/// Entries are immutable snapshots shared behind [`Arc`]; readers never see a
/// partially written mapping.
pub trait CacheService: Send + Sync {
    /// Returns the cached mapping, or `None` when not cached.
    fn get(&self, key: &CacheKey) -> Option<Arc<ObjectMeta>>;

    /// Stores a mapping if the key is not already cached. Returns `true` when stored.
    fn add(&self, key: CacheKey, entry: Arc<ObjectMeta>) -> bool;

    /// Removes a cached mapping. Returns `true` when an entry was present.
    fn delete(&self, key: &CacheKey) -> bool;

    /// Removes every entry in a namespace. Returns the number removed.
    fn flush_group(&self, group: &str) -> usize;
}

impl<T: CacheService + ?Sized> CacheService for Arc<T> {
    fn get(&self, key: &CacheKey) -> Option<Arc<ObjectMeta>> {
        (**self).get(key)
    }

    fn add(&self, key: CacheKey, entry: Arc<ObjectMeta>) -> bool {
        (**self).add(key, entry)
    }

    fn delete(&self, key: &CacheKey) -> bool {
        (**self).delete(key)
    }

    fn flush_group(&self, group: &str) -> usize {
        (**self).flush_group(group)
    }
}

// ============================================================================
// SECTION: Deletion Events
// ============================================================================

/// Notification that a host object was permanently deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectDeleted {
    /// Type of the deleted object.
    pub object_type: ObjectType,
    /// Identifier of the deleted object.
    pub object_id: ObjectId,
}

impl ObjectDeleted {
    /// Creates a deletion notification.
    #[must_use]
    pub const fn new(object_type: ObjectType, object_id: ObjectId) -> Self {
        Self {
            object_type,
            object_id,
        }
    }

    /// Builds a notification from untyped host input.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the type is unsupported or the id is invalid.
    pub fn parse(object_type: &str, object_id: &str) -> Result<Self, IdentifierError> {
        Ok(Self::new(object_type.parse()?, ObjectId::parse(object_id)?))
    }
}

/// Pull-based source of deletion notifications.
pub trait DeletionSource {
    /// Returns the next pending notification, if any.
    fn next_deletion(&mut self) -> Option<ObjectDeleted>;
}

impl DeletionSource for VecDeque<ObjectDeleted> {
    fn next_deletion(&mut self) -> Option<ObjectDeleted> {
        self.pop_front()
    }
}

impl DeletionSource for mpsc::Receiver<ObjectDeleted> {
    fn next_deletion(&mut self) -> Option<ObjectDeleted> {
        self.try_recv().ok()
    }
}
