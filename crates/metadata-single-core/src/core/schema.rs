// crates/metadata-single-core/src/core/schema.rs
// ============================================================================
// Module: Schema Registry
// Description: Maps object types to their physical table and id column.
// Purpose: Single source of truth for supported types and storage naming.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every supported [`ObjectType`] owns one table named
//! `{prefix}{type}meta_single` with an id column named `{type}_id`. The
//! registry precomputes these names once so operations never build SQL
//! identifiers from caller input.
//!
//! Invariants:
//! - The table prefix is limited to ASCII alphanumerics and `_`.
//! - Each type resolves to exactly one [`StorageTarget`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::IdentifierError;
use crate::core::identifiers::ObjectType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum table prefix length.
pub const MAX_TABLE_PREFIX_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Object type is not supported.
    #[error(transparent)]
    NotSupported(#[from] IdentifierError),
    /// Table prefix contains disallowed characters or is too long.
    #[error("invalid table prefix: {0}")]
    InvalidPrefix(String),
}

// ============================================================================
// SECTION: Storage Target
// ============================================================================

/// Physical naming for one object type.
///
/// # Invariants
/// - `table` and `id_column` are safe SQL identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    /// Object type served by this target.
    pub object_type: ObjectType,
    /// Table name.
    pub table: String,
    /// Object id column name.
    pub id_column: String,
    /// Cache namespace for entries of this type.
    pub cache_group: String,
}

impl StorageTarget {
    /// Builds the storage target for a type under the given prefix.
    fn new(prefix: &str, object_type: ObjectType) -> Self {
        let name = object_type.as_str();
        Self {
            object_type,
            table: format!("{prefix}{name}meta_single"),
            id_column: format!("{name}_id"),
            cache_group: format!("{prefix}{name}_meta_single"),
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of supported object types and their storage targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    /// Table prefix shared by all targets.
    prefix: String,
    /// Targets indexed in [`ObjectType::ALL`] order.
    targets: [StorageTarget; 3],
}

impl SchemaRegistry {
    /// Creates a registry with the given table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidPrefix`] when the prefix is not a safe identifier fragment.
    pub fn new(prefix: impl Into<String>) -> Result<Self, SchemaError> {
        let prefix = prefix.into();
        validate_table_prefix(&prefix)?;
        let targets = build_targets(&prefix);
        Ok(Self {
            prefix,
            targets,
        })
    }

    /// Returns the configured table prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolves the storage target for a supported type.
    #[must_use]
    pub fn resolve(&self, object_type: ObjectType) -> &StorageTarget {
        &self.targets[object_type.index()]
    }

    /// Resolves a storage target from an untyped type name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotSupported`] when the name is not a supported type.
    pub fn resolve_name(&self, name: &str) -> Result<&StorageTarget, SchemaError> {
        let object_type = name.parse::<ObjectType>()?;
        Ok(self.resolve(object_type))
    }

    /// Returns every storage target.
    #[must_use]
    pub fn targets(&self) -> &[StorageTarget] {
        &self.targets
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            targets: build_targets(""),
        }
    }
}

/// Builds one target per supported type, in [`ObjectType::ALL`] order.
fn build_targets(prefix: &str) -> [StorageTarget; 3] {
    ObjectType::ALL.map(|object_type| StorageTarget::new(prefix, object_type))
}

/// Validates a table prefix.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidPrefix`] when the prefix is too long or has disallowed characters.
pub fn validate_table_prefix(prefix: &str) -> Result<(), SchemaError> {
    if prefix.len() > MAX_TABLE_PREFIX_LENGTH {
        return Err(SchemaError::InvalidPrefix(format!(
            "table prefix exceeds {MAX_TABLE_PREFIX_LENGTH} characters"
        )));
    }
    if !prefix.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(SchemaError::InvalidPrefix(
            "table prefix must contain only ASCII letters, digits, or '_'".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
