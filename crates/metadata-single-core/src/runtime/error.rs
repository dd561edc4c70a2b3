// crates/metadata-single-core/src/runtime/error.rs
// ============================================================================
// Module: Metadata Operation Errors
// Description: Error taxonomy shared by the store, cache layer, and coordinator.
// Purpose: Report every failure as a recoverable, classifiable value.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`MetaError`] is the failure side of every metadata operation. Nothing in
//! the runtime aborts the host process; callers decide whether to retry, fall
//! back to update, or ignore.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::IdentifierError;
use crate::core::schema::SchemaError;
use crate::core::value::CodecError;
use crate::interfaces::SqlError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Metadata operation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `InvalidInput` is always raised before any storage or cache access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// Unsupported type, invalid id, or invalid key.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A record already exists for the object and key.
    #[error("meta key already exists: {object_type}/{object_id}/{key}")]
    AlreadyExists {
        /// Object type name.
        object_type: &'static str,
        /// Object identifier.
        object_id: u64,
        /// Metadata key.
        key: String,
    },
    /// No record matched a delete.
    #[error("meta key not found: {0}")]
    NotFound(String),
    /// Underlying storage failed.
    #[error("storage failure: {0}")]
    Storage(#[from] SqlError),
    /// Value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<IdentifierError> for MetaError {
    fn from(error: IdentifierError) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

impl From<SchemaError> for MetaError {
    fn from(error: SchemaError) -> Self {
        Self::InvalidInput(error.to_string())
    }
}
