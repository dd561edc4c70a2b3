// crates/metadata-single-core/src/lib.rs
// ============================================================================
// Module: Metadata Single Core Library
// Description: Single-valued object metadata with a read-through cache.
// Purpose: Attach at most one value per key to posts, comments, and users.
// Dependencies: dashmap, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Metadata Single stores key/value metadata for host objects where each
//! (object, key) pair holds at most one value. Storage is any relational
//! store reachable through [`SqlExecutor`]; reads are served from a
//! per-object cache that writers invalidate.
//! Invariants:
//! - Unsupported types, invalid ids, and empty keys are rejected before I/O.
//! - A cache entry is always the complete mapping for one object.
//! - Deleting a host object removes all of its metadata via
//!   [`DeletionCoordinator`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::CodecError;
pub use crate::core::IdentifierError;
pub use crate::core::JsonValueCodec;
pub use crate::core::MAX_META_KEY_LENGTH;
pub use crate::core::MAX_TABLE_PREFIX_LENGTH;
pub use crate::core::MetaKey;
pub use crate::core::MetaValue;
pub use crate::core::ObjectId;
pub use crate::core::ObjectMeta;
pub use crate::core::ObjectType;
pub use crate::core::RawMetaValue;
pub use crate::core::SchemaError;
pub use crate::core::SchemaRegistry;
pub use crate::core::StorageTarget;
pub use crate::core::ValueCodec;
pub use crate::core::validate_table_prefix;
pub use crate::interfaces::CacheKey;
pub use crate::interfaces::CacheService;
pub use crate::interfaces::DeletionSource;
pub use crate::interfaces::ObjectDeleted;
pub use crate::interfaces::SqlError;
pub use crate::interfaces::SqlExecutor;
pub use crate::interfaces::SqlParam;
pub use crate::interfaces::SqlRow;
pub use crate::interfaces::SqlValue;
pub use crate::runtime::CacheStats;
pub use crate::runtime::DeletionCoordinator;
pub use crate::runtime::DrainSummary;
pub use crate::runtime::InMemoryCacheService;
pub use crate::runtime::MetaCache;
pub use crate::runtime::MetaError;
pub use crate::runtime::MetadataStore;
