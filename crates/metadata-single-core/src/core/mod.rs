// crates/metadata-single-core/src/core/mod.rs
// ============================================================================
// Module: Metadata Single Core Types
// Description: Identifiers, values, and the schema registry.
// Purpose: Group the data model shared by every runtime component.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Data model types for single-valued object metadata. Nothing in this module
//! performs I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod schema;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::IdentifierError;
pub use identifiers::MAX_META_KEY_LENGTH;
pub use identifiers::MetaKey;
pub use identifiers::ObjectId;
pub use identifiers::ObjectType;
pub use schema::MAX_TABLE_PREFIX_LENGTH;
pub use schema::SchemaError;
pub use schema::SchemaRegistry;
pub use schema::StorageTarget;
pub use schema::validate_table_prefix;
pub use value::CodecError;
pub use value::JsonValueCodec;
pub use value::MetaValue;
pub use value::ObjectMeta;
pub use value::RawMetaValue;
pub use value::ValueCodec;
