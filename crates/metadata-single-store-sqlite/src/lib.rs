// crates/metadata-single-store-sqlite/src/lib.rs
// ============================================================================
// Module: Metadata Single SQLite Store Library
// Description: SQLite-backed SQL executor for single-valued metadata.
// Purpose: Provide the durable relational store behind `MetadataStore`.
// Dependencies: metadata-single-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteMetaExecutor`], a [`SqlExecutor`] over a
//! single `SQLite` database. Opening it bootstraps the per-type metadata
//! tables described by a [`SchemaRegistry`].
//!
//! [`SqlExecutor`]: metadata_single_core::SqlExecutor
//! [`SchemaRegistry`]: metadata_single_core::SchemaRegistry

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteMetaExecutor;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
