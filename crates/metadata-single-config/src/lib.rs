// crates/metadata-single-config/src/lib.rs
// ============================================================================
// Module: Metadata Single Config Library
// Description: Canonical config model and validation for Metadata Single.
// Purpose: Single source of truth for metadata-single.toml semantics.
// Dependencies: metadata-single-core, metadata-single-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `metadata-single-config` defines the configuration model for the metadata
//! store. It provides strict, fail-closed validation and wires a validated
//! config into a ready [`metadata_single_core::MetadataStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::MetadataSingleConfig;
pub use config::SchemaConfig;
