// crates/metadata-single-core/src/runtime/mod.rs
// ============================================================================
// Module: Metadata Single Runtime
// Description: Metadata store, cache layer, and deletion coordinator.
// Purpose: Layer single-value semantics and caching over the SQL boundary.
// Dependencies: dashmap, tracing, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime components run synchronously on the caller's thread. Callers go
//! through [`MetadataStore`]; the host's deletion events go through
//! [`DeletionCoordinator`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod deletion;
pub mod error;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheStats;
pub use cache::InMemoryCacheService;
pub use cache::MetaCache;
pub use deletion::DeletionCoordinator;
pub use deletion::DrainSummary;
pub use error::MetaError;
pub use store::MetadataStore;
