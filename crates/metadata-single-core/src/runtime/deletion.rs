// crates/metadata-single-core/src/runtime/deletion.rs
// ============================================================================
// Module: Deletion Coordinator
// Description: Removes all metadata of an object after the host deletes it.
// Purpose: Keep metadata and cache state consistent with host object lifecycle.
// Dependencies: tracing, crate::runtime::store
// ============================================================================

//! ## Overview
//! The host reports "object of type T with id I was deleted" as an
//! [`ObjectDeleted`] event. [`DeletionCoordinator`] reads the object's full
//! mapping and deletes each key through [`MetadataStore::delete`], so every
//! removal takes the same invalidation path as any other delete.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::core::identifiers::MetaKey;
use crate::core::identifiers::ObjectType;
use crate::interfaces::DeletionSource;
use crate::interfaces::ObjectDeleted;
use crate::interfaces::SqlExecutor;
use crate::runtime::error::MetaError;
use crate::runtime::store::MetadataStore;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Totals from draining a deletion source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Events consumed.
    pub events: usize,
    /// Metadata keys removed across all events.
    pub keys_removed: usize,
    /// Events whose cascade stopped on an error.
    pub failures: usize,
}

/// Cascading metadata cleanup for deleted host objects.
pub struct DeletionCoordinator<E> {
    /// Store used for reads and per-key deletes.
    store: Arc<MetadataStore<E>>,
}

impl<E: SqlExecutor> DeletionCoordinator<E> {
    /// Creates a coordinator over a shared store.
    #[must_use]
    pub const fn new(store: Arc<MetadataStore<E>>) -> Self {
        Self {
            store,
        }
    }

    /// Object types whose deletion notifications this coordinator consumes.
    #[must_use]
    pub const fn subscriptions(&self) -> &'static [ObjectType] {
        &ObjectType::ALL
    }

    /// Removes every metadata key of the deleted object. Returns the number
    /// of keys removed.
    ///
    /// A key that vanished concurrently counts as already removed. Stored
    /// keys that are not valid [`MetaKey`]s (written outside this crate) are
    /// logged and left in place; the rest of the cascade still runs.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] when reading the mapping or deleting a key fails.
    pub fn handle(&self, event: &ObjectDeleted) -> Result<usize, MetaError> {
        let entry = self.store.get_all(event.object_type, event.object_id)?;
        if entry.is_empty() {
            return Ok(0);
        }
        let mut removed = 0;
        for name in entry.keys() {
            let key = match MetaKey::new(name.as_str()) {
                Ok(key) => key,
                Err(err) => {
                    warn!(
                        object_type = %event.object_type,
                        object_id = %event.object_id,
                        error = %err,
                        "meta key skipped in deletion cascade"
                    );
                    continue;
                }
            };
            match self.store.delete(event.object_type, event.object_id, &key) {
                Ok(()) => removed += 1,
                Err(MetaError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        info!(
            object_type = %event.object_type,
            object_id = %event.object_id,
            removed,
            "meta removed for deleted object"
        );
        Ok(removed)
    }

    /// Handles every pending event from a source. Failed events are logged
    /// and counted; they do not stop the drain.
    pub fn drain<S: DeletionSource + ?Sized>(&self, source: &mut S) -> DrainSummary {
        let mut summary = DrainSummary::default();
        while let Some(event) = source.next_deletion() {
            summary.events += 1;
            match self.handle(&event) {
                Ok(removed) => summary.keys_removed += removed,
                Err(err) => {
                    summary.failures += 1;
                    warn!(
                        object_type = %event.object_type,
                        object_id = %event.object_id,
                        error = %err,
                        "meta deletion cascade failed"
                    );
                }
            }
        }
        summary
    }
}

impl<E> std::fmt::Debug for DeletionCoordinator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionCoordinator").finish_non_exhaustive()
    }
}
