// crates/metadata-single-core/src/runtime/store.rs
// ============================================================================
// Module: Metadata Store
// Description: Single-valued metadata CRUD over a SQL executor and cache layer.
// Purpose: Enforce at-most-one value per object and key with coherent caching.
// Dependencies: tracing, crate::core, crate::interfaces, crate::runtime::cache
// ============================================================================

//! ## Overview
//! [`MetadataStore`] implements add (insert if absent), update (upsert),
//! delete (single key or one key across every object), keyed and full reads,
//! and existence checks.
//!
//! Invariants:
//! - Identifiers are validated by construction; no operation touches storage
//!   or the cache before its inputs are known to be valid.
//! - Write paths check existence against storage, never against the cache.
//! - Every successful write invalidates the affected cache entry before
//!   returning; readers repopulate lazily.
//! - A uniqueness violation raised by storage surfaces as
//!   [`MetaError::AlreadyExists`], never as a panic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::core::identifiers::MetaKey;
use crate::core::identifiers::ObjectId;
use crate::core::identifiers::ObjectType;
use crate::core::schema::SchemaRegistry;
use crate::core::schema::StorageTarget;
use crate::core::value::JsonValueCodec;
use crate::core::value::MetaValue;
use crate::core::value::ObjectMeta;
use crate::core::value::RawMetaValue;
use crate::core::value::ValueCodec;
use crate::interfaces::CacheService;
use crate::interfaces::SqlError;
use crate::interfaces::SqlExecutor;
use crate::interfaces::SqlParam;
use crate::runtime::cache::CacheStats;
use crate::runtime::cache::InMemoryCacheService;
use crate::runtime::cache::MetaCache;
use crate::runtime::error::MetaError;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Single-valued metadata store.
///
/// # Invariants
/// - Every store writing to a cache service goes through the same
///   [`MetaCache`]; use [`MetadataStore::with_meta_cache`] to share one.
/// - Safe to share across threads when the executor is.
pub struct MetadataStore<E> {
    /// SQL executor for the relational store.
    executor: E,
    /// Supported types and their storage naming.
    registry: SchemaRegistry,
    /// Per-object cache layer.
    cache: Arc<MetaCache>,
    /// Value codec applied at the storage boundary.
    codec: Arc<dyn ValueCodec>,
}

impl<E: SqlExecutor> MetadataStore<E> {
    /// Creates a store with a private in-memory cache and the JSON codec.
    #[must_use]
    pub fn new(executor: E, registry: SchemaRegistry) -> Self {
        Self::with_cache(executor, registry, Arc::new(InMemoryCacheService::new()))
    }

    /// Creates a store over a host-provided cache service.
    #[must_use]
    pub fn with_cache(
        executor: E,
        registry: SchemaRegistry,
        cache_service: Arc<dyn CacheService>,
    ) -> Self {
        Self::with_meta_cache(executor, registry, Arc::new(MetaCache::new(cache_service)))
    }

    /// Creates a store over a cache layer shared with other stores.
    #[must_use]
    pub fn with_meta_cache(executor: E, registry: SchemaRegistry, cache: Arc<MetaCache>) -> Self {
        Self {
            executor,
            registry,
            cache,
            codec: Arc::new(JsonValueCodec),
        }
    }

    /// Returns the cache layer, for sharing with another store.
    #[must_use]
    pub const fn meta_cache(&self) -> &Arc<MetaCache> {
        &self.cache
    }

    /// Replaces the value codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Returns the schema registry.
    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Returns the SQL executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns a snapshot of cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Adds a value for a key that the object does not have yet.
    ///
    /// # Errors
    ///
    /// - [`MetaError::AlreadyExists`] when the object already has the key,
    ///   including when a concurrent add wins the primary-key race.
    /// - [`MetaError::Codec`] when the value cannot be encoded.
    /// - [`MetaError::Storage`] when storage fails.
    pub fn add(
        &self,
        object_type: ObjectType,
        object_id: ObjectId,
        key: &MetaKey,
        value: &MetaValue,
    ) -> Result<(), MetaError> {
        let target = self.registry.resolve(object_type);
        let raw = self.codec.encode(value)?;
        if self.count_records(target, object_id, key)? > 0 {
            return Err(already_exists(object_type, object_id, key));
        }
        self.insert_record(target, object_id, key, raw)?;
        self.cache.invalidate(target, object_id);
        debug!(object_type = %object_type, object_id = %object_id, key = %key, "meta added");
        Ok(())
    }

    /// Sets a value, adding the key when the object does not have it.
    ///
    /// # Errors
    ///
    /// - [`MetaError::Codec`] when the value cannot be encoded.
    /// - [`MetaError::AlreadyExists`] when a concurrent add creates the key
    ///   between the lookup and the insert.
    /// - [`MetaError::Storage`] when storage fails.
    pub fn update(
        &self,
        object_type: ObjectType,
        object_id: ObjectId,
        key: &MetaKey,
        value: &MetaValue,
    ) -> Result<(), MetaError> {
        let target = self.registry.resolve(object_type);
        if self.load_raw(target, object_id, key)?.is_none() {
            return self.add(object_type, object_id, key, value);
        }
        let raw = self.codec.encode(value)?;
        let sql = format!(
            "UPDATE {table} SET meta_value = ?1 WHERE {column} = ?2 AND meta_key = ?3",
            table = target.table,
            column = target.id_column,
        );
        self.executor.execute(
            &sql,
            &[SqlParam::Text(raw.into_string()), object_id.into(), key.as_str().into()],
        )?;
        self.cache.invalidate(target, object_id);
        debug!(object_type = %object_type, object_id = %object_id, key = %key, "meta updated");
        Ok(())
    }

    /// Deletes one key from one object.
    ///
    /// # Errors
    ///
    /// - [`MetaError::NotFound`] when the object does not have the key.
    /// - [`MetaError::Storage`] when storage fails.
    pub fn delete(
        &self,
        object_type: ObjectType,
        object_id: ObjectId,
        key: &MetaKey,
    ) -> Result<(), MetaError> {
        let target = self.registry.resolve(object_type);
        let sql = format!(
            "DELETE FROM {table} WHERE meta_key = ?1 AND {column} = ?2",
            table = target.table,
            column = target.id_column,
        );
        let count = self.executor.execute(&sql, &[key.as_str().into(), object_id.into()])?;
        if count == 0 {
            return Err(MetaError::NotFound(format!("{object_type}/{object_id}/{key}")));
        }
        self.cache.invalidate(target, object_id);
        debug!(object_type = %object_type, object_id = %object_id, key = %key, "meta deleted");
        Ok(())
    }

    /// Deletes a key from every object of a type. Returns the number of
    /// records removed.
    ///
    /// The set of affected objects is not known after the delete, so the
    /// whole cache namespace for the type is flushed.
    ///
    /// # Errors
    ///
    /// - [`MetaError::NotFound`] when no object has the key.
    /// - [`MetaError::Storage`] when storage fails.
    pub fn delete_all(&self, object_type: ObjectType, key: &MetaKey) -> Result<usize, MetaError> {
        let target = self.registry.resolve(object_type);
        let sql = format!("DELETE FROM {table} WHERE meta_key = ?1", table = target.table);
        let count = self.executor.execute(&sql, &[key.as_str().into()])?;
        if count == 0 {
            return Err(MetaError::NotFound(format!("{object_type}/*/{key}")));
        }
        self.cache.invalidate_group(target);
        debug!(object_type = %object_type, key = %key, count, "meta deleted for all objects");
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns the decoded value for a key, or `None` when the object does not
    /// have it.
    ///
    /// # Errors
    ///
    /// - [`MetaError::Storage`] when hydration fails.
    /// - [`MetaError::Codec`] when the stored text cannot be decoded.
    pub fn get(
        &self,
        object_type: ObjectType,
        object_id: ObjectId,
        key: &MetaKey,
    ) -> Result<Option<MetaValue>, MetaError> {
        let entry = self.get_all(object_type, object_id)?;
        entry.get(key.as_str()).map(|raw| self.codec.decode(raw)).transpose().map_err(Into::into)
    }

    /// Returns the full raw mapping for an object. Values are still encoded;
    /// use [`MetadataStore::decode`] per entry.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Storage`] when hydration fails.
    pub fn get_all(
        &self,
        object_type: ObjectType,
        object_id: ObjectId,
    ) -> Result<Arc<ObjectMeta>, MetaError> {
        let target = self.registry.resolve(object_type);
        self.cache.get_or_populate_one(&self.executor, target, object_id)
    }

    /// Reports whether an object has a key. Storage failures read as `false`.
    #[must_use]
    pub fn exists(&self, object_type: ObjectType, object_id: ObjectId, key: &MetaKey) -> bool {
        match self.get_all(object_type, object_id) {
            Ok(entry) => entry.contains_key(key.as_str()),
            Err(err) => {
                warn!(
                    object_type = %object_type,
                    object_id = %object_id,
                    error = %err,
                    "meta exists check failed"
                );
                false
            }
        }
    }

    /// Hydrates the cache for many objects of one type with a single storage
    /// query and returns every mapping.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Storage`] when the bulk query fails.
    pub fn prime_cache(
        &self,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeMap<ObjectId, Arc<ObjectMeta>>, MetaError> {
        let target = self.registry.resolve(object_type);
        self.cache.get_or_populate(&self.executor, target, object_ids)
    }

    /// Decodes a raw value taken from [`MetadataStore::get_all`].
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Codec`] when the text is malformed.
    pub fn decode(&self, raw: &RawMetaValue) -> Result<MetaValue, MetaError> {
        Ok(self.codec.decode(raw)?)
    }

    // ------------------------------------------------------------------------
    // Storage helpers
    // ------------------------------------------------------------------------

    /// Counts stored records for an object and key, bypassing the cache.
    fn count_records(
        &self,
        target: &StorageTarget,
        object_id: ObjectId,
        key: &MetaKey,
    ) -> Result<i64, MetaError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE meta_key = ?1 AND {column} = ?2",
            table = target.table,
            column = target.id_column,
        );
        let rows = self.executor.query(&sql, &[key.as_str().into(), object_id.into()])?;
        match rows.first() {
            Some(row) => Ok(row.integer(0)?),
            None => Ok(0),
        }
    }

    /// Loads the stored raw value for an object and key, bypassing the cache.
    fn load_raw(
        &self,
        target: &StorageTarget,
        object_id: ObjectId,
        key: &MetaKey,
    ) -> Result<Option<RawMetaValue>, MetaError> {
        let sql = format!(
            "SELECT meta_value FROM {table} WHERE meta_key = ?1 AND {column} = ?2",
            table = target.table,
            column = target.id_column,
        );
        let rows = self.executor.query(&sql, &[key.as_str().into(), object_id.into()])?;
        match rows.first() {
            Some(row) => Ok(Some(RawMetaValue::new(row.text(0)?.unwrap_or_default()))),
            None => Ok(None),
        }
    }

    /// Inserts a record, mapping a uniqueness violation to `AlreadyExists`.
    fn insert_record(
        &self,
        target: &StorageTarget,
        object_id: ObjectId,
        key: &MetaKey,
        raw: RawMetaValue,
    ) -> Result<(), MetaError> {
        let sql = format!(
            "INSERT INTO {table} ({column}, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            table = target.table,
            column = target.id_column,
        );
        let inserted = self
            .executor
            .execute(&sql, &[object_id.into(), key.as_str().into(), SqlParam::Text(raw.into_string())])
            .map_err(|err| match err {
                SqlError::Constraint(_) => already_exists(target.object_type, object_id, key),
                other => MetaError::Storage(other),
            })?;
        if inserted == 0 {
            return Err(MetaError::Storage(SqlError::Db(format!(
                "insert into {} affected no rows",
                target.table
            ))));
        }
        Ok(())
    }
}

impl<E> std::fmt::Debug for MetadataStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builds the `AlreadyExists` error for an object and key.
fn already_exists(object_type: ObjectType, object_id: ObjectId, key: &MetaKey) -> MetaError {
    MetaError::AlreadyExists {
        object_type: object_type.as_str(),
        object_id: object_id.get(),
        key: key.to_string(),
    }
}
