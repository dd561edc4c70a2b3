// crates/metadata-single-store-sqlite/tests/metadata_store_behavior.rs
// ============================================================================
// Module: Metadata Store Behavior Tests
// Description: End-to-end store, cache, and deletion tests over SQLite.
// Purpose: Validate uniqueness, upsert, cache coherence, batch hydration,
//          key-wide deletes, and deletion cascades against a real database.
// ============================================================================

//! ## Overview
//! Every test opens a fresh on-disk database in a temp dir. Reads that must
//! bypass the cache go straight to the executor; a counting wrapper records
//! how many statements reached storage.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Barrier;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;

use metadata_single_core::DeletionCoordinator;
use metadata_single_core::InMemoryCacheService;
use metadata_single_core::MetaError;
use metadata_single_core::MetaKey;
use metadata_single_core::MetaValue;
use metadata_single_core::MetadataStore;
use metadata_single_core::ObjectDeleted;
use metadata_single_core::ObjectId;
use metadata_single_core::ObjectType;
use metadata_single_core::SchemaRegistry;
use metadata_single_core::SqlError;
use metadata_single_core::SqlExecutor;
use metadata_single_core::SqlParam;
use metadata_single_core::SqlRow;
use metadata_single_store_sqlite::SqliteMetaExecutor;
use metadata_single_store_sqlite::SqliteStoreConfig;
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Executor wrapper that counts read queries reaching storage.
struct CountingExecutor {
    inner: SqliteMetaExecutor,
    queries: AtomicUsize,
}

impl CountingExecutor {
    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }
}

impl SqlExecutor for CountingExecutor {
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<SqlRow>, SqlError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, SqlError> {
        self.inner.execute(sql, params)
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<MetadataStore<CountingExecutor>>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let registry = SchemaRegistry::default();
    let inner = SqliteMetaExecutor::open(
        SqliteStoreConfig::for_path(dir.path().join("meta.sqlite")),
        &registry,
    )
    .unwrap();
    let executor = CountingExecutor {
        inner,
        queries: AtomicUsize::new(0),
    };
    Fixture {
        _dir: dir,
        store: Arc::new(MetadataStore::new(executor, registry)),
    }
}

fn id(raw: u64) -> ObjectId {
    ObjectId::from_raw(raw).unwrap()
}

fn key(name: &str) -> MetaKey {
    MetaKey::new(name).unwrap()
}

/// Reads a stored value straight from the executor, bypassing the cache.
fn stored_value(
    store: &MetadataStore<CountingExecutor>,
    object_type: ObjectType,
    object_id: ObjectId,
    meta_key: &str,
) -> Option<MetaValue> {
    let target = store.registry().resolve(object_type);
    let sql = format!(
        "SELECT meta_value FROM {} WHERE {} = ?1 AND meta_key = ?2",
        target.table, target.id_column
    );
    let rows = store.executor().inner.query(&sql, &[object_id.into(), meta_key.into()]).unwrap();
    assert!(rows.len() <= 1, "more than one stored value for {meta_key}");
    rows.first().map(|row| {
        let text = row.text(0).unwrap().unwrap();
        MetaValue::new(serde_json::from_str(&text).unwrap())
    })
}

fn stored_row_count(store: &MetadataStore<CountingExecutor>, object_type: ObjectType) -> i64 {
    let target = store.registry().resolve(object_type);
    let rows =
        store.executor().inner.query(&format!("SELECT COUNT(*) FROM {}", target.table), &[]).unwrap();
    rows[0].integer(0).unwrap()
}

// ============================================================================
// SECTION: Concrete Scenario
// ============================================================================

#[test]
fn post_lifecycle_scenario() {
    let fixture = fixture();
    let store = &fixture.store;
    let foo = key("foo");

    store.add(ObjectType::Post, id(1), &foo, &"bar".into()).unwrap();
    let second = store.add(ObjectType::Post, id(1), &foo, &"bar".into());
    assert!(matches!(second, Err(MetaError::AlreadyExists { .. })));
    assert_eq!(store.get(ObjectType::Post, id(1), &foo).unwrap(), Some(MetaValue::from("bar")));

    store.update(ObjectType::Post, id(1), &foo, &"baz".into()).unwrap();
    assert_eq!(store.get(ObjectType::Post, id(1), &foo).unwrap(), Some(MetaValue::from("baz")));

    store.delete(ObjectType::Post, id(1), &foo).unwrap();
    assert!(!store.exists(ObjectType::Post, id(1), &foo));
    let again = store.delete(ObjectType::Post, id(1), &foo);
    assert!(matches!(again, Err(MetaError::NotFound(_))));
}

#[test]
fn get_missing_key_is_none_not_error() {
    let fixture = fixture();
    assert_eq!(fixture.store.get(ObjectType::User, id(5), &key("absent")).unwrap(), None);
    assert!(!fixture.store.exists(ObjectType::User, id(5), &key("absent")));
}

#[test]
fn typed_values_round_trip_through_storage() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Settings {
        theme: String,
        size: u32,
    }
    let fixture = fixture();
    let settings = Settings {
        theme: "dark".to_string(),
        size: 12,
    };
    let value = MetaValue::from_typed(&settings).unwrap();
    fixture.store.add(ObjectType::User, id(3), &key("settings"), &value).unwrap();

    let loaded = fixture.store.get(ObjectType::User, id(3), &key("settings")).unwrap().unwrap();

    assert_eq!(loaded.to_typed::<Settings>().unwrap(), settings);
}

// ============================================================================
// SECTION: Uniqueness
// ============================================================================

#[test]
fn second_add_never_alters_stored_value() {
    let fixture = fixture();
    let store = &fixture.store;
    store.add(ObjectType::Comment, id(4), &key("k"), &json!({"a": 1}).into()).unwrap();

    let result = store.add(ObjectType::Comment, id(4), &key("k"), &json!({"a": 2}).into());

    assert!(matches!(result, Err(MetaError::AlreadyExists { object_type: "comment", object_id: 4, .. })));
    assert_eq!(stored_value(store, ObjectType::Comment, id(4), "k"), Some(MetaValue::from(json!({"a": 1}))));
}

#[test]
fn concurrent_adds_store_exactly_one_value() {
    let fixture = fixture();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0 .. threads)
        .map(|index| {
            let store = Arc::clone(&fixture.store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let value = MetaValue::from(i64::try_from(index).unwrap());
                store.add(ObjectType::Post, id(42), &key("race"), &value)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results.iter().filter(|result| result.is_err()) {
        assert!(matches!(result, Err(MetaError::AlreadyExists { .. })), "{result:?}");
    }
    assert_eq!(stored_row_count(&fixture.store, ObjectType::Post), 1);
}

#[test]
fn same_key_is_independent_across_types_and_ids() {
    let fixture = fixture();
    let store = &fixture.store;
    store.add(ObjectType::Post, id(1), &key("k"), &"post".into()).unwrap();
    store.add(ObjectType::User, id(1), &key("k"), &"user".into()).unwrap();
    store.add(ObjectType::Post, id(2), &key("k"), &"post2".into()).unwrap();

    assert_eq!(store.get(ObjectType::Post, id(1), &key("k")).unwrap(), Some(MetaValue::from("post")));
    assert_eq!(store.get(ObjectType::User, id(1), &key("k")).unwrap(), Some(MetaValue::from("user")));
    assert_eq!(store.get(ObjectType::Post, id(2), &key("k")).unwrap(), Some(MetaValue::from("post2")));
}

// ============================================================================
// SECTION: Upsert
// ============================================================================

#[test]
fn update_on_missing_key_matches_add() {
    let fixture = fixture();
    let store = &fixture.store;
    store.update(ObjectType::Post, id(7), &key("a"), &"x".into()).unwrap();
    store.add(ObjectType::Post, id(8), &key("a"), &"x".into()).unwrap();

    let via_update = store.get_all(ObjectType::Post, id(7)).unwrap();
    let via_add = store.get_all(ObjectType::Post, id(8)).unwrap();

    assert_eq!(via_update, via_add);
}

#[test]
fn update_leaves_other_keys_untouched() {
    let fixture = fixture();
    let store = &fixture.store;
    store.add(ObjectType::User, id(2), &key("a"), &"one".into()).unwrap();
    store.add(ObjectType::User, id(2), &key("b"), &"two".into()).unwrap();

    store.update(ObjectType::User, id(2), &key("a"), &"uno".into()).unwrap();

    assert_eq!(stored_value(store, ObjectType::User, id(2), "a"), Some(MetaValue::from("uno")));
    assert_eq!(stored_value(store, ObjectType::User, id(2), "b"), Some(MetaValue::from("two")));
}

#[test]
fn update_replaces_falsy_stored_values_in_place() {
    let fixture = fixture();
    let store = &fixture.store;
    store.add(ObjectType::Post, id(1), &key("flag"), &"".into()).unwrap();
    store.update(ObjectType::Post, id(1), &key("flag"), &"0".into()).unwrap();
    store.update(ObjectType::Post, id(1), &key("flag"), &false.into()).unwrap();

    assert_eq!(stored_row_count(store, ObjectType::Post), 1);
    assert_eq!(store.get(ObjectType::Post, id(1), &key("flag")).unwrap(), Some(MetaValue::from(false)));
}

// ============================================================================
// SECTION: Cache Coherence
// ============================================================================

#[test]
fn reads_after_writes_match_storage() {
    let fixture = fixture();
    let store = &fixture.store;
    let k = key("color");

    store.add(ObjectType::Post, id(9), &k, &"red".into()).unwrap();
    assert_eq!(store.get(ObjectType::Post, id(9), &k).unwrap(), stored_value(store, ObjectType::Post, id(9), "color"));

    store.update(ObjectType::Post, id(9), &k, &"blue".into()).unwrap();
    assert_eq!(store.get(ObjectType::Post, id(9), &k).unwrap(), stored_value(store, ObjectType::Post, id(9), "color"));

    store.delete(ObjectType::Post, id(9), &k).unwrap();
    assert_eq!(store.get(ObjectType::Post, id(9), &k).unwrap(), None);
    assert_eq!(stored_value(store, ObjectType::Post, id(9), "color"), None);
    assert!(!store.exists(ObjectType::Post, id(9), &k));
}

#[test]
fn cached_reads_do_not_touch_storage() {
    let fixture = fixture();
    let store = &fixture.store;
    store.add(ObjectType::Comment, id(1), &key("k"), &1_i64.into()).unwrap();
    store.get_all(ObjectType::Comment, id(1)).unwrap();
    store.executor().reset();

    for _ in 0 .. 5 {
        assert!(store.exists(ObjectType::Comment, id(1), &key("k")));
        store.get(ObjectType::Comment, id(1), &key("k")).unwrap();
    }

    assert_eq!(store.executor().queries(), 0);
    assert!(store.cache_stats().hits >= 10);
}

#[test]
fn shared_cache_service_sees_invalidations_from_every_store() {
    let dir = TempDir::new().unwrap();
    let registry = SchemaRegistry::default();
    let config = SqliteStoreConfig::for_path(dir.path().join("meta.sqlite"));
    let executor = SqliteMetaExecutor::open(config, &registry).unwrap();
    let cache = Arc::new(InMemoryCacheService::new());
    let writer = MetadataStore::with_cache(executor.clone(), registry.clone(), cache.clone());
    let reader = MetadataStore::with_cache(executor, registry, cache);

    writer.add(ObjectType::Post, id(1), &key("k"), &"v1".into()).unwrap();
    assert_eq!(reader.get(ObjectType::Post, id(1), &key("k")).unwrap(), Some(MetaValue::from("v1")));
    writer.update(ObjectType::Post, id(1), &key("k"), &"v2".into()).unwrap();

    assert_eq!(reader.get(ObjectType::Post, id(1), &key("k")).unwrap(), Some(MetaValue::from("v2")));
}

/// Executor that pauses the first bulk hydration query after it has read
/// its rows, until released.
struct PausingExecutor {
    inner: SqliteMetaExecutor,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl SqlExecutor for PausingExecutor {
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<SqlRow>, SqlError> {
        let rows = self.inner.query(sql, params)?;
        if sql.contains(" IN (") {
            let entered = self.entered.lock().unwrap().take();
            let release = self.release.lock().unwrap().take();
            if let (Some(entered), Some(release)) = (entered, release) {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, SqlError> {
        self.inner.execute(sql, params)
    }
}

#[test]
fn update_during_hydration_is_visible_to_next_read() {
    let dir = TempDir::new().unwrap();
    let registry = SchemaRegistry::default();
    let inner = SqliteMetaExecutor::open(
        SqliteStoreConfig::for_path(dir.path().join("meta.sqlite")),
        &registry,
    )
    .unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let executor = PausingExecutor {
        inner,
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    };
    let store = Arc::new(MetadataStore::new(executor, registry));
    store.add(ObjectType::Post, id(1), &key("foo"), &"old".into()).unwrap();

    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.get(ObjectType::Post, id(1), &key("foo")).unwrap())
    };
    entered_rx.recv().unwrap();
    store.update(ObjectType::Post, id(1), &key("foo"), &"new".into()).unwrap();
    release_tx.send(()).unwrap();
    assert_eq!(reader.join().unwrap(), Some(MetaValue::from("old")));

    assert_eq!(store.get(ObjectType::Post, id(1), &key("foo")).unwrap(), Some(MetaValue::from("new")));
    assert_eq!(store.cache_stats().discarded_fills, 1);
}

#[test]
fn stores_sharing_a_cache_layer_share_invalidations() {
    let dir = TempDir::new().unwrap();
    let registry = SchemaRegistry::default();
    let executor = SqliteMetaExecutor::open(
        SqliteStoreConfig::for_path(dir.path().join("meta.sqlite")),
        &registry,
    )
    .unwrap();
    let first = MetadataStore::with_cache(
        executor.clone(),
        registry.clone(),
        Arc::new(InMemoryCacheService::with_max_entries(16)),
    );
    let second = MetadataStore::with_meta_cache(executor, registry, Arc::clone(first.meta_cache()));

    second.get_all(ObjectType::User, id(1)).unwrap();
    first.add(ObjectType::User, id(1), &key("k"), &"v".into()).unwrap();

    assert_eq!(second.get(ObjectType::User, id(1), &key("k")).unwrap(), Some(MetaValue::from("v")));
    assert_eq!(first.cache_stats(), second.cache_stats());
}

// ============================================================================
// SECTION: Batch Hydration
// ============================================================================

#[test]
fn prime_cache_issues_one_query_and_matches_single_reads() {
    let fixture = fixture();
    let store = &fixture.store;
    for raw in 1 ..= 20_u64 {
        if raw % 3 != 0 {
            store.add(ObjectType::Post, id(raw), &key("a"), &MetaValue::from(i64::try_from(raw).unwrap())).unwrap();
        }
        if raw % 2 == 0 {
            store.add(ObjectType::Post, id(raw), &key("b"), &"even".into()).unwrap();
        }
    }
    let ids: Vec<ObjectId> = (1 ..= 25).map(id).collect();
    let verifier = fixture_with_same_db(store);
    store.executor().reset();

    let primed = store.prime_cache(ObjectType::Post, &ids).unwrap();

    assert_eq!(store.executor().queries(), 1);
    assert_eq!(primed.len(), ids.len());
    for object_id in &ids {
        let single = verifier.get_all(ObjectType::Post, *object_id).unwrap();
        assert_eq!(primed[object_id], single, "mismatch for {object_id}");
    }
    for object_id in &ids {
        store.get_all(ObjectType::Post, *object_id).unwrap();
    }
    assert_eq!(store.executor().queries(), 1);
}

/// Builds a second store over the same executor with its own cold cache.
fn fixture_with_same_db(
    store: &MetadataStore<CountingExecutor>,
) -> MetadataStore<SqliteMetaExecutor> {
    MetadataStore::new(store.executor().inner.clone(), store.registry().clone())
}

// ============================================================================
// SECTION: Delete All
// ============================================================================

#[test]
fn delete_all_removes_key_across_every_object_of_one_type() {
    let fixture = fixture();
    let store = &fixture.store;
    for raw in 1 ..= 4 {
        store.add(ObjectType::Post, id(raw), &key("shared"), &"x".into()).unwrap();
        store.add(ObjectType::Post, id(raw), &key("keep"), &"y".into()).unwrap();
    }
    store.add(ObjectType::User, id(1), &key("shared"), &"z".into()).unwrap();
    store.prime_cache(ObjectType::Post, &[id(1), id(2), id(3), id(4)]).unwrap();

    let removed = store.delete_all(ObjectType::Post, &key("shared")).unwrap();

    assert_eq!(removed, 4);
    for raw in 1 ..= 4 {
        assert!(!store.exists(ObjectType::Post, id(raw), &key("shared")));
        assert!(store.exists(ObjectType::Post, id(raw), &key("keep")));
    }
    assert!(store.exists(ObjectType::User, id(1), &key("shared")));
}

#[test]
fn delete_all_without_matches_is_not_found() {
    let fixture = fixture();
    let result = fixture.store.delete_all(ObjectType::Comment, &key("nothing"));
    assert!(matches!(result, Err(MetaError::NotFound(_))));
}

// ============================================================================
// SECTION: Deletion Cascade
// ============================================================================

#[test]
fn deletion_event_removes_every_key_of_the_object_only() {
    let fixture = fixture();
    let store = &fixture.store;
    for name in ["a", "b", "c"] {
        store.add(ObjectType::Comment, id(10), &key(name), &name.into()).unwrap();
        store.add(ObjectType::Comment, id(11), &key(name), &name.into()).unwrap();
    }
    store.add(ObjectType::Post, id(10), &key("a"), &"post".into()).unwrap();
    let coordinator = DeletionCoordinator::new(Arc::clone(store));

    let removed = coordinator.handle(&ObjectDeleted::new(ObjectType::Comment, id(10))).unwrap();

    assert_eq!(removed, 3);
    assert!(store.get_all(ObjectType::Comment, id(10)).unwrap().is_empty());
    assert_eq!(store.get_all(ObjectType::Comment, id(11)).unwrap().len(), 3);
    assert!(store.exists(ObjectType::Post, id(10), &key("a")));
}

#[test]
fn deletion_event_for_object_without_meta_removes_nothing() {
    let fixture = fixture();
    let coordinator = DeletionCoordinator::new(Arc::clone(&fixture.store));
    let removed = coordinator.handle(&ObjectDeleted::new(ObjectType::User, id(99))).unwrap();
    assert_eq!(removed, 0);
}

#[test]
fn coordinator_drains_channel_and_queue_sources() {
    let fixture = fixture();
    let store = &fixture.store;
    store.add(ObjectType::Post, id(1), &key("a"), &1_i64.into()).unwrap();
    store.add(ObjectType::Post, id(1), &key("b"), &2_i64.into()).unwrap();
    store.add(ObjectType::User, id(2), &key("a"), &3_i64.into()).unwrap();
    let coordinator = DeletionCoordinator::new(Arc::clone(store));
    assert_eq!(coordinator.subscriptions().len(), 3);

    let (sender, mut receiver) = mpsc::channel();
    sender.send(ObjectDeleted::parse("post", "1").unwrap()).unwrap();
    sender.send(ObjectDeleted::new(ObjectType::Comment, id(5))).unwrap();
    let summary = coordinator.drain(&mut receiver);
    assert_eq!(summary.events, 2);
    assert_eq!(summary.keys_removed, 2);
    assert_eq!(summary.failures, 0);

    let mut queue = VecDeque::from([ObjectDeleted::new(ObjectType::User, id(2))]);
    let summary = coordinator.drain(&mut queue);
    assert_eq!(summary.keys_removed, 1);
    assert!(queue.is_empty());
    assert_eq!(stored_row_count(store, ObjectType::Post), 0);
    assert_eq!(stored_row_count(store, ObjectType::User), 0);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add(u64, u8, i64),
    Update(u64, u8, i64),
    Delete(u64, u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1 ..= 3_u64, 0 .. 3_u8, any::<i64>()).prop_map(|(i, k, v)| Op::Add(i, k, v)),
        (1 ..= 3_u64, 0 .. 3_u8, any::<i64>()).prop_map(|(i, k, v)| Op::Update(i, k, v)),
        (1 ..= 3_u64, 0 .. 3_u8).prop_map(|(i, k)| Op::Delete(i, k)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn store_matches_a_single_valued_model(ops in prop::collection::vec(op_strategy(), 1 .. 24)) {
        let fixture = fixture();
        let store = &fixture.store;
        let mut model = std::collections::BTreeMap::new();
        for op in ops {
            match op {
                Op::Add(raw, k, v) => {
                    let name = format!("k{k}");
                    let result = store.add(ObjectType::Post, id(raw), &key(&name), &v.into());
                    if let std::collections::btree_map::Entry::Vacant(slot) = model.entry((raw, name)) {
                        prop_assert!(result.is_ok());
                        slot.insert(v);
                    } else {
                        let rejected = matches!(result, Err(MetaError::AlreadyExists { .. }));
                        prop_assert!(rejected);
                    }
                }
                Op::Update(raw, k, v) => {
                    let name = format!("k{k}");
                    prop_assert!(store.update(ObjectType::Post, id(raw), &key(&name), &v.into()).is_ok());
                    model.insert((raw, name), v);
                }
                Op::Delete(raw, k) => {
                    let name = format!("k{k}");
                    let result = store.delete(ObjectType::Post, id(raw), &key(&name));
                    prop_assert_eq!(result.is_ok(), model.remove(&(raw, name)).is_some());
                }
            }
        }
        for raw in 1 ..= 3_u64 {
            for k in 0 .. 3_u8 {
                let name = format!("k{k}");
                let expected = model.get(&(raw, name.clone())).map(|v| MetaValue::from(*v));
                prop_assert_eq!(store.get(ObjectType::Post, id(raw), &key(&name)).unwrap(), expected.clone());
                prop_assert_eq!(stored_value(store, ObjectType::Post, id(raw), &name), expected);
            }
        }
    }
}
