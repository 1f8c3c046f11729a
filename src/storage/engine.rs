//! In-Memory Storage Engine with Secondary Indexes
//!
//! `MemoryStore` implements [`StorageClient`] entirely in process. It stands in
//! for a real key-value cluster in tests, benchmarks and the soak runner.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Objects live in multiple shards to reduce contention.
//! 2. **Ordered Index**: Secondary index entries live in one `BTreeSet`, so a
//!    range scan is a plain ordered walk.
//! 3. **Index Follows Object**: `put` replaces an object's index entries and
//!    `delete` removes them, under the object's shard lock.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MemoryStore                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │  ┌─────────────────────────────────────────────┐           │
//! │  │ RwLock<BTreeSet<(bucket, index, value, key)>>│           │
//! │  └─────────────────────────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lock order is always shard, then index.
//!
//! Trait methods report a poisoned lock as [`StorageError::Poisoned`]. The
//! inspection helpers ([`MemoryStore::contains`], [`MemoryStore::stats`])
//! read through it instead, since every write leaves the maps consistent
//! before anything that can panic.

use crate::storage::client::{PutOptions, StorageClient, StorageError, StorageResult, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, trace};

/// Default number of shards.
const DEFAULT_SHARDS: usize = 16;

/// Objects are addressed by `(bucket, key)`.
type ObjectKey = (String, String);

/// One secondary index entry: `(bucket, index, value, key)`.
type IndexEntry = (String, String, String, String);

/// A single shard containing a portion of the objects.
#[derive(Debug, Default)]
struct Shard {
    objects: RwLock<HashMap<ObjectKey, StoredObject>>,
}

/// Operation counters for a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub objects: u64,
    pub index_entries: u64,
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub queries: u64,
}

/// A thread-safe, in-memory key-value store with secondary indexes.
///
/// # Example
///
/// ```
/// use kvsession::storage::{MemoryStore, PutOptions, StorageClient};
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// store
///     .put(
///         "_sessions",
///         "abc",
///         Bytes::from("{}"),
///         PutOptions::new().with_index("expire_bin", "2020-01-01T00:00:00.000Z"),
///     )
///     .await
///     .unwrap();
///
/// let hits = store
///     .index_range_query("_sessions", "expire_bin", "1977-08-01T00:00:00.000Z", "2021-01-01T00:00:00.000Z")
///     .await
///     .unwrap();
/// assert_eq!(hits, serde_json::json!(["abc"]));
/// # });
/// ```
pub struct MemoryStore {
    shards: Vec<Shard>,
    index: RwLock<BTreeSet<IndexEntry>>,
    object_count: AtomicU64,
    get_count: AtomicU64,
    put_count: AtomicU64,
    del_count: AtomicU64,
    query_count: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("shards", &self.shards.len())
            .field("objects", &self.object_count.load(Ordering::Relaxed))
            .field("puts", &self.put_count.load(Ordering::Relaxed))
            .field("deletes", &self.del_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a store with `shards` shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Shard::default()).collect();

        Self {
            shards,
            index: RwLock::new(BTreeSet::new()),
            object_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            put_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            query_count: AtomicU64::new(0),
        }
    }

    /// Builds a store from pass-through client options.
    ///
    /// Only `shards` is recognised; everything else belongs to real engine
    /// clients and is ignored here.
    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        let shards = options
            .get("shards")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_SHARDS);

        for key in options.keys().filter(|k| k.as_str() != "shards") {
            debug!(option = %key, "Ignoring client option not used by the in-memory store");
        }

        Self::with_shards(shards)
    }

    #[inline]
    fn shard(&self, bucket: &str, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        bucket.hash(&mut hasher);
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Number of stored objects across all buckets.
    pub fn len(&self) -> u64 {
        self.object_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the object exists.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.shard(bucket, key)
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Returns current counters.
    pub fn stats(&self) -> StoreStats {
        let index_entries = self.index.read().unwrap_or_else(PoisonError::into_inner).len() as u64;

        StoreStats {
            objects: self.object_count.load(Ordering::Relaxed),
            index_entries,
            gets: self.get_count.load(Ordering::Relaxed),
            puts: self.put_count.load(Ordering::Relaxed),
            deletes: self.del_count.load(Ordering::Relaxed),
            queries: self.query_count.load(Ordering::Relaxed),
        }
    }

    fn unindex(index: &mut BTreeSet<IndexEntry>, bucket: &str, key: &str, object: &StoredObject) {
        for (name, value) in &object.indexes {
            index.remove(&(
                bucket.to_string(),
                name.clone(),
                value.clone(),
                key.to_string(),
            ));
        }
    }
}

#[async_trait]
impl StorageClient for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let objects = self
            .shard(bucket, key)
            .objects
            .read()
            .map_err(|_| StorageError::Poisoned)?;

        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Bytes,
        options: PutOptions,
    ) -> StorageResult<()> {
        self.put_count.fetch_add(1, Ordering::Relaxed);

        let mut objects = self
            .shard(bucket, key)
            .objects
            .write()
            .map_err(|_| StorageError::Poisoned)?;
        let mut index = self.index.write().map_err(|_| StorageError::Poisoned)?;

        let location = (bucket.to_string(), key.to_string());
        match objects.get(&location) {
            Some(previous) => Self::unindex(&mut index, bucket, key, previous),
            None => {
                self.object_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        for (name, value) in &options.indexes {
            index.insert((
                bucket.to_string(),
                name.clone(),
                value.clone(),
                key.to_string(),
            ));
        }
        objects.insert(
            location,
            StoredObject {
                value,
                indexes: options.indexes,
            },
        );

        trace!(bucket, key, "Stored object");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut objects = self
            .shard(bucket, key)
            .objects
            .write()
            .map_err(|_| StorageError::Poisoned)?;

        if let Some(previous) = objects.remove(&(bucket.to_string(), key.to_string())) {
            let mut index = self.index.write().map_err(|_| StorageError::Poisoned)?;
            Self::unindex(&mut index, bucket, key, &previous);
            self.object_count.fetch_sub(1, Ordering::Relaxed);
            trace!(bucket, key, "Deleted object");
        }

        Ok(())
    }

    async fn index_range_query(
        &self,
        bucket: &str,
        index: &str,
        start: &str,
        end: &str,
    ) -> StorageResult<serde_json::Value> {
        self.query_count.fetch_add(1, Ordering::Relaxed);

        if start > end {
            return Ok(serde_json::Value::Array(Vec::new()));
        }

        let entries = self.index.read().map_err(|_| StorageError::Poisoned)?;
        let from = (
            bucket.to_string(),
            index.to_string(),
            start.to_string(),
            String::new(),
        );

        let keys = entries
            .range(from..)
            .take_while(|(b, i, value, _)| b == bucket && i == index && value.as_str() <= end)
            .map(|(_, _, _, key)| serde_json::Value::String(key.clone()))
            .collect();

        Ok(serde_json::Value::Array(keys))
    }
}
