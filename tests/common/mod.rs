//! Shared storage clients for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use kvsession::session::{SessionRecord, SessionRepository};
use kvsession::storage::{
    MemoryStore, PutOptions, StorageClient, StorageError, StorageResult, StoredObject,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const BUCKET: &str = "_sessions";

/// Wraps a [`MemoryStore`] with switchable failures and a hook that rewrites
/// a session right after an index query has been answered.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    fail_queries: AtomicBool,
    fail_deletes: Mutex<HashSet<String>>,
    refresh_after_query: Mutex<Option<(String, SessionRecord)>>,
    extra_hits: Mutex<Vec<serde_json::Value>>,
    pub delete_calls: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryStore::new()),
            fail_queries: AtomicBool::new(false),
            fail_deletes: Mutex::new(HashSet::new()),
            refresh_after_query: Mutex::new(None),
            extra_hits: Mutex::new(Vec::new()),
            delete_calls: AtomicU64::new(0),
        })
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.fail_deletes.lock().unwrap().insert(id.to_string());
    }

    pub fn heal_deletes(&self) {
        self.fail_deletes.lock().unwrap().clear();
    }

    /// After the next index query is answered, write `record` under `id`
    /// before the reply reaches the caller.
    pub fn refresh_after_next_query(&self, id: &str, record: SessionRecord) {
        *self.refresh_after_query.lock().unwrap() = Some((id.to_string(), record));
    }

    /// Appends raw elements to every index query reply.
    pub fn append_to_replies(&self, hits: Vec<serde_json::Value>) {
        self.extra_hits.lock().unwrap().extend(hits);
    }
}

#[async_trait]
impl StorageClient for FlakyStore {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        self.inner.get(bucket, key).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Bytes,
        options: PutOptions,
    ) -> StorageResult<()> {
        self.inner.put(bucket, key, value, options).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::Backend(format!("delete of {key} timed out")));
        }
        self.inner.delete(bucket, key).await
    }

    async fn index_range_query(
        &self,
        bucket: &str,
        index: &str,
        start: &str,
        end: &str,
    ) -> StorageResult<serde_json::Value> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("coordinator unreachable".into()));
        }

        let mut reply = self.inner.index_range_query(bucket, index, start, end).await?;
        if let Some(items) = reply.as_array_mut() {
            items.extend(self.extra_hits.lock().unwrap().iter().cloned());
        }

        let refresh = self.refresh_after_query.lock().unwrap().take();
        if let Some((id, record)) = refresh {
            SessionRepository::new(self.inner.clone(), bucket)
                .set(&id, &record)
                .await
                .expect("refresh write");
        }

        Ok(reply)
    }
}
