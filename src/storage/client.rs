//! Storage Client Boundary
//!
//! The session backend never talks to a storage engine directly. Everything
//! goes through [`StorageClient`], the minimal capability set we need from a
//! key-value store with secondary indexes:
//!
//! - `get` / `put` / `delete` on a `(bucket, key)` pair
//! - a range scan over one secondary index
//!
//! ## Index Results
//!
//! `index_range_query` returns the engine's raw reply as JSON. Engines that
//! answer through a map/reduce pipeline can hand back duplicates, `[key]`
//! tuples or not-found markers; interpreting that reply is the codec's job,
//! not the client's.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned by a storage engine client.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object does not exist
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The engine could not be reached or refused the request
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The engine accepted the request but failed to execute it
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An in-process engine lock was poisoned by a panicking writer
    #[error("storage lock poisoned")]
    Poisoned,
}

impl StorageError {
    /// Builds a not-found error for the given location.
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Returns `true` if this error only signals absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Result type for storage client operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// An object as returned by [`StorageClient::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// The raw stored value
    pub value: Bytes,
    /// Secondary index entries attached to the object (index name -> value)
    pub indexes: BTreeMap<String, String>,
}

impl StoredObject {
    /// Returns the value of the named index entry, if the object carries one.
    pub fn index(&self, name: &str) -> Option<&str> {
        self.indexes.get(name).map(String::as_str)
    }
}

/// Options for [`StorageClient::put`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Secondary index entries to attach; they replace any previous entries
    pub indexes: BTreeMap<String, String>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a secondary index entry.
    pub fn with_index(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.indexes.insert(name.into(), value.into());
        self
    }
}

/// The operations the session backend consumes from a storage engine.
///
/// Implementations own their own timeouts and connection pooling; callers
/// impose none.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetches an object. A missing object is reported as
    /// [`StorageError::NotFound`].
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<StoredObject>;

    /// Writes an object, replacing its value and index entries.
    async fn put(&self, bucket: &str, key: &str, value: Bytes, options: PutOptions)
        -> StorageResult<()>;

    /// Deletes an object and its index entries. Deleting a missing key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Returns the raw reply of a range scan over `index`, inclusive on both
    /// bounds.
    async fn index_range_query(
        &self,
        bucket: &str,
        index: &str,
        start: &str,
        end: &str,
    ) -> StorageResult<serde_json::Value>;
}
