//! Session Repository
//!
//! `get` / `set` / `destroy` against the storage engine, one record per call.
//! There is no cache and no retry here: every call goes straight to the
//! [`StorageClient`] and every failure other than "not found" goes straight
//! back to the caller.
//!
//! ## Expiration Indexing
//!
//! `set` attaches an [`EXPIRE_INDEX`] entry so the reaper can find the record
//! later. A record without an expiration is still written; whether it gets an
//! index entry depends on the configured [`ExpirationPolicy`]:
//!
//! - `None`: no entry, the record is never reaped by timestamp
//! - `FixedTtl(d)`: the entry is placed at `now + d`

use crate::config::{ExpirationPolicy, StoreConfig};
use crate::session::codec::{self, DecodeError, EncodeError, EXPIRE_INDEX};
use crate::session::record::SessionRecord;
use crate::storage::{PutOptions, StorageClient, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors surfaced by session repository operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The storage engine failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A stored value could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A record could not be encoded
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// The capability set a session middleware consumes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetches a session. Returns `Ok(None)` if it does not exist.
    async fn get(&self, id: &str) -> SessionResult<Option<SessionRecord>>;

    /// Creates or replaces a session.
    async fn set(&self, id: &str, record: &SessionRecord) -> SessionResult<()>;

    /// Deletes a session. Deleting a missing session succeeds.
    async fn destroy(&self, id: &str) -> SessionResult<()>;
}

/// Session persistence over a [`StorageClient`].
///
/// # Example
///
/// ```
/// use kvsession::session::{SessionRecord, SessionRepository};
/// use kvsession::storage::MemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let repo = SessionRepository::new(Arc::new(MemoryStore::new()), "_sessions");
///
/// repo.set("abc", &SessionRecord::new(json!({"user": 7}))).await.unwrap();
/// let record = repo.get("abc").await.unwrap().unwrap();
/// assert_eq!(record.payload, json!({"user": 7}));
///
/// repo.destroy("abc").await.unwrap();
/// assert!(repo.get("abc").await.unwrap().is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct SessionRepository {
    client: Arc<dyn StorageClient>,
    bucket: String,
    default_expiration: ExpirationPolicy,
}

impl std::fmt::Debug for SessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRepository")
            .field("bucket", &self.bucket)
            .field("default_expiration", &self.default_expiration)
            .finish()
    }
}

impl SessionRepository {
    /// Creates a repository writing to `bucket`, with no default expiration.
    pub fn new(client: Arc<dyn StorageClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            default_expiration: ExpirationPolicy::None,
        }
    }

    /// Creates a repository from a store configuration.
    pub fn from_config(client: Arc<dyn StorageClient>, config: &StoreConfig) -> Self {
        Self::new(client, config.bucket.clone()).with_default_expiration(config.default_expiration)
    }

    /// Sets the policy applied to records written without an expiration.
    pub fn with_default_expiration(mut self, policy: ExpirationPolicy) -> Self {
        self.default_expiration = policy;
        self
    }

    /// The bucket sessions are stored in.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The storage client shared with the reaper.
    pub fn client(&self) -> Arc<dyn StorageClient> {
        Arc::clone(&self.client)
    }

    pub async fn get(&self, id: &str) -> SessionResult<Option<SessionRecord>> {
        let object = match self.client.get(&self.bucket, id).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                trace!(session = id, "Session not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(codec::decode(&object.value)?))
    }

    pub async fn set(&self, id: &str, record: &SessionRecord) -> SessionResult<()> {
        let encoded = codec::encode(record)?;

        let index_key = encoded.index_key.or_else(|| {
            let fallback = self
                .default_expiration
                .expiry_from(Utc::now())
                .map(|ts| codec::format_index_key(&ts));
            if fallback.is_none() {
                debug!(session = id, "Storing session without expiration index entry");
            }
            fallback
        });

        let options = match index_key {
            Some(key) => PutOptions::new().with_index(EXPIRE_INDEX, key),
            None => PutOptions::new(),
        };

        self.client
            .put(&self.bucket, id, encoded.value, options)
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, id: &str) -> SessionResult<()> {
        self.client.delete(&self.bucket, id).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn get(&self, id: &str) -> SessionResult<Option<SessionRecord>> {
        SessionRepository::get(self, id).await
    }

    async fn set(&self, id: &str, record: &SessionRecord) -> SessionResult<()> {
        SessionRepository::set(self, id, record).await
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        SessionRepository::destroy(self, id).await
    }
}
