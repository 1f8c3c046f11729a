//! # kvsession - Expiration-Aware Session Persistence
//!
//! kvsession stores web-session records in an external key-value store that
//! supports secondary-index range queries, and reaps them once they expire.
//!
//! ## Features
//!
//! - **Session Store**: `get` / `set` / `destroy` with no cache in between
//! - **Indexed Expiry**: every session carries a sortable `expire_bin` index entry
//! - **Background Reaper**: one range query per tick finds everything expired
//! - **Election Guard**: only one process in a worker pool runs the reaper
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              kvsession                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌───────────────────┐    ┌──────────────────────┐   │
//! │  │  Session    │───>│ SessionRepository │───>│  dyn StorageClient   │   │
//! │  │ middleware  │    │  (get/set/destroy)│    │  get / put / delete  │   │
//! │  └─────────────┘    └─────────┬─────────┘    │  index_range_query   │   │
//! │                               │              └──────────▲───────────┘   │
//! │                               ▼                         │               │
//! │                     ┌───────────────────┐               │               │
//! │                     │   Record Codec    │<──────┐       │               │
//! │                     └───────────────────┘       │       │               │
//! │                                                 │       │               │
//! │  ┌─────────────┐    ┌───────────────────────────┴───────┴───────────┐   │
//! │  │ Election    │───>│                  Reaper                       │   │
//! │  │ Guard       │    │            (Background Tokio Task)            │   │
//! │  └─────────────┘    └───────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kvsession::{SessionBackend, SessionRecord, StoreConfig};
//! use kvsession::reaper::EnvRole;
//! use kvsession::storage::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = StoreConfig::new().with_reap_interval(Duration::from_secs(60));
//!
//!     // Worker 0 of the pool reaps, everyone else only serves requests
//!     let guard = Arc::new(EnvRole::new("WORKER_ID", "0"));
//!     let backend = SessionBackend::start(Arc::new(MemoryStore::new()), &config, guard);
//!
//!     let sessions = backend.repository();
//!     sessions.set("sid", &SessionRecord::new(serde_json::json!({"user": 1}))).await.unwrap();
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the storage engine boundary and an in-memory engine
//! - [`session`]: session records, the codec and the repository
//! - [`reaper`]: the background reaper and election guards
//! - [`config`]: store configuration
//! - [`backend`]: wiring it all together
//!
//! ## Design Highlights
//!
//! ### Sortable Expiry Index
//!
//! Expirations are indexed as fixed-width UTC timestamps, so "everything
//! expired" is one range scan from a far-past floor up to now.
//!
//! ### Best-Effort Sweeps
//!
//! Reaper failures are logged and retried on the next tick; they never reach
//! the request path. Each expired id is re-confirmed before deletion, so a
//! session refreshed mid-sweep survives.

pub mod backend;
pub mod config;
pub mod reaper;
pub mod session;
pub mod storage;

// Re-export commonly used types for convenience
pub use backend::SessionBackend;
pub use config::{ExpirationPolicy, StoreConfig};
pub use reaper::{ElectionGuard, Reaper, ReaperHandle};
pub use session::{SessionError, SessionRecord, SessionRepository, SessionStore};
pub use storage::{MemoryStore, StorageClient, StorageError};

/// Version of kvsession
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
