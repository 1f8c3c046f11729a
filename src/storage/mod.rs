//! Storage Module
//!
//! This module defines the boundary between the session backend and the
//! key-value engine that actually holds session records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │  SessionRepository   │      │        Reaper        │
//! └──────────┬───────────┘      └──────────┬───────────┘
//!            │                             │
//!            └──────────────┬──────────────┘
//!                           ▼
//!              ┌──────────────────────────┐
//!              │  dyn StorageClient       │
//!              │  get / put / delete      │
//!              │  index_range_query       │
//!              └────────────┬─────────────┘
//!                           │
//!              ┌────────────┴─────────────┐
//!              │ MemoryStore | real client│
//!              └──────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use kvsession::storage::{MemoryStore, PutOptions, StorageClient};
//! use bytes::Bytes;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.put("_sessions", "abc", Bytes::from("{}"), PutOptions::new()).await.unwrap();
//!
//! let object = store.get("_sessions", "abc").await.unwrap();
//! assert_eq!(object.value, Bytes::from("{}"));
//! # });
//! ```

pub mod client;
pub mod engine;

// Re-export commonly used types
pub use client::{PutOptions, StorageClient, StorageError, StorageResult, StoredObject};
pub use engine::{MemoryStore, StoreStats};
