//! Session Module
//!
//! Everything the session middleware talks to, plus the codec that decides
//! what a session looks like inside the storage engine.
//!
//! ## Modules
//!
//! - `record`: the [`SessionRecord`] type
//! - `codec`: value and index-key encoding, index result decoding
//! - `repository`: [`SessionRepository`] and the [`SessionStore`] trait

pub mod codec;
pub mod record;
pub mod repository;

// Re-export commonly used types for convenience
pub use codec::{DecodeError, EncodeError, EPOCH_FLOOR, EXPIRE_INDEX, INDEX_KEY_CEILING};
pub use record::SessionRecord;
pub use repository::{SessionError, SessionRepository, SessionResult, SessionStore};
