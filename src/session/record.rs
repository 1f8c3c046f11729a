//! Session Record Type
//!
//! A [`SessionRecord`] is what the session middleware hands us: an opaque
//! payload plus the moment after which it may be reaped. The session id is
//! not part of the record; it is the storage key.

use crate::session::codec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The stored unit of session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Application session state, opaque to the backend
    pub payload: serde_json::Value,

    /// When this record becomes reapable (None = no expiration supplied)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Creates a record without an expiration.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            expires_at: None,
        }
    }

    /// Sets the expiration.
    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the expiration from a middleware-supplied string, such as a
    /// cookie's `expires` attribute.
    ///
    /// Absent or unparsable input leaves the record without an expiration.
    pub fn with_raw_expiry(mut self, raw: Option<&str>) -> Self {
        self.expires_at = raw.and_then(codec::parse_expiry);
        self
    }

    /// Returns `true` if the record has an expiration at or before `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}
