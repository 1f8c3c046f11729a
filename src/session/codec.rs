//! Session Record Codec
//!
//! Maps a [`SessionRecord`] onto the storage engine's representation:
//!
//! - the **value** is the JSON-serialized record
//! - the **index key** is the expiration as a sortable timestamp string,
//!   stored in the [`EXPIRE_INDEX`] secondary index
//!
//! ## Index Key Format
//!
//! Index keys are UTC ISO-8601 with millisecond precision and a `Z` suffix:
//!
//! ```text
//! 2026-10-19T08:00:00.000Z
//! ```
//!
//! Keys are clamped to `[EPOCH_FLOOR, INDEX_KEY_CEILING]`. Inside that range
//! every key has the same width, so lexicographic order equals chronological
//! order and a plain string range scan finds everything that expired inside
//! a window. An expiry before the floor is indexed at the floor and is reaped
//! by the next sweep; the stored record keeps the true timestamp. Years past
//! 9999 are indexed at the ceiling and never fall inside a sweep window.
//!
//! ## Index Query Results
//!
//! A range query reply is interpreted leniently. Each element may be a bare
//! key, a `[key, ...]` tuple, or a `{"key": ...}` object. `null` and
//! `{"not_found": ...}` markers are dropped. Anything that is not an array
//! means "nothing expired".

use crate::session::record::SessionRecord;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Name of the secondary index holding expiration timestamps.
pub const EXPIRE_INDEX: &str = "expire_bin";

/// Lower bound of every sweep window. Far enough in the past that no
/// session can have expired before it.
pub const EPOCH_FLOOR: &str = "1977-08-01T00:00:00.000Z";

/// Highest index key. Later years would format as `+10000-...`, which no
/// longer sorts.
pub const INDEX_KEY_CEILING: &str = "9999-12-31T23:59:59.999Z";

const FLOOR_MILLIS: i64 = 239_241_600_000;
const CEILING_MILLIS: i64 = 253_402_300_799_999;

/// Errors that can occur while decoding stored data.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stored value is not a valid session record
    #[error("malformed session value: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An index entry is not a valid timestamp
    #[error("invalid index key: {0:?}")]
    InvalidIndexKey(String),
}

/// The record could not be serialized.
#[derive(Debug, Error)]
#[error("failed to encode session record: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// A record in storage form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    /// The value blob to store under the session id
    pub value: Bytes,
    /// The [`EXPIRE_INDEX`] entry, if the record has an expiration
    pub index_key: Option<String>,
}

/// Encodes a record into its stored value and index key.
pub fn encode(record: &SessionRecord) -> Result<EncodedRecord, EncodeError> {
    let value = serde_json::to_vec(record)?;

    Ok(EncodedRecord {
        value: Bytes::from(value),
        index_key: record.expires_at.as_ref().map(format_index_key),
    })
}

/// Decodes a stored value back into a record.
pub fn decode(value: &[u8]) -> Result<SessionRecord, DecodeError> {
    Ok(serde_json::from_slice(value)?)
}

/// Formats a timestamp as an index key, clamped to
/// `[EPOCH_FLOOR, INDEX_KEY_CEILING]`.
pub fn format_index_key(ts: &DateTime<Utc>) -> String {
    match ts.timestamp_millis() {
        ms if ms < FLOOR_MILLIS => EPOCH_FLOOR.to_string(),
        ms if ms > CEILING_MILLIS => INDEX_KEY_CEILING.to_string(),
        _ => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Parses an index key back into a timestamp.
pub fn parse_index_key(key: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(key)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DecodeError::InvalidIndexKey(key.to_string()))
}

/// Leniently parses an expiration supplied by the session middleware.
///
/// Accepts RFC 3339 (`2026-10-19T08:00:00.000Z`), RFC 2822 / HTTP dates
/// (`Mon, 19 Oct 2026 08:00:00 GMT`) and integer Unix milliseconds.
/// Returns `None` for anything else.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// Interprets a raw index range query reply as a deduplicated list of
/// session ids, in first-seen order.
pub fn decode_index_result(raw: &Value) -> Vec<String> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(index_hit_key)
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

fn index_hit_key(item: &Value) -> Option<String> {
    let key = match item {
        Value::String(key) => Some(key.as_str()),
        Value::Array(tuple) => tuple.first().and_then(Value::as_str),
        Value::Object(fields) if fields.contains_key("not_found") => None,
        Value::Object(fields) => fields.get("key").and_then(Value::as_str),
        _ => None,
    }?;

    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, 0, 0).unwrap()
    }

    #[test]
    fn test_encode_with_expiry() {
        let record = SessionRecord::new(json!({"u": 1})).expiring_at(ts(8));
        let encoded = encode(&record).unwrap();

        assert_eq!(encoded.index_key.as_deref(), Some("2026-10-19T08:00:00.000Z"));
        assert_eq!(decode(&encoded.value).unwrap(), record);
    }

    #[test]
    fn test_encode_without_expiry() {
        let record = SessionRecord::new(json!({"u": 1}));
        let encoded = encode(&record).unwrap();

        assert_eq!(encoded.index_key, None);
        assert_eq!(decode(&encoded.value).unwrap(), record);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let record = SessionRecord::new(json!({"a": 1, "b": [true, null]})).expiring_at(ts(9));
        assert_eq!(encode(&record).unwrap(), encode(&record).unwrap());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(br#"{"expires_at": 5}"#), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_index_keys_sort_chronologically() {
        let early = format_index_key(&ts(1));
        let late = format_index_key(&ts(23));
        assert!(early < late);
        assert!(EPOCH_FLOOR < early.as_str());

        let subsecond = Utc.timestamp_millis_opt(1_760_860_800_123).unwrap();
        assert_eq!(format_index_key(&subsecond), "2025-10-19T08:00:00.123Z");
    }

    #[test]
    fn test_index_key_clamped_to_floor() {
        let zero = Utc.timestamp_millis_opt(0).unwrap();
        assert_eq!(format_index_key(&zero), EPOCH_FLOOR);

        let year_one = parse_expiry("0001-01-01T00:00:00Z").unwrap();
        assert_eq!(format_index_key(&year_one), EPOCH_FLOOR);

        let floor = parse_index_key(EPOCH_FLOOR).unwrap();
        assert_eq!(floor.timestamp_millis(), FLOOR_MILLIS);
        assert_eq!(format_index_key(&floor), EPOCH_FLOOR);

        // The stored value keeps the real expiry
        let record = SessionRecord::new(json!({})).expiring_at(zero);
        let encoded = encode(&record).unwrap();
        assert_eq!(encoded.index_key.as_deref(), Some(EPOCH_FLOOR));
        assert_eq!(decode(&encoded.value).unwrap().expires_at, Some(zero));
    }

    #[test]
    fn test_index_key_clamped_to_ceiling() {
        let ceiling = parse_index_key(INDEX_KEY_CEILING).unwrap();
        assert_eq!(ceiling.timestamp_millis(), CEILING_MILLIS);
        assert_eq!(format_index_key(&ceiling), INDEX_KEY_CEILING);

        let far = Utc.with_ymd_and_hms(12026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_index_key(&far), INDEX_KEY_CEILING);
        assert!(format_index_key(&ts(8)).as_str() < INDEX_KEY_CEILING);
    }

    #[test]
    fn test_parse_index_key() {
        assert_eq!(parse_index_key("2026-10-19T08:00:00.000Z").unwrap(), ts(8));
        assert!(matches!(
            parse_index_key("yesterday"),
            Err(DecodeError::InvalidIndexKey(_))
        ));
    }

    #[test]
    fn test_parse_expiry_formats() {
        assert_eq!(parse_expiry("2026-10-19T08:00:00.000Z"), Some(ts(8)));
        assert_eq!(parse_expiry("2026-10-19T10:00:00+02:00"), Some(ts(8)));
        assert_eq!(parse_expiry("Mon, 19 Oct 2026 08:00:00 GMT"), Some(ts(8)));
        assert_eq!(parse_expiry("1792396800000"), Some(ts(8)));
        assert_eq!(parse_expiry("Invalid Date"), None);
        assert_eq!(parse_expiry(""), None);
    }

    #[test]
    fn test_decode_index_result_dedups_and_filters() {
        let raw = json!([
            "s1",
            ["s2"],
            {"not_found": {"bucket": "_sessions", "key": "gone"}},
            null,
            "s1",
            {"key": "s3"},
            ["s2", "_sessions"],
            "",
            42
        ]);

        assert_eq!(decode_index_result(&raw), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_decode_index_result_non_list() {
        assert!(decode_index_result(&json!([])).is_empty());
        assert!(decode_index_result(&Value::Null).is_empty());
        assert!(decode_index_result(&json!({"keys": ["s1"]})).is_empty());
        assert!(decode_index_result(&json!("s1")).is_empty());
    }
}
