//! Opaque pagination cursor
//!
//! A cursor carries the `(created_at, id)` sort key of the last row a caller
//! has seen. On the wire it is the URL-safe base64 of `"<rfc3339>|<uuid>"`.

use crate::error::{Error, Result};
use crate::time::{format_timestamp, parse_timestamp};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const SEPARATOR: char = '|';

/// Decoded cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Creation time of the last seen row
    pub created_at: DateTime<Utc>,
    /// Identifier of the last seen row (tiebreak)
    pub id: Uuid,
}

impl Cursor {
    /// Create a cursor positioned after the given row key
    #[must_use]
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// Encode into the opaque string handed to callers
    #[must_use]
    pub fn encode(&self) -> String {
        let raw = format!("{}{SEPARATOR}{}", format_timestamp(&self.created_at), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode an opaque cursor string
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| Error::validation("cursor", format!("malformed encoding: {e}")))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| Error::validation("cursor", "not valid utf-8"))?;

        let (ts, id) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::validation("cursor", "missing separator"))?;
        let created_at = parse_timestamp(ts)
            .map_err(|e| Error::validation("cursor", format!("invalid timestamp: {e}")))?;
        let id = Uuid::parse_str(id)
            .map_err(|e| Error::validation("cursor", format!("invalid id: {e}")))?;

        Ok(Self { created_at, id })
    }

    /// `created_at` in the persisted representation, for binding
    #[must_use]
    pub fn created_at_key(&self) -> String {
        format_timestamp(&self.created_at)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_decode() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let id = Uuid::new_v4();
        let cursor = Cursor::new(ts, id);

        let encoded = cursor.encode();
        assert!(!encoded.contains('|'));
        assert_eq!(Cursor::decode(&encoded).unwrap(), cursor);
        assert_eq!(encoded.parse::<Cursor>().unwrap(), cursor);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let no_separator = URL_SAFE_NO_PAD.encode("no-separator");
        for bad in ["***", "", no_separator.as_str()] {
            let err = Cursor::decode(bad).unwrap_err();
            assert!(err.is_validation(), "{bad}: {err}");
        }
    }

    #[test]
    fn test_decode_rejects_bad_parts() {
        let bad_ts = URL_SAFE_NO_PAD.encode(format!("yesterday|{}", Uuid::new_v4()));
        assert!(Cursor::decode(&bad_ts).unwrap_err().is_validation());

        let bad_id = URL_SAFE_NO_PAD.encode("2024-01-02T03:04:05Z|not-a-uuid");
        assert!(Cursor::decode(&bad_id).unwrap_err().is_validation());
    }
}
