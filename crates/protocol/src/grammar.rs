//! Header value grammars.
//!
//! The protocol pins exact grammars for numeric header values so that
//! caches and proxies can never observe two spellings of the same value.

use chrono::{DateTime, Utc};

/// Parse a canonical non-negative decimal integer: ASCII digits only, no
/// sign, no exponent, no fraction, and no leading zeros other than a bare
/// `0`. Used for `Stream-TTL`, `Producer-Epoch`, and `Producer-Seq`.
pub fn parse_canonical_u64(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if value.len() > 1 && value.starts_with('0') {
        return None;
    }
    value.parse().ok()
}

/// Parse an RFC3339 timestamp with `Z` or an explicit numeric offset,
/// normalized to UTC. Used for `Stream-Expires-At`.
pub fn parse_rfc3339_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Validate an opaque token (`Producer-Id`, writer `Stream-Seq`): non-empty
/// ASCII without the bytes forbidden in offsets.
pub fn is_valid_token(value: &str) -> bool {
    if value.is_empty() || !value.is_ascii() || value.contains("..") {
        return false;
    }
    !value
        .bytes()
        .any(|b| matches!(b, b' ' | b',' | b'/' | b'\r' | b'\n' | 0))
}
