//! Offset tokens.
//!
//! Offsets are opaque to clients: ASCII tokens issued by the server and
//! echoed back to resume reading. For a given stream they sort strictly
//! increasing in byte-lexicographic order, so clients compare them without
//! interpreting their structure.

use std::cmp::Ordering;

/// Sentinel meaning "start of stream".
pub const BEGINNING: &str = "-1";

/// Format an offset from a generation number and a byte position.
/// 16-digit zero padding keeps byte-lexicographic order aligned with
/// numeric order.
pub fn format_offset(generation: u64, byte_position: u64) -> String {
    format!("{:016}_{:016}", generation, byte_position)
}

/// Parse an offset string into (generation, byte_position).
/// Returns None if the token is not in the server's own format.
pub fn parse_offset(offset: &str) -> Option<(u64, u64)> {
    let (generation, byte_position) = offset.split_once('_')?;
    if generation.len() != 16 || byte_position.len() != 16 {
        return None;
    }
    Some((generation.parse().ok()?, byte_position.parse().ok()?))
}

/// Validate an offset token received from a client.
///
/// `-1` is always accepted. Anything else must be non-empty ASCII free of
/// the bytes that would corrupt URLs, header values, or path handling:
/// space, comma, slash, CR, LF, NUL, and the `..` sequence.
pub fn is_valid_offset(offset: &str) -> bool {
    if offset == BEGINNING {
        return true;
    }
    if offset.is_empty() || !offset.is_ascii() || offset.contains("..") {
        return false;
    }
    !offset
        .bytes()
        .any(|b| matches!(b, b' ' | b',' | b'/' | b'\r' | b'\n' | 0))
}

/// Compare two offset tokens in byte-lexicographic order.
/// The `-1` sentinel sorts before every issued offset because `-` precedes
/// the digits in ASCII.
pub fn compare_offsets(a: &str, b: &str) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}
