//! ETag generation and `If-None-Match` handling.
//!
//! The ETag is a digest of the stream identity and the offset a response
//! ends at: two reads ending at the same offset carry the same ETag, and
//! the per-incarnation stream id keeps ETag series disjoint across a
//! DELETE and re-create of the same path.

use axum::http::HeaderMap;
use axum::http::header;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate the ETag for a response ending at `end_offset`.
pub fn generate_etag(path: &str, stream_id: &Uuid, end_offset: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    hasher.update(stream_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(end_offset.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("\"{}\"", &digest[..32])
}

/// Whether a request's `If-None-Match` matches the given ETag.
pub fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    value
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}
