//! Content-type canonicalization.

/// Default content type when a stream is created without one.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Canonical form of the JSON media type.
pub const JSON: &str = "application/json";

/// Media type of SSE responses.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Canonicalize a content type: the media-type portion before any `;`
/// parameter, trimmed and lowercased. `APPLICATION/JSON; charset=utf-8`
/// and `application/json` canonicalize identically.
pub fn canonicalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Whether a content type selects JSON mode for append and read bodies.
pub fn is_json(content_type: &str) -> bool {
    canonicalize(content_type) == JSON
}
