//! Core types shared between the engine and its storage adapters.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One immutable append unit. Records are never rewritten or renumbered.
#[derive(Debug, Clone)]
pub struct Record {
    /// Position token: a reader that has not yet seen this record resumes
    /// here.
    pub start: String,
    /// Resume token for the record after this one.
    pub end: String,
    /// Raw record bytes.
    pub data: Vec<u8>,
}

/// Configuration fixed at stream creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfig {
    /// Canonicalized content type.
    pub content_type: String,
    /// Relative TTL in seconds, mutually exclusive with `expires_at`.
    pub ttl_seconds: Option<u64>,
    /// Absolute expiry, mutually exclusive with `ttl_seconds`.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Stream metadata as sampled at a single instant.
#[derive(Debug, Clone)]
pub struct StreamMeta {
    /// Identity of this incarnation of the path. A deleted and recreated
    /// stream gets a fresh id, which keeps ETag series disjoint.
    pub stream_id: Uuid,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Monotonic: once true, never false again.
    pub closed: bool,
    /// Current tail offset.
    pub tail: String,
}

impl StreamMeta {
    /// Seconds left before TTL expiry, when a relative TTL is set.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<u64> {
        let ttl = self.ttl_seconds?;
        let elapsed = now.signed_duration_since(self.created_at).num_seconds();
        Some(ttl.saturating_sub(elapsed.max(0) as u64))
    }
}

/// Stream lifecycle event for host hooks.
#[derive(Debug, Clone)]
pub enum StreamLifecycleEvent {
    Created {
        path: String,
        content_type: String,
        at: DateTime<Utc>,
    },
    Deleted {
        path: String,
        at: DateTime<Utc>,
    },
    /// Removed by the TTL sweep rather than an explicit DELETE.
    Expired {
        path: String,
        at: DateTime<Utc>,
    },
}

/// Result of reading from a stream.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Records strictly after the requested offset, up to the chunk ceiling.
    pub records: Vec<Record>,
    /// Offset to use for the next read.
    pub next_offset: String,
    /// True iff `next_offset` equals the tail at the moment of sampling.
    pub up_to_date: bool,
    /// Whether the stream was closed at the moment of sampling.
    pub closed: bool,
}

/// Idempotent-producer claims attached to an append.
#[derive(Debug, Clone)]
pub struct ProducerClaims {
    pub id: String,
    pub epoch: u64,
    pub seq: u64,
}

/// A single append operation as handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct AppendRequest {
    /// Records to commit atomically. Empty is only meaningful together with
    /// `close`.
    pub records: Vec<Vec<u8>>,
    /// Canonicalized content type of the request, checked against the
    /// stream's.
    pub content_type: Option<String>,
    /// Writer coordination token; must advance lexicographically.
    pub seq: Option<String>,
    pub producer: Option<ProducerClaims>,
    /// Mark the stream closed after committing the records.
    pub close: bool,
}

/// Outcome of an append.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    Committed {
        /// Tail offset after the commit.
        tail: String,
    },
    /// Producer retry answered from the dedup ring; nothing was appended.
    Duplicate { offset: String, close: bool },
}
