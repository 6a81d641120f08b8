//! Abstract persistence contract.
//!
//! The engine drives a `Storage` value and owns everything else: waiters,
//! producer state, per-stream append serialization. Hosts plug in their own
//! adapter; [`crate::memory::MemoryStorage`] is the in-process default.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::types::{ReadResult, StreamConfig, StreamMeta};

/// Outcome of a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created {
        /// Tail after any initial records were committed.
        tail: String,
    },
    /// Identical configuration already present; nothing changed, the
    /// initial body was not appended again.
    Existed { tail: String },
}

impl CreateOutcome {
    pub fn tail(&self) -> &str {
        match self {
            CreateOutcome::Created { tail } | CreateOutcome::Existed { tail } => tail,
        }
    }
}

/// Checks evaluated atomically with the append itself.
#[derive(Debug, Clone, Default)]
pub struct AppendGuards<'a> {
    /// Canonicalized content type of the request; must equal the stream's.
    pub content_type: Option<&'a str>,
    /// Writer seq token; must be strictly lex-greater than the stored one.
    pub seq: Option<&'a str>,
    /// Mark the stream closed after the records commit.
    pub close: bool,
}

/// Persistence contract.
///
/// Implementations must linearize appends per stream and hand out offsets
/// that are strictly increasing in byte-lexicographic order. A failed
/// append leaves no partial record observable. Expired streams behave as
/// absent from `head`, `append`, and `read`; `sweep` reclaims them.
pub trait Storage: Send + Sync + 'static {
    /// Create a stream, committing `initial` records atomically with it.
    /// Returns `Existed` when the path already holds an identical config,
    /// and `EngineError::ConfigMismatch` when it holds a different one.
    fn create_stream(
        &self,
        path: &str,
        config: StreamConfig,
        initial: Vec<Vec<u8>>,
    ) -> Result<CreateOutcome, EngineError>;

    /// Remove a stream. Returns the final metadata when it existed.
    fn delete_stream(&self, path: &str) -> Option<StreamMeta>;

    /// Metadata snapshot, or None when absent or expired.
    fn head(&self, path: &str) -> Option<StreamMeta>;

    /// Append records (possibly none, for a bare close) under the guards.
    /// Returns the new tail offset.
    fn append(
        &self,
        path: &str,
        records: Vec<Vec<u8>>,
        guards: AppendGuards<'_>,
    ) -> Result<String, EngineError>;

    /// Records strictly after `from`, bounded by `max_bytes` so pagination
    /// terminates. `from` is `-1` or an offset token previously issued.
    fn read(&self, path: &str, from: &str, max_bytes: usize) -> Result<ReadResult, EngineError>;

    /// Drop streams expired as of `now`, returning what was removed.
    fn sweep(&self, now: DateTime<Utc>) -> Vec<(String, StreamMeta)>;
}
