//! Error types for engine and storage operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stream not found: {0}")]
    NotFound(String),

    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    #[error("stream already exists with different configuration")]
    ConfigMismatch,

    #[error("content-type mismatch: stream is {expected}, append is {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    #[error("sequence {got} does not advance past {last}")]
    SequenceConflict { last: String, got: String },

    #[error("stream is closed")]
    Closed,

    #[error("producer epoch {declared} fenced by epoch {current}")]
    Fenced { declared: u64, current: u64 },

    #[error("producer sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },

    #[error("append queue full")]
    Backpressure,

    #[error("storage failure: {0}")]
    Storage(String),
}
