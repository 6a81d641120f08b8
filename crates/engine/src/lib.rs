//! Stream engine backing the LogMQ HTTP surface.
//!
//! One logical stream per path, with appends linearized through a
//! per-stream gate, idempotent-producer fencing decided inside that gate,
//! reader wake-up over a broadcast channel, and TTL sweeping in the
//! background. Persistence sits behind the [`storage::Storage`] trait; the
//! in-memory [`memory::MemoryStorage`] is the default adapter.

pub mod error;
pub mod memory;
pub mod producer;
pub mod storage;
pub mod store;
pub mod types;

pub use error::EngineError;
pub use memory::MemoryStorage;
pub use storage::{AppendGuards, CreateOutcome, Storage};
pub use store::{EngineConfig, StreamEngine, StreamEvent, WaitOutcome};
pub use types::{
    AppendOutcome, AppendRequest, ProducerClaims, ReadResult, Record, StreamConfig,
    StreamLifecycleEvent, StreamMeta,
};
