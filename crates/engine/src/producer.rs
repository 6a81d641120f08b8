//! Idempotent-producer bookkeeping.
//!
//! Per `(stream, producer-id)` the server tracks the current epoch, the
//! last committed sequence, and a bounded ring of recent `(seq, offset)`
//! commits so late retries can be answered without appending twice. All
//! mutations happen inside the stream's append gate, which linearizes
//! sequence decisions with the appends themselves.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::error::EngineError;

/// Committed entries retained per producer for duplicate replay. Sized to
/// cover a pipelining client's in-flight window with room to spare; retries
/// older than this answer as a fatal gap and the client re-establishes.
const DEDUP_RING_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
struct RingEntry {
    seq: u64,
    offset: String,
    close: bool,
}

#[derive(Debug)]
struct ProducerState {
    epoch: u64,
    /// Last committed sequence, -1 before the first commit of an epoch.
    last_seq: i64,
    ring: VecDeque<RingEntry>,
}

impl ProducerState {
    fn new() -> Self {
        Self {
            epoch: 0,
            last_seq: -1,
            ring: VecDeque::new(),
        }
    }
}

/// Verdict on a producer append, before any record is written.
#[derive(Debug)]
pub enum ProducerDecision {
    /// Sequence advances by one: append, then confirm with
    /// [`ProducerRegistry::record_commit`].
    Commit,
    /// Replay of a committed sequence; answer with the stored offset.
    Duplicate { offset: String, close: bool },
}

/// Producer state for all streams, keyed by path then producer id.
pub struct ProducerRegistry {
    inner: Mutex<HashMap<String, HashMap<String, ProducerState>>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate producer claims against the stored state.
    ///
    /// A declared epoch below the stored one is fenced. A greater one is
    /// adopted and resets the sequence contract. Within an epoch the
    /// sequence must advance by exactly one; anything at or below the last
    /// commit is answered from the ring or reported as a gap.
    pub fn evaluate(
        &self,
        path: &str,
        id: &str,
        epoch: u64,
        seq: u64,
    ) -> Result<ProducerDecision, EngineError> {
        let mut inner = self.inner.lock();
        let state = inner
            .entry(path.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(ProducerState::new);

        if epoch < state.epoch {
            return Err(EngineError::Fenced {
                declared: epoch,
                current: state.epoch,
            });
        }
        if epoch > state.epoch {
            state.epoch = epoch;
            state.last_seq = -1;
            state.ring.clear();
        }

        let expected = (state.last_seq as i128 + 1).max(0) as u64;
        if seq as i128 == state.last_seq as i128 + 1 {
            return Ok(ProducerDecision::Commit);
        }
        if (seq as i128) <= state.last_seq as i128 {
            if let Some(entry) = state.ring.iter().find(|e| e.seq == seq) {
                return Ok(ProducerDecision::Duplicate {
                    offset: entry.offset.clone(),
                    close: entry.close,
                });
            }
        }
        Err(EngineError::SequenceGap {
            expected,
            received: seq,
        })
    }

    /// Confirm a commit decided by [`evaluate`](Self::evaluate).
    pub fn record_commit(&self, path: &str, id: &str, seq: u64, offset: &str, close: bool) {
        let mut inner = self.inner.lock();
        let state = inner
            .entry(path.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(ProducerState::new);

        state.last_seq = seq as i64;
        state.ring.push_back(RingEntry {
            seq,
            offset: offset.to_string(),
            close,
        });
        while state.ring.len() > DEDUP_RING_CAPACITY {
            state.ring.pop_front();
        }
    }

    /// Drop all producer state for a path. Called on stream deletion and
    /// re-creation so nothing leaks across incarnations.
    pub fn forget_stream(&self, path: &str) {
        self.inner.lock().remove(path);
    }
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
