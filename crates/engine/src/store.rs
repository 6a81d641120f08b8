//! The stream engine.
//!
//! One gate per live path serializes appends; producer decisions run inside
//! that gate so sequence validation is linearized with the commits it
//! guards. Readers never take the gate: they sample storage directly, and
//! blocked readers park on a broadcast channel that append and delete
//! operations signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::producer::{ProducerDecision, ProducerRegistry};
use crate::storage::{AppendGuards, CreateOutcome, Storage};
use crate::types::{
    AppendOutcome, AppendRequest, ReadResult, StreamConfig, StreamLifecycleEvent, StreamMeta,
};

type LifecycleHook = Box<dyn Fn(StreamLifecycleEvent) + Send + Sync>;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on bytes returned by a single read, so pagination terminates.
    pub read_chunk_bytes: usize,
    /// Pending appends per stream beyond which the engine sheds load.
    pub append_watermark: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_chunk_bytes: 4 * 1024 * 1024,
            append_watermark: 64,
        }
    }
}

/// Notification fanned out to blocked readers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Appended { path: String, tail: String },
    Removed { path: String, was_closed: bool },
}

/// Result of waiting for data on a stream.
#[derive(Debug)]
pub enum WaitOutcome {
    Data(ReadResult),
    /// Deadline elapsed with nothing new; the reader is up to date.
    Timeout,
    /// The stream was deleted while waiting.
    Gone,
}

struct StreamGate {
    append_lock: Mutex<()>,
    pending: AtomicUsize,
}

/// Engine facade over a storage adapter.
pub struct StreamEngine {
    storage: Arc<dyn Storage>,
    gates: RwLock<HashMap<String, Arc<StreamGate>>>,
    producers: ProducerRegistry,
    events: broadcast::Sender<StreamEvent>,
    config: EngineConfig,
    on_lifecycle: Option<LifecycleHook>,
}

impl StreamEngine {
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            storage,
            gates: RwLock::new(HashMap::new()),
            producers: ProducerRegistry::new(),
            events,
            config,
            on_lifecycle: None,
        })
    }

    /// Like [`new`](Self::new), with a hook invoked on stream creation,
    /// deletion, and expiry.
    pub fn with_lifecycle<F>(storage: Arc<dyn Storage>, config: EngineConfig, hook: F) -> Arc<Self>
    where
        F: Fn(StreamLifecycleEvent) + Send + Sync + 'static,
    {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            storage,
            gates: RwLock::new(HashMap::new()),
            producers: ProducerRegistry::new(),
            events,
            config,
            on_lifecycle: Some(Box::new(hook)),
        })
    }

    fn emit_lifecycle(&self, event: StreamLifecycleEvent) {
        if let Some(hook) = &self.on_lifecycle {
            hook(event);
        }
    }

    /// Subscribe to append/delete notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Metadata snapshot, or None when the stream is absent or expired.
    pub fn head(&self, path: &str) -> Option<StreamMeta> {
        self.storage.head(path)
    }

    /// Create a stream, committing any initial records atomically.
    pub fn create(
        &self,
        path: &str,
        config: StreamConfig,
        initial: Vec<Vec<u8>>,
    ) -> Result<CreateOutcome, EngineError> {
        let content_type = config.content_type.clone();
        let outcome = self.storage.create_stream(path, config, initial)?;
        if matches!(outcome, CreateOutcome::Created { .. }) {
            // A fresh incarnation of the path shares nothing with a
            // previously expired one.
            self.producers.forget_stream(path);
            info!(path = %path, "Created stream");
            self.emit_lifecycle(StreamLifecycleEvent::Created {
                path: path.to_string(),
                content_type,
                at: Utc::now(),
            });
        }
        Ok(outcome)
    }

    /// Append records, serialized per stream.
    pub async fn append(
        &self,
        path: &str,
        request: AppendRequest,
    ) -> Result<AppendOutcome, EngineError> {
        let gate = self.gate(path);

        if gate.pending.fetch_add(1, Ordering::AcqRel) >= self.config.append_watermark {
            gate.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(EngineError::Backpressure);
        }

        let result = self.append_gated(&gate, path, request).await;
        gate.pending.fetch_sub(1, Ordering::AcqRel);

        if let Ok(AppendOutcome::Committed { tail }) = &result {
            debug!(path = %path, tail = %tail, "Appended to stream");
            let _ = self.events.send(StreamEvent::Appended {
                path: path.to_string(),
                tail: tail.clone(),
            });
        }
        result
    }

    async fn append_gated(
        &self,
        gate: &StreamGate,
        path: &str,
        request: AppendRequest,
    ) -> Result<AppendOutcome, EngineError> {
        let _serial = gate.append_lock.lock().await;

        // Producer evaluation must not materialize state for a path that
        // does not exist.
        if self.storage.head(path).is_none() {
            return Err(EngineError::NotFound(path.to_string()));
        }

        if let Some(claims) = &request.producer {
            match self
                .producers
                .evaluate(path, &claims.id, claims.epoch, claims.seq)?
            {
                ProducerDecision::Duplicate { offset, close } => {
                    return Ok(AppendOutcome::Duplicate { offset, close });
                }
                ProducerDecision::Commit => {}
            }
        }

        let guards = AppendGuards {
            content_type: request.content_type.as_deref(),
            seq: request.seq.as_deref(),
            close: request.close,
        };
        let tail = self.storage.append(path, request.records, guards)?;

        if let Some(claims) = &request.producer {
            self.producers
                .record_commit(path, &claims.id, claims.seq, &tail, request.close);
        }

        Ok(AppendOutcome::Committed { tail })
    }

    /// Records strictly after `from`, bounded by the configured chunk size.
    pub fn read(&self, path: &str, from: &str) -> Result<ReadResult, EngineError> {
        self.storage.read(path, from, self.config.read_chunk_bytes)
    }

    /// Park until data past `from` arrives, the wait times out, or the
    /// stream goes away. Returns immediately when data is already there.
    pub async fn wait_for_data(
        &self,
        path: &str,
        from: &str,
        wait: Duration,
    ) -> Result<WaitOutcome, EngineError> {
        // Subscribe before the initial read so a commit racing this call is
        // never missed.
        let mut rx = self.events.subscribe();

        let first = self.read(path, from)?;
        if !first.records.is_empty() {
            return Ok(WaitOutcome::Data(first));
        }
        if first.closed {
            // Nothing can ever arrive on a closed stream.
            return Ok(WaitOutcome::Timeout);
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(WaitOutcome::Timeout),
                event = rx.recv() => event,
            };

            match event {
                Ok(StreamEvent::Appended { path: p, .. }) if p == path => {
                    match self.read(path, from) {
                        Ok(result) if !result.records.is_empty() => {
                            return Ok(WaitOutcome::Data(result));
                        }
                        Ok(_) => {}
                        Err(EngineError::NotFound(_)) => return Ok(WaitOutcome::Gone),
                        Err(err) => return Err(err),
                    }
                }
                Ok(StreamEvent::Removed { path: p, .. }) if p == path => {
                    return Ok(WaitOutcome::Gone);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed notifications; re-check storage directly.
                    match self.read(path, from) {
                        Ok(result) if !result.records.is_empty() => {
                            return Ok(WaitOutcome::Data(result));
                        }
                        Ok(_) => {}
                        Err(EngineError::NotFound(_)) => return Ok(WaitOutcome::Gone),
                        Err(err) => return Err(err),
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(WaitOutcome::Timeout),
            }
        }
    }

    /// Delete a stream and wake its waiters.
    pub fn delete(&self, path: &str) -> Option<StreamMeta> {
        let meta = self.storage.delete_stream(path)?;
        self.gates.write().remove(path);
        self.producers.forget_stream(path);
        info!(path = %path, "Deleted stream");
        let _ = self.events.send(StreamEvent::Removed {
            path: path.to_string(),
            was_closed: meta.closed,
        });
        self.emit_lifecycle(StreamLifecycleEvent::Deleted {
            path: path.to_string(),
            at: Utc::now(),
        });
        Some(meta)
    }

    /// Run the TTL sweep on an interval until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                for (path, meta) in engine.storage.sweep(Utc::now()) {
                    debug!(path = %path, "Expired stream swept");
                    engine.gates.write().remove(&path);
                    engine.producers.forget_stream(&path);
                    let _ = engine.events.send(StreamEvent::Removed {
                        path: path.clone(),
                        was_closed: meta.closed,
                    });
                    engine.emit_lifecycle(StreamLifecycleEvent::Expired {
                        path,
                        at: Utc::now(),
                    });
                }
            }
        })
    }

    fn gate(&self, path: &str) -> Arc<StreamGate> {
        if let Some(gate) = self.gates.read().get(path) {
            return Arc::clone(gate);
        }
        let mut gates = self.gates.write();
        Arc::clone(gates.entry(path.to_string()).or_insert_with(|| {
            Arc::new(StreamGate {
                append_lock: Mutex::new(()),
                pending: AtomicUsize::new(0),
            })
        }))
    }
}
