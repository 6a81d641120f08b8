//! In-memory storage adapter.
//!
//! The default `Storage` implementation: a map of streams behind a
//! `parking_lot::RwLock`, with per-stream record vectors. All appends for a
//! stream run under the engine's append gate, so the lock here only guards
//! the map itself and is never held across a suspension point.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use logmq_protocol::offset::{self, compare_offsets, format_offset, parse_offset};

use crate::error::EngineError;
use crate::storage::{AppendGuards, CreateOutcome, Storage};
use crate::types::{ReadResult, Record, StreamConfig, StreamMeta};

struct StoredStream {
    stream_id: Uuid,
    config: StreamConfig,
    created_at: DateTime<Utc>,
    closed: bool,
    last_seq: Option<String>,
    records: Vec<Record>,
    /// First half of the offset pair. Fixed for one incarnation of a path.
    generation: u64,
    /// Cumulative byte position, the second half of the offset pair.
    tail_bytes: u64,
}

impl StoredStream {
    fn new(config: StreamConfig) -> Self {
        Self {
            stream_id: Uuid::new_v4(),
            config,
            created_at: Utc::now(),
            closed: false,
            last_seq: None,
            records: Vec::new(),
            generation: 0,
            tail_bytes: 0,
        }
    }

    fn tail(&self) -> String {
        format_offset(self.generation, self.tail_bytes)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.config.expires_at {
            return now >= expires_at;
        }
        if let Some(ttl) = self.config.ttl_seconds {
            let elapsed = now.signed_duration_since(self.created_at).num_seconds();
            return elapsed >= 0 && elapsed as u64 >= ttl;
        }
        false
    }

    fn meta(&self) -> StreamMeta {
        StreamMeta {
            stream_id: self.stream_id,
            content_type: self.config.content_type.clone(),
            created_at: self.created_at,
            ttl_seconds: self.config.ttl_seconds,
            expires_at: self.config.expires_at,
            closed: self.closed,
            tail: self.tail(),
        }
    }

    fn push_records(&mut self, records: Vec<Vec<u8>>) {
        for data in records {
            let start = self.tail();
            // Zero-length records must still advance the tail, offsets are
            // never repeated.
            self.tail_bytes += (data.len() as u64).max(1);
            let end = self.tail();
            self.records.push(Record { start, end, data });
        }
    }
}

/// In-memory stream storage.
pub struct MemoryStorage {
    streams: RwLock<HashMap<String, StoredStream>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn create_stream(
        &self,
        path: &str,
        config: StreamConfig,
        initial: Vec<Vec<u8>>,
    ) -> Result<CreateOutcome, EngineError> {
        let now = Utc::now();
        let mut streams = self.streams.write();

        if let Some(existing) = streams.get(path) {
            if existing.is_expired(now) {
                streams.remove(path);
            } else if existing.config == config {
                return Ok(CreateOutcome::Existed {
                    tail: existing.tail(),
                });
            } else {
                return Err(EngineError::ConfigMismatch);
            }
        }

        let mut stream = StoredStream::new(config);
        stream.push_records(initial);
        let tail = stream.tail();
        streams.insert(path.to_string(), stream);

        Ok(CreateOutcome::Created { tail })
    }

    fn delete_stream(&self, path: &str) -> Option<StreamMeta> {
        self.streams.write().remove(path).map(|s| s.meta())
    }

    fn head(&self, path: &str) -> Option<StreamMeta> {
        let streams = self.streams.read();
        let stream = streams.get(path)?;
        if stream.is_expired(Utc::now()) {
            return None;
        }
        Some(stream.meta())
    }

    fn append(
        &self,
        path: &str,
        records: Vec<Vec<u8>>,
        guards: AppendGuards<'_>,
    ) -> Result<String, EngineError> {
        let now = Utc::now();
        let mut streams = self.streams.write();

        let stream = streams
            .get_mut(path)
            .filter(|s| !s.is_expired(now))
            .ok_or_else(|| EngineError::NotFound(path.to_string()))?;

        if stream.closed {
            return Err(EngineError::Closed);
        }

        if let Some(content_type) = guards.content_type {
            if content_type != stream.config.content_type {
                return Err(EngineError::ContentTypeMismatch {
                    expected: stream.config.content_type.clone(),
                    actual: content_type.to_string(),
                });
            }
        }

        // Writer seq must advance strictly, in byte-lexicographic order.
        if let Some(seq) = guards.seq {
            if let Some(last) = &stream.last_seq {
                if compare_offsets(seq, last) != std::cmp::Ordering::Greater {
                    return Err(EngineError::SequenceConflict {
                        last: last.clone(),
                        got: seq.to_string(),
                    });
                }
            }
            stream.last_seq = Some(seq.to_string());
        }

        stream.push_records(records);
        if guards.close {
            stream.closed = true;
        }

        Ok(stream.tail())
    }

    fn read(&self, path: &str, from: &str, max_bytes: usize) -> Result<ReadResult, EngineError> {
        // Offsets are opaque to clients, but only tokens this storage issued
        // resume a read.
        if from != offset::BEGINNING && parse_offset(from).is_none() {
            return Err(EngineError::InvalidOffset(from.to_string()));
        }

        let now = Utc::now();
        let streams = self.streams.read();

        let stream = streams
            .get(path)
            .filter(|s| !s.is_expired(now))
            .ok_or_else(|| EngineError::NotFound(path.to_string()))?;

        let mut records = Vec::new();
        let mut total = 0usize;
        let mut truncated = false;

        for record in &stream.records {
            if from != offset::BEGINNING
                && compare_offsets(&record.start, from) == std::cmp::Ordering::Less
            {
                continue;
            }
            if total >= max_bytes && !records.is_empty() {
                truncated = true;
                break;
            }
            total += record.data.len();
            records.push(record.clone());
        }

        let tail = stream.tail();
        let next_offset = records
            .last()
            .map(|r| r.end.clone())
            .unwrap_or_else(|| tail.clone());
        let up_to_date = !truncated && next_offset == tail;

        Ok(ReadResult {
            records,
            next_offset,
            up_to_date,
            closed: stream.closed,
        })
    }

    fn sweep(&self, now: DateTime<Utc>) -> Vec<(String, StreamMeta)> {
        let mut streams = self.streams.write();
        let expired: Vec<String> = streams
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(path, _)| path.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|path| {
                let meta = streams.remove(&path)?.meta();
                Some((path, meta))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_config() -> StreamConfig {
        StreamConfig {
            content_type: "text/plain".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_head() {
        let storage = MemoryStorage::new();

        let outcome = storage
            .create_stream("/test/stream", plain_config(), Vec::new())
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created { .. }));

        let meta = storage.head("/test/stream").unwrap();
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(meta.tail, format_offset(0, 0));
        assert!(!meta.closed);
    }

    #[test]
    fn test_create_idempotent_skips_initial_body() {
        let storage = MemoryStorage::new();

        let first = storage
            .create_stream("/s", plain_config(), vec![b"init".to_vec()])
            .unwrap();
        let second = storage
            .create_stream("/s", plain_config(), vec![b"init".to_vec()])
            .unwrap();

        assert!(matches!(first, CreateOutcome::Created { .. }));
        assert!(matches!(second, CreateOutcome::Existed { .. }));
        assert_eq!(first.tail(), second.tail());

        let result = storage.read("/s", offset::BEGINNING, usize::MAX).unwrap();
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn test_create_config_mismatch() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let other = StreamConfig {
            content_type: "application/json".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            storage.create_stream("/s", other, Vec::new()),
            Err(EngineError::ConfigMismatch)
        ));

        let ttl = StreamConfig {
            content_type: "text/plain".to_string(),
            ttl_seconds: Some(60),
            ..Default::default()
        };
        assert!(matches!(
            storage.create_stream("/s", ttl, Vec::new()),
            Err(EngineError::ConfigMismatch)
        ));
    }

    #[test]
    fn test_append_and_read() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let guards = AppendGuards {
            content_type: Some("text/plain"),
            ..Default::default()
        };
        let tail1 = storage
            .append("/s", vec![b"hello".to_vec()], guards.clone())
            .unwrap();
        let tail2 = storage
            .append("/s", vec![b" world".to_vec()], guards)
            .unwrap();
        assert!(compare_offsets(&tail2, &tail1) == std::cmp::Ordering::Greater);

        let result = storage.read("/s", offset::BEGINNING, usize::MAX).unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].data, b"hello");
        assert_eq!(result.records[1].data, b" world");
        assert_eq!(result.next_offset, tail2);
        assert!(result.up_to_date);

        // Resuming at the first record's end yields only the second.
        let resume = &result.records[0].end;
        let rest = storage.read("/s", resume, usize::MAX).unwrap();
        assert_eq!(rest.records.len(), 1);
        assert_eq!(rest.records[0].data, b" world");
    }

    #[test]
    fn test_read_chunk_ceiling() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        for _ in 0..4 {
            storage
                .append("/s", vec![vec![b'x'; 100]], AppendGuards::default())
                .unwrap();
        }

        let first = storage.read("/s", offset::BEGINNING, 150).unwrap();
        assert_eq!(first.records.len(), 2);
        assert!(!first.up_to_date);

        // Pagination terminates at the tail.
        let mut from = first.next_offset;
        let mut seen = first.records.len();
        loop {
            let page = storage.read("/s", &from, 150).unwrap();
            seen += page.records.len();
            from = page.next_offset;
            if page.up_to_date {
                break;
            }
        }
        assert_eq!(seen, 4);
    }

    #[test]
    fn test_seq_regression() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let append = |seq: &str, data: &[u8]| {
            storage.append(
                "/s",
                vec![data.to_vec()],
                AppendGuards {
                    seq: Some(seq),
                    ..Default::default()
                },
            )
        };

        append("09", b"a").unwrap();
        append("10", b"b").unwrap();
        assert!(matches!(
            append("2", b"c"),
            Err(EngineError::SequenceConflict { .. })
        ));
        assert!(matches!(
            append("10", b"c"),
            Err(EngineError::SequenceConflict { .. })
        ));

        let result = storage.read("/s", offset::BEGINNING, usize::MAX).unwrap();
        assert_eq!(result.records.len(), 2);
    }

    #[test]
    fn test_read_rejects_unknown_tokens() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        assert!(matches!(
            storage.read("/s", "bogus", usize::MAX),
            Err(EngineError::InvalidOffset(_))
        ));
    }

    #[test]
    fn test_content_type_guard() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let result = storage.append(
            "/s",
            vec![b"x".to_vec()],
            AppendGuards {
                content_type: Some("application/json"),
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(EngineError::ContentTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_close_is_terminal() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let tail = storage
            .append(
                "/s",
                vec![b"final".to_vec()],
                AppendGuards {
                    close: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(storage.head("/s").unwrap().closed);
        assert!(matches!(
            storage.append("/s", vec![b"more".to_vec()], AppendGuards::default()),
            Err(EngineError::Closed)
        ));

        // Still readable, and nothing after the final offset is visible.
        let result = storage.read("/s", offset::BEGINNING, usize::MAX).unwrap();
        assert!(result.closed);
        assert_eq!(result.next_offset, tail);
    }

    #[test]
    fn test_delete_then_recreate_is_fresh() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();
        storage
            .append("/s", vec![b"ghost".to_vec()], AppendGuards::default())
            .unwrap();
        let old_id = storage.head("/s").unwrap().stream_id;

        assert!(storage.delete_stream("/s").is_some());
        assert!(storage.head("/s").is_none());
        assert!(storage.delete_stream("/s").is_none());

        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();
        let meta = storage.head("/s").unwrap();
        assert_ne!(meta.stream_id, old_id);

        let result = storage.read("/s", offset::BEGINNING, usize::MAX).unwrap();
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_offsets_strictly_increase() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let mut previous = String::from(offset::BEGINNING);
        for i in 0..100u32 {
            let tail = storage
                .append(
                    "/s",
                    vec![format!("{}", i).into_bytes()],
                    AppendGuards::default(),
                )
                .unwrap();
            assert!(
                compare_offsets(&tail, &previous) == std::cmp::Ordering::Greater,
                "tail {} must exceed {}",
                tail,
                previous
            );
            previous = tail;
        }
    }

    #[test]
    fn test_byte_exactness_over_interleaved_reads() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        let parts: &[&[u8]] = &[b"one", b"", b"two\nthree", b" four"];
        let mut expected = Vec::new();
        for part in parts {
            storage
                .append("/s", vec![part.to_vec()], AppendGuards::default())
                .unwrap();
            expected.extend_from_slice(part);
        }

        // Reading from the beginning until up-to-date returns the exact
        // concatenation, regardless of chunk size.
        for chunk in [1usize, 3, 1024] {
            let mut collected = Vec::new();
            let mut from = String::from(offset::BEGINNING);
            loop {
                let page = storage.read("/s", &from, chunk).unwrap();
                for record in &page.records {
                    collected.extend_from_slice(&record.data);
                }
                from = page.next_offset;
                if page.up_to_date {
                    break;
                }
            }
            assert_eq!(collected, expected, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_records_immutable_by_position() {
        let storage = MemoryStorage::new();
        storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();

        storage
            .append("/s", vec![b"alpha".to_vec()], AppendGuards::default())
            .unwrap();
        storage
            .append("/s", vec![b"beta".to_vec()], AppendGuards::default())
            .unwrap();

        let before = storage.read("/s", offset::BEGINNING, usize::MAX).unwrap();
        let anchor = before.records[1].clone();

        storage
            .append("/s", vec![b"gamma".to_vec()], AppendGuards::default())
            .unwrap();

        // Resuming at the predecessor of the anchored record still returns
        // the same bytes at the same position.
        let after = storage.read("/s", &anchor.start, usize::MAX).unwrap();
        assert_eq!(after.records[0].start, anchor.start);
        assert_eq!(after.records[0].data, anchor.data);
    }

    #[test]
    fn test_expiry_and_sweep() {
        let storage = MemoryStorage::new();
        let config = StreamConfig {
            content_type: "text/plain".to_string(),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            ..Default::default()
        };
        storage.create_stream("/gone", config, Vec::new()).unwrap();
        storage
            .create_stream("/alive", plain_config(), Vec::new())
            .unwrap();

        // Expired streams read as absent even before the sweep runs.
        assert!(storage.head("/gone").is_none());
        assert!(matches!(
            storage.read("/gone", offset::BEGINNING, usize::MAX),
            Err(EngineError::NotFound(_))
        ));

        let swept = storage.sweep(Utc::now());
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].0, "/gone");
        assert!(storage.head("/alive").is_some());
    }

    #[test]
    fn test_recreate_over_expired() {
        let storage = MemoryStorage::new();
        let config = StreamConfig {
            content_type: "text/plain".to_string(),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            ..Default::default()
        };
        storage.create_stream("/s", config, Vec::new()).unwrap();

        let outcome = storage
            .create_stream("/s", plain_config(), Vec::new())
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created { .. }));
    }
}
