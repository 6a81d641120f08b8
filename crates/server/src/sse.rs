//! Server-Sent Events framing and the live writer loop.
//!
//! Framing is built by hand rather than through a generic SSE helper: the
//! protocol requires that arbitrary payload bytes can never terminate an
//! event or smuggle a field line past an SSE parser, and that the exact
//! bytes on the wire are testable.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use serde_json::json;

use logmq_engine::{Record, StreamEngine, StreamEvent};
use logmq_protocol::cursor::CursorClock;
use logmq_protocol::headers;

/// Payload encoding of `data` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEncoding {
    /// UTF-8 text with newline bytes split across `data:` lines. Used for
    /// JSON streams, whose payload is the array form of the batch.
    Text,
    /// One base64 `data:` line per record, advertised via
    /// `stream-sse-data-encoding: base64`. Used for every other content
    /// type so arbitrary bytes round-trip exactly.
    Base64,
}

/// Split a payload on CR, LF, and CRLF. Every byte of the payload lands in
/// some line; line terminators themselves are represented by the breaks.
fn split_payload_lines(payload: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < payload.len() {
        match payload[i] {
            b'\n' => {
                lines.push(&payload[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&payload[start..i]);
                i += 1;
                if payload.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    lines.push(&payload[start..]);
    lines
}

/// Encode one `data` event. Each payload line sits after a `data: ` prefix,
/// so no payload byte sequence can re-enter event parsing.
pub fn data_frame(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 32);
    out.put_slice(b"event: ");
    out.put_slice(headers::SSE_EVENT_DATA.as_bytes());
    out.put_slice(b"\n");
    for line in split_payload_lines(payload) {
        out.put_slice(b"data: ");
        out.put_slice(line);
        out.put_slice(b"\n");
    }
    out.put_slice(b"\n");
    out.freeze()
}

/// Encode one `control` event publishing the resumable offset.
pub fn control_frame(next_offset: &str, cursor: u64, up_to_date: bool, closed: bool) -> Bytes {
    let mut control = serde_json::Map::new();
    control.insert(headers::CONTROL_NEXT_OFFSET.to_string(), json!(next_offset));
    control.insert(
        headers::CONTROL_CURSOR.to_string(),
        json!(cursor.to_string()),
    );
    if up_to_date {
        control.insert(headers::CONTROL_UP_TO_DATE.to_string(), json!(true));
    }
    if closed {
        control.insert(headers::CONTROL_CLOSED.to_string(), json!(true));
    }
    let control = serde_json::Value::Object(control);

    let mut out = BytesMut::with_capacity(96);
    out.put_slice(b"event: ");
    out.put_slice(headers::SSE_EVENT_CONTROL.as_bytes());
    out.put_slice(b"\ndata: ");
    out.put_slice(control.to_string().as_bytes());
    out.put_slice(b"\n\n");
    out.freeze()
}

/// The array form of a JSON read batch: `[v1,v2,…]` over the stored
/// record bytes.
pub fn json_array_payload(records: &[Record]) -> Vec<u8> {
    let total: usize = records.iter().map(|r| r.data.len() + 1).sum();
    let mut out = Vec::with_capacity(total + 1);
    out.push(b'[');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(&record.data);
    }
    out.push(b']');
    out
}

/// The SSE writer loop: read up to the tail, emit data then control, park
/// on the engine's waiter machinery, and repeat until the client goes
/// away, the stream is removed, the stream is closed and drained, or the
/// connection cap elapses.
#[allow(clippy::too_many_arguments)]
pub fn live_stream(
    engine: Arc<StreamEngine>,
    path: String,
    start_offset: String,
    initial_cursor: u64,
    clock: CursorClock,
    encoding: DataEncoding,
    keepalive: Duration,
    max_duration: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream! {
        let mut rx = engine.subscribe();
        let started = tokio::time::Instant::now();
        let mut offset = start_offset;
        let mut cursor = initial_cursor;

        loop {
            // Drain whatever is currently readable.
            loop {
                let result = match engine.read(&path, &offset) {
                    Ok(result) => result,
                    // Stream vanished between reads; DELETE already woke us
                    // or will shortly, nothing left to report.
                    Err(_) => return,
                };
                if !result.records.is_empty() {
                    match encoding {
                        DataEncoding::Text => {
                            yield Ok(data_frame(&json_array_payload(&result.records)));
                        }
                        DataEncoding::Base64 => {
                            for record in &result.records {
                                yield Ok(data_frame(BASE64.encode(&record.data).as_bytes()));
                            }
                        }
                    }
                }
                offset = result.next_offset.clone();
                cursor = clock.ratchet(Some(cursor));
                yield Ok(control_frame(&offset, cursor, result.up_to_date, result.closed));
                if result.up_to_date {
                    if result.closed {
                        // Terminal: nothing further can ever be appended.
                        return;
                    }
                    break;
                }
            }

            // Park until new data, a keepalive tick, or the connection cap.
            'parked: loop {
                let remaining = max_duration.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    cursor = clock.ratchet(Some(cursor));
                    yield Ok(control_frame(&offset, cursor, true, false));
                    return;
                }
                let wait = keepalive.min(remaining);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        cursor = clock.ratchet(Some(cursor));
                        yield Ok(control_frame(&offset, cursor, true, false));
                        if started.elapsed() >= max_duration {
                            return;
                        }
                    }
                    event = rx.recv() => match event {
                        Ok(StreamEvent::Appended { path: p, .. }) if p == path => break 'parked,
                        Ok(StreamEvent::Removed { path: p, was_closed }) if p == path => {
                            cursor = clock.ratchet(Some(cursor));
                            yield Ok(control_frame(&offset, cursor, true, was_closed));
                            return;
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break 'parked,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_payload_lines() {
        assert_eq!(split_payload_lines(b"plain"), vec![b"plain" as &[u8]]);
        assert_eq!(
            split_payload_lines(b"a\nb"),
            vec![b"a" as &[u8], b"b" as &[u8]]
        );
        assert_eq!(
            split_payload_lines(b"a\r\nb"),
            vec![b"a" as &[u8], b"b" as &[u8]]
        );
        assert_eq!(
            split_payload_lines(b"a\rb"),
            vec![b"a" as &[u8], b"b" as &[u8]]
        );
        assert_eq!(
            split_payload_lines(b"a\n\nb"),
            vec![b"a" as &[u8], b"" as &[u8], b"b" as &[u8]]
        );
        assert_eq!(
            split_payload_lines(b"trailing\n"),
            vec![b"trailing" as &[u8], b"" as &[u8]]
        );
        assert_eq!(split_payload_lines(b""), vec![b"" as &[u8]]);
    }

    #[test]
    fn test_data_frame_neutralizes_injection() {
        let payload = b"safe\r\n\r\nevent: control\r\ndata: {\"injected\":true}\r\nmore";
        let frame = data_frame(payload);
        let text = std::str::from_utf8(&frame).unwrap();

        // Exactly one event terminator, at the very end.
        assert!(text.ends_with("\n\n"));
        assert_eq!(text.matches("\n\n").count(), 1);
        // Every non-terminal line is a well-formed field line.
        for line in text[..text.len() - 2].lines() {
            assert!(
                line.starts_with("event: ") || line.starts_with("data: "),
                "unexpected line: {:?}",
                line
            );
        }
        // The would-be control line is inert payload data.
        assert!(text.contains("data: event: control\n"));
    }

    #[test]
    fn test_data_frame_simple() {
        let frame = data_frame(b"hello");
        assert_eq!(&frame[..], b"event: data\ndata: hello\n\n");
    }

    #[test]
    fn test_control_frame() {
        let frame = control_frame("0000000000000000_0000000000000005", 42, true, false);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: control\ndata: "));
        assert!(text.ends_with("\n\n"));

        let body = text
            .strip_prefix("event: control\ndata: ")
            .unwrap()
            .trim_end();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            value["streamNextOffset"],
            "0000000000000000_0000000000000005"
        );
        assert_eq!(value["streamCursor"], "42");
        assert_eq!(value["upToDate"], true);
        assert!(value.get("streamClosed").is_none());
    }

    #[test]
    fn test_control_frame_closed() {
        let frame = control_frame("-1", 7, true, true);
        let text = std::str::from_utf8(&frame).unwrap();
        let body = text
            .strip_prefix("event: control\ndata: ")
            .unwrap()
            .trim_end();
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["streamClosed"], true);
    }

    #[test]
    fn test_json_array_payload() {
        let records = vec![
            Record {
                start: "a".into(),
                end: "b".into(),
                data: b"{\"a\":1}".to_vec(),
            },
            Record {
                start: "b".into(),
                end: "c".into(),
                data: b"{\"a\":2}".to_vec(),
            },
        ];
        assert_eq!(json_array_payload(&records), b"[{\"a\":1},{\"a\":2}]");
    }
}
