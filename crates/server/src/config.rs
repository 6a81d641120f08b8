//! Server configuration.

use std::time::Duration;

use logmq_protocol::cursor::CursorClock;

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on (0 for auto-assign).
    pub port: u16,
    /// Long-poll timeout in milliseconds; also the SSE keepalive cadence.
    pub long_poll_timeout_ms: u64,
    /// Maximum duration of one SSE connection before a clean close.
    pub sse_max_duration_ms: u64,
    /// Cursor quantum in seconds of Unix time.
    pub cursor_quantum_seconds: u64,
    /// Largest accepted request body; beyond it the server answers 413.
    pub max_append_bytes: usize,
    /// Ceiling on bytes returned by a single read.
    pub read_chunk_bytes: usize,
    /// Pending appends per stream beyond which the server sheds load.
    pub append_watermark: usize,
    /// TTL sweep cadence in milliseconds.
    pub sweep_interval_ms: u64,
    /// Value of the `Cross-Origin-Resource-Policy` response header.
    pub cross_origin_resource_policy: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4610,
            long_poll_timeout_ms: 30_000,
            sse_max_duration_ms: 60_000,
            cursor_quantum_seconds: 10,
            max_append_bytes: 16 * 1024 * 1024,
            read_chunk_bytes: 4 * 1024 * 1024,
            append_watermark: 64,
            sweep_interval_ms: 5_000,
            cross_origin_resource_policy: "cross-origin".to_string(),
        }
    }
}

impl ServerOptions {
    pub fn cursor_clock(&self) -> CursorClock {
        CursorClock::new(self.cursor_quantum_seconds)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }

    pub fn sse_max_duration(&self) -> Duration {
        Duration::from_millis(self.sse_max_duration_ms)
    }
}
