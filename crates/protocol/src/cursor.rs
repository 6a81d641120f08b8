//! Cursor tokens for CDN request collapsing.
//!
//! Live requests carry an opaque numeric cursor so a shared cache can
//! collapse identical `(path, offset, cursor)` requests into one upstream
//! fetch. The server answers every echoed cursor with a strictly greater
//! one: readers stuck on a collapsed entry step forward out of it instead
//! of looping on the same cached response forever.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::grammar;

/// Width of the random step applied on a collision, in intervals. Kept
/// small so cursors track wall-clock intervals closely while still fanning
/// collapsed readers out across distinct fresh entries.
const COLLISION_SPREAD: u64 = 3;

/// Issues cursors quantized from seconds since the Unix epoch.
#[derive(Debug, Clone, Copy)]
pub struct CursorClock {
    quantum_seconds: u64,
}

impl CursorClock {
    pub fn new(quantum_seconds: u64) -> Self {
        Self {
            quantum_seconds: quantum_seconds.max(1),
        }
    }

    /// Parse a cursor echoed by a client. Issued cursors are canonical
    /// decimal integers, so anything outside that grammar never came from
    /// this server and reads as absent.
    pub fn parse_echo(value: &str) -> Option<u64> {
        grammar::parse_canonical_u64(value)
    }

    /// The interval a given instant falls into.
    pub fn interval_at(&self, now: DateTime<Utc>) -> u64 {
        (now.timestamp().max(0) as u64) / self.quantum_seconds
    }

    /// Compute the outbound cursor for a request arriving now.
    pub fn ratchet(&self, echoed: Option<u64>) -> u64 {
        self.ratchet_at(Utc::now(), echoed)
    }

    /// `max(interval(now), echoed + 1 + jitter)`, piecewise: an echo from a
    /// past interval is simply pulled up to the live one, which already
    /// exceeds it. An echo at or past the live interval collided with a
    /// collapsed cache entry and is pushed strictly beyond itself.
    pub fn ratchet_at(&self, now: DateTime<Utc>, echoed: Option<u64>) -> u64 {
        let interval = self.interval_at(now);
        let Some(echoed) = echoed else {
            return interval;
        };
        if echoed < interval {
            return interval;
        }
        let jitter = rand::thread_rng().gen_range(0..COLLISION_SPREAD);
        echoed.saturating_add(1 + jitter)
    }
}
