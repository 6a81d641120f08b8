//! Protocol header, query-parameter, and SSE field names.
//!
//! Header names are emitted in Header-Case on the wire; comparison is
//! case-insensitive per HTTP, so nothing may match on the raw bytes.

pub const STREAM_NEXT_OFFSET: &str = "Stream-Next-Offset";
pub const STREAM_CURSOR: &str = "Stream-Cursor";
pub const STREAM_UP_TO_DATE: &str = "Stream-Up-To-Date";
pub const STREAM_SEQ: &str = "Stream-Seq";
pub const STREAM_TTL: &str = "Stream-TTL";
pub const STREAM_EXPIRES_AT: &str = "Stream-Expires-At";
pub const STREAM_CLOSED: &str = "Stream-Closed";

pub const PRODUCER_ID: &str = "Producer-Id";
pub const PRODUCER_EPOCH: &str = "Producer-Epoch";
pub const PRODUCER_SEQ: &str = "Producer-Seq";
pub const PRODUCER_EXPECTED_SEQ: &str = "Producer-Expected-Seq";
pub const PRODUCER_RECEIVED_SEQ: &str = "Producer-Received-Seq";

/// Advertises the SSE data-event payload encoding when it is not the
/// default text form.
pub const SSE_DATA_ENCODING: &str = "stream-sse-data-encoding";

pub const QUERY_OFFSET: &str = "offset";
pub const QUERY_LIVE: &str = "live";
pub const QUERY_CURSOR: &str = "cursor";

pub const LIVE_LONG_POLL: &str = "long-poll";
pub const LIVE_SSE: &str = "sse";

pub const SSE_EVENT_DATA: &str = "data";
pub const SSE_EVENT_CONTROL: &str = "control";

pub const CONTROL_NEXT_OFFSET: &str = "streamNextOffset";
pub const CONTROL_CURSOR: &str = "streamCursor";
pub const CONTROL_UP_TO_DATE: &str = "upToDate";
pub const CONTROL_CLOSED: &str = "streamClosed";
