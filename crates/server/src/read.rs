//! GET: catch-up reads, long-polling, and SSE.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use logmq_engine::{StreamMeta, WaitOutcome};
use logmq_protocol::content_type;
use logmq_protocol::cursor::CursorClock;
use logmq_protocol::headers as proto;
use logmq_protocol::offset;

use crate::etag;
use crate::server::{AppState, engine_error_response, format_body};
use crate::sse::{self, DataEncoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveMode {
    LongPoll,
    Sse,
}

struct ReadParams {
    offset: String,
    live: Option<LiveMode>,
    cursor: Option<u64>,
}

/// Parse and validate the GET query string. Unknown parameters are
/// ignored; a malformed offset, a duplicate offset, an unknown live mode,
/// or a live mode without an offset are client errors.
fn parse_read_params(query: Option<&str>) -> Result<ReadParams, &'static str> {
    let mut offset: Option<String> = None;
    let mut offset_count = 0usize;
    let mut live = None;
    let mut cursor = None;

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match key.as_ref() {
            proto::QUERY_OFFSET => {
                offset_count += 1;
                offset = Some(value.into_owned());
            }
            proto::QUERY_LIVE => {
                live = Some(match value.as_ref() {
                    proto::LIVE_LONG_POLL => LiveMode::LongPoll,
                    proto::LIVE_SSE => LiveMode::Sse,
                    _ => return Err("unknown live mode"),
                });
            }
            proto::QUERY_CURSOR => {
                if cursor.is_none() {
                    cursor = CursorClock::parse_echo(&value);
                }
            }
            _ => {}
        }
    }

    if offset_count > 1 {
        return Err("duplicate offset parameter");
    }
    if live.is_some() && offset.is_none() {
        return Err("live mode requires an offset");
    }
    let offset = offset.unwrap_or_else(|| offset::BEGINNING.to_string());
    if !offset::is_valid_offset(&offset) {
        return Err("invalid offset");
    }

    Ok(ReadParams {
        offset,
        live,
        cursor,
    })
}

pub async fn handle_read(
    state: AppState,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
) -> Response {
    let params = match parse_read_params(query.as_deref()) {
        Ok(params) => params,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let Some(meta) = state.engine.head(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match params.live {
        Some(LiveMode::Sse) => handle_sse(state, path, meta, params),
        Some(LiveMode::LongPoll) => handle_long_poll(state, path, meta, params).await,
        None => handle_catch_up(state, path, meta, params, &headers),
    }
}

/// Immediate read of everything after the offset, with ETag revalidation.
fn handle_catch_up(
    state: AppState,
    path: String,
    meta: StreamMeta,
    params: ReadParams,
    request_headers: &HeaderMap,
) -> Response {
    let result = match state.engine.read(&path, &params.offset) {
        Ok(result) => result,
        Err(err) => return engine_error_response(err),
    };

    let etag = etag::generate_etag(&path, &meta.stream_id, &result.next_offset);
    let cursor = state.options.cursor_clock().ratchet(params.cursor);
    let not_modified = etag::if_none_match(request_headers, &etag);

    let mut response = Response::builder()
        .status(if not_modified {
            StatusCode::NOT_MODIFIED
        } else {
            StatusCode::OK
        })
        .header(proto::STREAM_NEXT_OFFSET, &result.next_offset)
        .header(proto::STREAM_CURSOR, cursor.to_string())
        .header(header::ETAG, &etag);
    if result.up_to_date {
        response = response.header(proto::STREAM_UP_TO_DATE, "true");
    }
    if result.closed {
        response = response.header(proto::STREAM_CLOSED, "true");
    }

    if not_modified {
        return response.body(Body::empty()).unwrap();
    }

    let body = format_body(&meta.content_type, &result.records);
    response
        .header(header::CONTENT_TYPE, &meta.content_type)
        .body(Body::from(body))
        .unwrap()
}

/// Suspend until new data, the configured timeout, or stream removal.
async fn handle_long_poll(
    state: AppState,
    path: String,
    meta: StreamMeta,
    params: ReadParams,
) -> Response {
    let clock = state.options.cursor_clock();
    let outcome = state
        .engine
        .wait_for_data(&path, &params.offset, state.options.long_poll_timeout())
        .await;

    match outcome {
        Ok(WaitOutcome::Data(result)) => {
            let cursor = clock.ratchet(params.cursor);
            let etag = etag::generate_etag(&path, &meta.stream_id, &result.next_offset);
            let body = format_body(&meta.content_type, &result.records);

            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, &meta.content_type)
                .header(proto::STREAM_NEXT_OFFSET, &result.next_offset)
                .header(proto::STREAM_CURSOR, cursor.to_string())
                .header(header::ETAG, &etag)
                .header(header::CACHE_CONTROL, "no-store");
            if result.up_to_date {
                response = response.header(proto::STREAM_UP_TO_DATE, "true");
            }
            if result.closed {
                response = response.header(proto::STREAM_CLOSED, "true");
            }
            response.body(Body::from(body)).unwrap()
        }
        Ok(WaitOutcome::Timeout) => {
            let cursor = clock.ratchet(params.cursor);
            // The stream may have closed while we waited.
            let closed = state.engine.head(&path).is_some_and(|m| m.closed);

            let mut response = Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(proto::STREAM_NEXT_OFFSET, &params.offset)
                .header(proto::STREAM_CURSOR, cursor.to_string())
                .header(proto::STREAM_UP_TO_DATE, "true")
                .header(header::CACHE_CONTROL, "no-store");
            if closed {
                response = response.header(proto::STREAM_CLOSED, "true");
            }
            response.body(Body::empty()).unwrap()
        }
        Ok(WaitOutcome::Gone) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => engine_error_response(err),
    }
}

/// Stream frames until disconnect, removal, a drained closed stream, or
/// the connection cap.
fn handle_sse(state: AppState, path: String, meta: StreamMeta, params: ReadParams) -> Response {
    // Reject unreadable offsets before committing to a streaming response.
    if let Err(err) = state.engine.read(&path, &params.offset) {
        return engine_error_response(err);
    }

    let encoding = if content_type::is_json(&meta.content_type) {
        DataEncoding::Text
    } else {
        DataEncoding::Base64
    };

    let clock = state.options.cursor_clock();
    let initial_cursor = clock.ratchet(params.cursor);

    let frames = sse::live_stream(
        Arc::clone(&state.engine),
        path,
        params.offset,
        initial_cursor,
        clock,
        encoding,
        state.options.long_poll_timeout(),
        state.options.sse_max_duration(),
    );

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type::EVENT_STREAM)
        .header(header::CACHE_CONTROL, "no-cache");
    if encoding == DataEncoding::Base64 {
        response = response.header(proto::SSE_DATA_ENCODING, "base64");
    }
    response.body(Body::from_stream(frames)).unwrap()
}
