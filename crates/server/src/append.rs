//! POST: appends, writer coordination, idempotent producers, and close.

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use logmq_engine::{AppendOutcome, AppendRequest, ProducerClaims};
use logmq_protocol::content_type;
use logmq_protocol::grammar;
use logmq_protocol::headers as proto;

use crate::server::{AppState, engine_error_response, read_body};

pub async fn handle_append(
    state: AppState,
    path: String,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(raw_content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Content-Type is required").into_response();
    };
    let canonical = content_type::canonicalize(raw_content_type);

    let seq = match headers.get(proto::STREAM_SEQ) {
        None => None,
        Some(value) => match value.to_str().ok().filter(|v| grammar::is_valid_token(v)) {
            Some(value) => Some(value.to_string()),
            None => return (StatusCode::BAD_REQUEST, "invalid Stream-Seq").into_response(),
        },
    };

    let close = headers
        .get(proto::STREAM_CLOSED)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let producer = match parse_producer_claims(&headers) {
        Ok(producer) => producer,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let body_bytes = match read_body(&headers, body, state.options.max_append_bytes).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    // An empty body is only meaningful for a bare close.
    if body_bytes.is_empty() && !close {
        return (StatusCode::BAD_REQUEST, "empty body").into_response();
    }

    let Some(meta) = state.engine.head(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if canonical != meta.content_type {
        return engine_error_response(logmq_engine::EngineError::ContentTypeMismatch {
            expected: meta.content_type,
            actual: canonical,
        });
    }

    let records = if body_bytes.is_empty() {
        Vec::new()
    } else {
        match split_records(&meta.content_type, &body_bytes) {
            Ok(records) => records,
            Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
        }
    };

    let is_producer = producer.is_some();
    let request = AppendRequest {
        records,
        content_type: Some(canonical),
        seq,
        producer,
        close,
    };

    match state.engine.append(&path, request).await {
        Ok(AppendOutcome::Committed { tail }) => {
            // An idempotent close acknowledges with a body-bearing 200 so
            // retries are distinguishable from plain append commits.
            let status = if close && is_producer {
                StatusCode::OK
            } else {
                StatusCode::NO_CONTENT
            };
            Response::builder()
                .status(status)
                .header(proto::STREAM_NEXT_OFFSET, &tail)
                .body(Body::empty())
                .unwrap()
        }
        Ok(AppendOutcome::Duplicate { offset, close }) => {
            let status = if close {
                StatusCode::OK
            } else {
                StatusCode::NO_CONTENT
            };
            Response::builder()
                .status(status)
                .header(proto::STREAM_NEXT_OFFSET, &offset)
                .body(Body::empty())
                .unwrap()
        }
        Err(err) => engine_error_response(err),
    }
}

/// All three producer headers travel together.
fn parse_producer_claims(headers: &HeaderMap) -> Result<Option<ProducerClaims>, &'static str> {
    let id = headers.get(proto::PRODUCER_ID).and_then(|v| v.to_str().ok());
    let epoch = headers
        .get(proto::PRODUCER_EPOCH)
        .and_then(|v| v.to_str().ok());
    let seq = headers.get(proto::PRODUCER_SEQ).and_then(|v| v.to_str().ok());

    match (id, epoch, seq) {
        (None, None, None) => Ok(None),
        (Some(id), Some(epoch), Some(seq)) => {
            if !grammar::is_valid_token(id) {
                return Err("invalid Producer-Id");
            }
            let epoch = grammar::parse_canonical_u64(epoch).ok_or("invalid Producer-Epoch")?;
            let seq = grammar::parse_canonical_u64(seq).ok_or("invalid Producer-Seq")?;
            Ok(Some(ProducerClaims {
                id: id.to_string(),
                epoch,
                seq,
            }))
        }
        _ => Err("Producer-Id, Producer-Epoch, and Producer-Seq must be supplied together"),
    }
}

/// Split a request body into records. Byte streams append one record
/// verbatim. JSON bodies must parse; a non-empty array flattens one level
/// into per-element records, any other value is one record verbatim.
pub(crate) fn split_records(
    stream_content_type: &str,
    body: &[u8],
) -> Result<Vec<Vec<u8>>, &'static str> {
    if !content_type::is_json(stream_content_type) {
        return Ok(vec![body.to_vec()]);
    }

    let value: serde_json::Value = serde_json::from_slice(body).map_err(|_| "invalid JSON body")?;
    match value {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err("empty JSON array");
            }
            items
                .iter()
                .map(|item| serde_json::to_vec(item).map_err(|_| "invalid JSON body"))
                .collect()
        }
        _ => Ok(vec![body.to_vec()]),
    }
}
