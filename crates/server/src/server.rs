//! HTTP front end for the stream protocol.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use chrono::{SecondsFormat, Utc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use logmq_engine::{
    EngineConfig, EngineError, MemoryStorage, Record, StreamConfig, StreamEngine,
};
use logmq_protocol::content_type;
use logmq_protocol::grammar;
use logmq_protocol::headers as proto;

use crate::append;
use crate::config::ServerOptions;
use crate::dispatch::PatternSet;
use crate::etag;
use crate::read;
use crate::sse;

/// Sub-protocols the dispatcher can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mount {
    Health,
    Streams,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StreamEngine>,
    pub options: ServerOptions,
    mounts: Arc<PatternSet<Mount>>,
}

impl AppState {
    pub fn new(engine: Arc<StreamEngine>, options: ServerOptions) -> Self {
        let mut mounts = PatternSet::new();
        mounts.insert("/healthz", Mount::Health);
        mounts.insert("/*", Mount::Streams);
        Self {
            engine,
            options,
            mounts: Arc::new(mounts),
        }
    }
}

/// Create the router with all stream endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/{*path}", any(handle_dispatch))
        .layer(cors)
        // Outermost, so even CORS preflight responses carry the headers.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            safety_headers,
        ))
        .with_state(state)
}

/// Every response carries the browser-safety headers regardless of outcome.
async fn safety_headers(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    let policy = HeaderValue::from_str(&state.options.cross_origin_resource_policy)
        .unwrap_or_else(|_| HeaderValue::from_static("cross-origin"));
    headers.insert("cross-origin-resource-policy", policy);
    response
}

/// Route a request through the pattern registry, then by method.
async fn handle_dispatch(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    let path = format!("/{}", path);

    match state.mounts.resolve(&path).copied() {
        Some(Mount::Health) => handle_health(request.method()),
        Some(Mount::Streams) | None => handle_stream(state, path, request).await,
    }
}

async fn handle_stream(state: AppState, path: String, request: Request) -> Response {
    let method = request.method().clone();
    let query = request.uri().query().map(|q| q.to_string());
    let headers = request.headers().clone();
    let body = request.into_body();

    match method.as_str() {
        "PUT" => handle_create(state, path, headers, body).await,
        "POST" => append::handle_append(state, path, headers, body).await,
        "GET" => read::handle_read(state, path, query, headers).await,
        "HEAD" => handle_head(&state, &path),
        "DELETE" => handle_delete(&state, &path),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn handle_health(method: &Method) -> Response {
    if method == Method::GET || method == Method::HEAD {
        (StatusCode::OK, "ok").into_response()
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

/// PUT - create a stream, optionally committing an initial body.
async fn handle_create(
    state: AppState,
    path: String,
    headers: HeaderMap,
    body: Body,
) -> Response {
    debug!(path = %path, "Creating stream");

    let content_type_value = match headers.get(header::CONTENT_TYPE) {
        Some(value) => match value.to_str() {
            Ok(value) => value,
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "malformed Content-Type").into_response();
            }
        },
        None => content_type::OCTET_STREAM,
    };
    let canonical = content_type::canonicalize(content_type_value);

    let ttl_seconds = match headers.get(proto::STREAM_TTL) {
        None => None,
        Some(value) => match value
            .to_str()
            .ok()
            .and_then(grammar::parse_canonical_u64)
        {
            Some(ttl) => Some(ttl),
            None => return (StatusCode::BAD_REQUEST, "invalid Stream-TTL").into_response(),
        },
    };

    let expires_at = match headers.get(proto::STREAM_EXPIRES_AT) {
        None => None,
        Some(value) => match value.to_str().ok().and_then(grammar::parse_rfc3339_utc) {
            Some(expires) => Some(expires),
            None => {
                return (StatusCode::BAD_REQUEST, "invalid Stream-Expires-At").into_response();
            }
        },
    };

    if ttl_seconds.is_some() && expires_at.is_some() {
        return (
            StatusCode::BAD_REQUEST,
            "cannot specify both Stream-TTL and Stream-Expires-At",
        )
            .into_response();
    }

    let body_bytes = match read_body(&headers, body, state.options.max_append_bytes).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let initial = if body_bytes.is_empty() {
        Vec::new()
    } else {
        match append::split_records(&canonical, &body_bytes) {
            Ok(records) => records,
            Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
        }
    };

    let config = StreamConfig {
        content_type: canonical.clone(),
        ttl_seconds,
        expires_at,
    };

    match state.engine.create(&path, config, initial) {
        Ok(outcome) => {
            let created = matches!(outcome, logmq_engine::CreateOutcome::Created { .. });
            let mut response = Response::builder()
                .status(if created {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                })
                .header(proto::STREAM_NEXT_OFFSET, outcome.tail())
                .header(header::CONTENT_TYPE, &canonical);
            if created {
                if let Ok(location) = HeaderValue::from_str(&path) {
                    response = response.header(header::LOCATION, location);
                }
            }
            response.body(Body::empty()).unwrap()
        }
        Err(err) => engine_error_response(err),
    }
}

/// HEAD - stream metadata, never a body.
fn handle_head(state: &AppState, path: &str) -> Response {
    let Some(meta) = state.engine.head(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let etag = etag::generate_etag(path, &meta.stream_id, &meta.tail);
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &meta.content_type)
        .header(proto::STREAM_NEXT_OFFSET, &meta.tail)
        .header(header::ETAG, &etag)
        .header(header::CACHE_CONTROL, "no-store");
    if meta.closed {
        response = response.header(proto::STREAM_CLOSED, "true");
    }
    if let Some(remaining) = meta.remaining_ttl(Utc::now()) {
        response = response.header(proto::STREAM_TTL, remaining.to_string());
    } else if let Some(expires) = meta.expires_at {
        response = response.header(
            proto::STREAM_EXPIRES_AT,
            expires.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    response.body(Body::empty()).unwrap()
}

/// DELETE - remove the stream and wake its waiters.
fn handle_delete(state: &AppState, path: &str) -> Response {
    if state.engine.delete(path).is_some() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Collect a request body under the configured cap.
pub(crate) async fn read_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Bytes, Response> {
    if let Some(length) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > limit {
            return Err(
                (StatusCode::PAYLOAD_TOO_LARGE, "body exceeds append limit").into_response()
            );
        }
    }
    to_bytes(body, limit)
        .await
        .map_err(|_| (StatusCode::PAYLOAD_TOO_LARGE, "body exceeds append limit").into_response())
}

/// Render a read batch the way the stream's content type demands.
pub(crate) fn format_body(stream_content_type: &str, records: &[Record]) -> Vec<u8> {
    if content_type::is_json(stream_content_type) {
        sse::json_array_payload(records)
    } else {
        records
            .iter()
            .flat_map(|record| record.data.iter().copied())
            .collect()
    }
}

/// Map engine errors to their protocol status codes and reporting headers.
pub(crate) fn engine_error_response(err: EngineError) -> Response {
    match err {
        EngineError::NotFound(path) => {
            (StatusCode::NOT_FOUND, format!("stream not found: {}", path)).into_response()
        }
        EngineError::InvalidOffset(offset) => {
            (StatusCode::BAD_REQUEST, format!("invalid offset: {}", offset)).into_response()
        }
        EngineError::ConfigMismatch => (
            StatusCode::CONFLICT,
            "stream already exists with different configuration",
        )
            .into_response(),
        EngineError::ContentTypeMismatch { expected, actual } => (
            StatusCode::CONFLICT,
            format!(
                "content-type mismatch: stream is {}, append is {}",
                expected, actual
            ),
        )
            .into_response(),
        EngineError::SequenceConflict { last, got } => (
            StatusCode::CONFLICT,
            format!("sequence {} does not advance past {}", got, last),
        )
            .into_response(),
        EngineError::Closed => Response::builder()
            .status(StatusCode::CONFLICT)
            .header(proto::STREAM_CLOSED, "true")
            .body(Body::from("stream is closed"))
            .unwrap(),
        EngineError::Fenced { current, .. } => Response::builder()
            .status(StatusCode::FORBIDDEN)
            .header(proto::PRODUCER_EPOCH, current.to_string())
            .body(Body::from("producer fenced"))
            .unwrap(),
        EngineError::SequenceGap { expected, received } => Response::builder()
            .status(StatusCode::CONFLICT)
            .header(proto::PRODUCER_EXPECTED_SEQ, expected.to_string())
            .header(proto::PRODUCER_RECEIVED_SEQ, received.to_string())
            .body(Body::from("producer sequence gap"))
            .unwrap(),
        EngineError::Backpressure => Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header(header::RETRY_AFTER, "1")
            .body(Body::from("append queue full"))
            .unwrap(),
        EngineError::Storage(message) => {
            warn!(error = %message, "Storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage failure").into_response()
        }
    }
}

/// Start the server with the in-memory storage adapter.
pub async fn start_server(options: ServerOptions) -> std::io::Result<()> {
    let engine = StreamEngine::with_lifecycle(
        Arc::new(MemoryStorage::new()),
        EngineConfig {
            read_chunk_bytes: options.read_chunk_bytes,
            append_watermark: options.append_watermark,
        },
        |event| debug!(?event, "Stream lifecycle"),
    );
    let sweeper = engine.spawn_sweeper(Duration::from_millis(options.sweep_interval_ms));

    let state = AppState::new(engine, options.clone());
    let router = create_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting LogMQ server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
