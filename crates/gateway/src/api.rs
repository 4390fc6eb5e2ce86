//! Gateway endpoints.
//!
//! - `GET  /agent/query?q=...`         resolve a query
//! - `POST /agent/query`               resolve a query (`{"query": "..."}`)
//! - `GET  /agent/query/stream?q=...`  resolve a query as an SSE frame stream
//! - `GET  /fast/{query}`              fast path only, no cache
//! - `GET  /drug/{name}`               exact catalog lookup
//! - `GET  /search/{query}?limit=N`    fuzzy catalog search, best matches first
//! - `GET  /stats`                     cache and routing counters
//! - `POST /cache/clear`               drop every cached response
//! - `GET  /traces`                    recent trace digests, newest first
//! - `GET  /events`                    SSE stream of domain events
//! - `GET  /health`                    liveness

use axum::{
    Router,
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{error, info};

use medquery_agent::{FastLookup, RouterStats};
use medquery_core::error::Error;
use medquery_core::knowledge::{DrugMatch, DrugRecord};
use medquery_core::response::Response;
use medquery_core::trace::TraceDigest;

use crate::SharedState;

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/agent/query", get(query_get_handler).post(query_post_handler))
        .route("/agent/query/stream", get(query_stream_handler))
        .route("/fast/{query}", get(fast_handler))
        .route("/drug/{name}", get(drug_handler))
        .route("/search/{query}", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/cache/clear", post(cache_clear_handler))
        .route("/traces", get(traces_handler))
        .route("/events", get(events_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct QueryParamsIn {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct FastResponse {
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Box<Response>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<DrugMatch>,
    pub total: usize,
}

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub router: RouterStats,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct TraceListResponse {
    pub traces: Vec<TraceDigest>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: Error) -> ApiError {
    let status = if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %e, "Query handling failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn resolve(state: &SharedState, raw: &str) -> Result<Json<Response>, ApiError> {
    info!(query_len = raw.len(), "Query request");
    state.router.resolve(raw).await.map(Json).map_err(api_error)
}

async fn query_get_handler(
    State(state): State<SharedState>,
    QueryParams(params): QueryParams<QueryParamsIn>,
) -> Result<Json<Response>, ApiError> {
    resolve(&state, &params.q).await
}

async fn query_post_handler(
    State(state): State<SharedState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<Response>, ApiError> {
    resolve(&state, &payload.query).await
}

/// Metadata, content and done frames as SSE.
async fn query_stream_handler(
    State(state): State<SharedState>,
    QueryParams(params): QueryParams<QueryParamsIn>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(query_len = params.q.len(), "Streaming query request");
    let rx = state.router.resolve_stream(&params.q).map_err(api_error)?;

    let stream = ReceiverStream::new(rx).map(|frame| {
        let data = serde_json::to_string(&frame).unwrap_or_default();
        Ok(SseEvent::default().event(frame.event_type()).data(data))
    });
    Ok(Sse::new(stream))
}

async fn fast_handler(
    State(state): State<SharedState>,
    Path(query): Path<String>,
) -> Result<Json<FastResponse>, ApiError> {
    let lookup = state.router.fast_lookup(&query).await.map_err(api_error)?;
    Ok(Json(match lookup {
        FastLookup::Resolved(response) => FastResponse {
            resolved: true,
            response: Some(response),
        },
        FastLookup::Unresolved => FastResponse {
            resolved: false,
            response: None,
        },
    }))
}

async fn drug_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<DrugRecord>, ApiError> {
    let record = state
        .router
        .knowledge()
        .get(&name)
        .await
        .map_err(|e| api_error(e.into()))?;
    record.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown medication: {}", name.trim()),
            }),
        )
    })
}

async fn search_handler(
    State(state): State<SharedState>,
    Path(query): Path<String>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
    let matches = state
        .router
        .knowledge()
        .search(&query, limit)
        .await
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(SearchResponse {
        query,
        total: matches.len(),
        matches,
    }))
}

async fn stats_handler(State(state): State<SharedState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        router: state.router.stats(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

async fn cache_clear_handler(State(state): State<SharedState>) -> Json<CacheClearResponse> {
    Json(CacheClearResponse {
        cleared: state.router.invalidate_cache(),
    })
}

async fn traces_handler(State(state): State<SharedState>) -> Json<TraceListResponse> {
    let traces = state.router.recent_traces();
    Json(TraceListResponse {
        total: traces.len(),
        traces,
    })
}

/// Domain events as they happen. Lagging clients skip events.
async fn events_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.router.event_bus().subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let value = serde_json::to_value(event.as_ref()).unwrap_or_default();
            let name = value["type"].as_str().unwrap_or("event").to_string();
            Ok(SseEvent::default().event(name).data(value.to_string()))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
