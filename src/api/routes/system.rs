//! System handlers: liveness, stats, OpenAPI, events.

use crate::api::AppState;
use crate::api::response::{error_response, failure, success};
use crate::types::{SeriesStatus, TaskStatus};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response, sse::Event as SseEvent, sse::Sse},
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::ToSchema;

/// GET /health - Liveness probe (unauthenticated)
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn health_check(State(state): State<AppState>) -> Response {
    success(
        StatusCode::OK,
        json!({
            "status": "ok",
            "uptime_secs": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// GET /stats - Aggregate series and task status counts
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses(
        (status = 200, description = "Status counts"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn stats(State(state): State<AppState>) -> Response {
    let series_counts = match state.service.db.series_status_counts().await {
        Ok(counts) => counts,
        Err(e) => return error_response(&e),
    };
    let task_counts = match state.service.db.task_status_counts().await {
        Ok(counts) => counts,
        Err(e) => return error_response(&e),
    };

    let mut series = serde_json::Map::new();
    for row in series_counts {
        let name = match SeriesStatus::from_i32(row.status) {
            SeriesStatus::Idle => "idle",
            SeriesStatus::Scanning => "scanning",
            SeriesStatus::Syncing => "syncing",
            SeriesStatus::Error => "error",
        };
        series.insert(name.to_string(), json!(row.count));
    }

    let mut tasks = serde_json::Map::new();
    for row in task_counts {
        let name = match TaskStatus::from_i32(row.status) {
            TaskStatus::Pending => "pending",
            TaskStatus::Scraping => "scraping",
            TaskStatus::Scraped => "scraped",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        tasks.insert(name.to_string(), json!(row.count));
    }

    success(StatusCode::OK, json!({"series": series, "tasks": tasks}))
}

/// GET /events - Server-sent events stream of lifecycle and progress events
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "SSE stream of event envelopes"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.service.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(envelope) => match serde_json::to_string(&envelope) {
            Ok(json_data) => Some(Ok(SseEvent::default()
                .event(envelope.kind.clone())
                .data(json_data))),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize event for SSE");
                None
            }
        },
        // Lagged receivers skip missed events rather than erroring out
        Err(_) => None,
    });

    Sse::new(sse_stream)
}

/// Request body for minting an event bus capability token
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// Channel to scope the token to ("list", "series:<id>", or a wildcard)
    pub channel: String,
}

/// POST /events/token - Mint a short-lived event bus capability token
#[utoipa::path(
    post,
    path = "/events/token",
    tag = "system",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Capability token"),
        (status = 400, description = "Empty channel"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 500, description = "Event bus unavailable or unconfigured")
    )
)]
pub async fn mint_event_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Response {
    if request.channel.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "channel must not be empty");
    }

    match state.service.events().mint_token(request.channel.trim()).await {
        Ok(token) => success(StatusCode::OK, json!({"token": token})),
        Err(e) => error_response(&e),
    }
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses((status = 200, description = "OpenAPI 3 specification"))
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}
