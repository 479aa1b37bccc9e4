//! Series registry handlers.

use crate::api::AppState;
use crate::api::response::{error_response, failure, success};
use crate::db::{DomainMigration, NewSeries, SeriesFilter, SeriesPatch};
use crate::types::{Event, SeriesId, SeriesStatus};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{SeriesDto, TaskDto};

/// Request body for registering a series
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSeriesRequest {
    /// External catalog identifier (unique)
    pub external_id: String,
    /// Human title
    pub title: String,
    /// Source listing URLs, primary first (1-3 entries)
    pub source_urls: Vec<String>,
    /// Minutes between scheduled scans (default: 360)
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u32,
    /// Scheduling priority (default: 0)
    #[serde(default)]
    pub priority: i32,
    /// Whether the scanner picks this series up automatically (default: true)
    #[serde(default = "default_true")]
    pub auto_sync_enabled: bool,
}

fn default_check_interval() -> u32 {
    360
}

fn default_true() -> bool {
    true
}

impl From<CreateSeriesRequest> for NewSeries {
    fn from(request: CreateSeriesRequest) -> Self {
        NewSeries {
            external_id: request.external_id,
            title: request.title,
            source_urls: request.source_urls,
            check_interval_minutes: request.check_interval_minutes,
            priority: request.priority,
            auto_sync_enabled: request.auto_sync_enabled,
        }
    }
}

/// Request body for bulk registration
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkCreateRequest {
    /// Series to register (at most 50)
    pub items: Vec<CreateSeriesRequest>,
}

/// Request body for partial series updates
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSeriesRequest {
    /// New title
    pub title: Option<String>,
    /// Replacement source URL set
    pub source_urls: Option<Vec<String>>,
    /// New check interval in minutes
    pub check_interval_minutes: Option<u32>,
    /// New scheduling priority
    pub priority: Option<i32>,
    /// Enable or disable automatic scanning
    pub auto_sync_enabled: Option<bool>,
}

/// Query parameters for series listing
#[derive(Debug, Deserialize)]
pub struct ListSeriesQuery {
    /// Filter by status name (idle/scanning/syncing/error)
    pub status: Option<String>,
    /// Filter by title substring
    pub title: Option<String>,
    /// 1-based page (default: 1)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size, 1-100 (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

/// Request body for domain migration
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDomainRequest {
    /// Hostname to move away from
    pub old_domain: String,
    /// Replacement hostname
    pub new_domain: String,
    /// Optional series scope (at most 200 ids)
    pub series_ids: Option<Vec<i64>>,
    /// Preview without mutating (default: true)
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

/// POST /series - Register a series
#[utoipa::path(
    post,
    path = "/series",
    tag = "series",
    request_body = CreateSeriesRequest,
    responses(
        (status = 201, description = "Series registered; first scan scheduled"),
        (status = 400, description = "Invalid source URLs or fields"),
        (status = 409, description = "External id already registered"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn create_series(
    State(state): State<AppState>,
    Json(request): Json<CreateSeriesRequest>,
) -> Response {
    match state.service.db.create_series(&request.into()).await {
        Ok(created) => {
            state.service.events().publish(Event::SeriesCreated {
                external_id: created.series.external_id.clone(),
                title: created.series.title.clone(),
            });
            // First scan runs right away, off the scheduler's cadence
            state.service.spawn_immediate_scan(created.series.clone());

            success(
                StatusCode::CREATED,
                SeriesDto::with_sources(&created.series, &created.sources),
            )
        }
        Err(e) => error_response(&e),
    }
}

/// POST /series/bulk - Register many series, skipping duplicates
#[utoipa::path(
    post,
    path = "/series/bulk",
    tag = "series",
    request_body = BulkCreateRequest,
    responses(
        (status = 201, description = "Per-item created/skipped outcomes"),
        (status = 400, description = "Empty or oversized batch"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn bulk_create_series(
    State(state): State<AppState>,
    Json(request): Json<BulkCreateRequest>,
) -> Response {
    if request.items.is_empty() || request.items.len() > 50 {
        return failure(
            StatusCode::BAD_REQUEST,
            "items must contain between 1 and 50 entries",
        );
    }

    let mut outcomes = Vec::with_capacity(request.items.len());
    for item in request.items {
        let external_id = item.external_id.clone();
        match state.service.db.create_series(&item.into()).await {
            Ok(created) => {
                state.service.events().publish(Event::SeriesCreated {
                    external_id: created.series.external_id.clone(),
                    title: created.series.title.clone(),
                });
                state.service.spawn_immediate_scan(created.series.clone());
                outcomes.push(json!({"external_id": external_id, "status": "created"}));
            }
            Err(crate::Error::AlreadyRegistered(_)) => {
                outcomes.push(json!({"external_id": external_id, "status": "skipped"}));
            }
            Err(e) => {
                outcomes.push(json!({
                    "external_id": external_id,
                    "status": "skipped",
                    "error": e.to_string(),
                }));
            }
        }
    }

    success(StatusCode::CREATED, json!({"items": outcomes}))
}

/// GET /series - List series with filters and pagination
#[utoipa::path(
    get,
    path = "/series",
    tag = "series",
    params(
        ("status" = Option<String>, Query, description = "Filter by status name"),
        ("title" = Option<String>, Query, description = "Filter by title substring"),
        ("page" = Option<u32>, Query, description = "1-based page"),
        ("page_size" = Option<u32>, Query, description = "Page size, 1-100")
    ),
    responses(
        (status = 200, description = "Page of series"),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn list_series(
    State(state): State<AppState>,
    Query(query): Query<ListSeriesQuery>,
) -> Response {
    let status = match &query.status {
        Some(raw) => match raw.parse::<SeriesStatus>() {
            Ok(status) => Some(status.to_i32()),
            Err(message) => return failure(StatusCode::BAD_REQUEST, message),
        },
        None => None,
    };

    let filter = SeriesFilter {
        status,
        title: query.title.clone(),
        page: query.page,
        page_size: query.page_size,
    };
    match state.service.db.list_series(&filter).await {
        Ok((items, total)) => {
            let items: Vec<SeriesDto> = items.iter().map(SeriesDto::from_series).collect();
            success(
                StatusCode::OK,
                json!({
                    "items": items,
                    "total": total,
                    "page": query.page.max(1),
                    "page_size": query.page_size.clamp(1, 100),
                }),
            )
        }
        Err(e) => error_response(&e),
    }
}

/// GET /series/:id - Series detail with sources and failed tasks
#[utoipa::path(
    get,
    path = "/series/{id}",
    tag = "series",
    params(("id" = i64, Path, description = "Series ID")),
    responses(
        (status = 200, description = "Series detail"),
        (status = 404, description = "Series not found"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn get_series(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let id = SeriesId(id);
    let series = match state.service.db.get_series(id).await {
        Ok(Some(series)) => series,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "series not found"),
        Err(e) => return error_response(&e),
    };

    let sources = match state.service.db.get_sources(id).await {
        Ok(sources) => sources,
        Err(e) => return error_response(&e),
    };
    let failed_tasks = match state.service.db.get_failed_tasks(id).await {
        Ok(tasks) => tasks,
        Err(e) => return error_response(&e),
    };

    success(
        StatusCode::OK,
        json!({
            "series": SeriesDto::with_sources(&series, &sources),
            "failed_tasks": failed_tasks.iter().map(TaskDto::from_task).collect::<Vec<_>>(),
        }),
    )
}

/// PUT /series/:id - Partial update
#[utoipa::path(
    put,
    path = "/series/{id}",
    tag = "series",
    params(("id" = i64, Path, description = "Series ID")),
    request_body = UpdateSeriesRequest,
    responses(
        (status = 200, description = "Updated series"),
        (status = 400, description = "Invalid fields"),
        (status = 404, description = "Series not found"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn update_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateSeriesRequest>,
) -> Response {
    let patch = SeriesPatch {
        title: request.title,
        source_urls: request.source_urls,
        check_interval_minutes: request.check_interval_minutes,
        priority: request.priority,
        auto_sync_enabled: request.auto_sync_enabled,
    };

    match state.service.db.update_series(SeriesId(id), &patch).await {
        Ok(Some(updated)) => {
            state.service.events().publish(Event::SeriesUpdated {
                external_id: updated.series.external_id.clone(),
            });
            success(
                StatusCode::OK,
                SeriesDto::with_sources(&updated.series, &updated.sources),
            )
        }
        Ok(None) => failure(StatusCode::NOT_FOUND, "series not found"),
        Err(e) => error_response(&e),
    }
}

/// DELETE /series/:id - Delete a series (sources and tasks cascade)
#[utoipa::path(
    delete,
    path = "/series/{id}",
    tag = "series",
    params(("id" = i64, Path, description = "Series ID")),
    responses(
        (status = 200, description = "Series deleted"),
        (status = 404, description = "Series not found"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn delete_series(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let id = SeriesId(id);
    let series = match state.service.db.get_series(id).await {
        Ok(Some(series)) => series,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "series not found"),
        Err(e) => return error_response(&e),
    };

    match state.service.db.delete_series(id).await {
        Ok(true) => {
            state.service.events().publish(Event::SeriesDeleted {
                external_id: series.external_id,
            });
            crate::api::response::success_message(StatusCode::OK, "series deleted")
        }
        Ok(false) => failure(StatusCode::NOT_FOUND, "series not found"),
        Err(e) => error_response(&e),
    }
}

/// POST /series/:id/force-scan - Schedule an immediate scan
#[utoipa::path(
    post,
    path = "/series/{id}/force-scan",
    tag = "series",
    params(("id" = i64, Path, description = "Series ID")),
    responses(
        (status = 200, description = "Scan scheduled (no-op while syncing)"),
        (status = 404, description = "Series not found"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn force_scan(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let id = SeriesId(id);
    match state.service.db.trigger_force_scan(id).await {
        Ok(true) => {
            // Kick the scan immediately unless the processor owns the series
            if let Ok(Some(series)) = state.service.db.get_series(id).await
                && series.series_status() == SeriesStatus::Idle
            {
                state.service.spawn_immediate_scan(series);
            }
            crate::api::response::success_message(StatusCode::OK, "scan scheduled")
        }
        Ok(false) => failure(StatusCode::NOT_FOUND, "series not found"),
        Err(e) => error_response(&e),
    }
}

/// POST /series/:id/retry - Flip failed tasks back to pending
#[utoipa::path(
    post,
    path = "/series/{id}/retry",
    tag = "series",
    params(("id" = i64, Path, description = "Series ID")),
    responses(
        (status = 200, description = "Number of tasks retried"),
        (status = 400, description = "No failed tasks to retry"),
        (status = 404, description = "Series not found"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn retry_failed(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let id = SeriesId(id);
    match state.service.db.get_series(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return failure(StatusCode::NOT_FOUND, "series not found"),
        Err(e) => return error_response(&e),
    }

    match state.service.db.retry_failed_tasks(id).await {
        Ok(0) => failure(StatusCode::BAD_REQUEST, "no failed tasks to retry"),
        Ok(retried) => success(StatusCode::OK, json!({"retried_count": retried})),
        Err(e) => error_response(&e),
    }
}

/// PUT /series/update-domain - Migrate source hostnames
#[utoipa::path(
    put,
    path = "/series/update-domain",
    tag = "series",
    request_body = UpdateDomainRequest,
    responses(
        (status = 200, description = "Preview or applied migration"),
        (status = 400, description = "Invalid domains or oversized scope"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn update_domain(
    State(state): State<AppState>,
    Json(request): Json<UpdateDomainRequest>,
) -> Response {
    let outcome = state
        .service
        .db
        .update_domain(
            &request.old_domain,
            &request.new_domain,
            request.series_ids.as_deref(),
            request.dry_run,
        )
        .await;

    match outcome {
        Ok(DomainMigration::DryRun {
            affected_count,
            sample,
        }) => success(
            StatusCode::OK,
            json!({
                "dry_run": true,
                "affected_count": affected_count,
                "sample": sample,
            }),
        ),
        Ok(DomainMigration::Applied { updated_count }) => success(
            StatusCode::OK,
            json!({"dry_run": false, "updated_count": updated_count}),
        ),
        Err(e) => error_response(&e),
    }
}
