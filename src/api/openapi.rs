//! OpenAPI documentation for the admin API.

use utoipa::OpenApi;

/// OpenAPI specification root
#[derive(OpenApi)]
#[openapi(
    info(
        title = "manga-mirror Admin API",
        description = "Registry, scan, and sync-pipeline administration for the \
                       catalog auto-synchronization service.",
        version = "0.1.0",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        crate::api::routes::series::create_series,
        crate::api::routes::series::bulk_create_series,
        crate::api::routes::series::list_series,
        crate::api::routes::series::get_series,
        crate::api::routes::series::update_series,
        crate::api::routes::series::delete_series,
        crate::api::routes::series::force_scan,
        crate::api::routes::series::retry_failed,
        crate::api::routes::series::update_domain,
        crate::api::routes::system::health_check,
        crate::api::routes::system::stats,
        crate::api::routes::system::event_stream,
        crate::api::routes::system::mint_event_token,
        crate::api::routes::system::openapi_spec,
    ),
    components(schemas(
        crate::api::routes::series::CreateSeriesRequest,
        crate::api::routes::series::BulkCreateRequest,
        crate::api::routes::series::UpdateSeriesRequest,
        crate::api::routes::series::UpdateDomainRequest,
        crate::api::routes::system::TokenRequest,
        crate::api::routes::SeriesDto,
        crate::api::routes::SourceDto,
        crate::api::routes::TaskDto,
        crate::api::routes::SyncProgressDto,
        crate::db::MigratedUrl,
        crate::types::SeriesStatus,
        crate::types::TaskStatus,
        crate::types::SourceScanStatus,
        crate::types::EventEnvelope,
    )),
    tags(
        (name = "series", description = "Series registry and sync control"),
        (name = "system", description = "Liveness, stats, and events")
    )
)]
pub struct ApiDoc;
